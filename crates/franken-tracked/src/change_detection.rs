//! Selective change detection.
//!
//! Compares a previous value against a candidate, looking only at what the
//! usage registry says was observed on the previous graph.  Work is
//! proportional to the recorded read set, not the size of either graph.
//!
//! Order per recorded node:
//!
//! 1. existence-checked keys (presence must match),
//! 2. the ordered own-key list when it was enumerated, otherwise the own
//!    presence of each descriptor-checked key,
//! 3. value-read keys, compared recursively in recording order.
//!
//! The first difference decides.  Cycles are handled by seeding the memo
//! with "unchanged" before descending; without a memo a cyclic comparison
//! runs into the depth bound and fails with
//! [`ObjectError::CompareDepthExceeded`].

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::object_model::{JsValue, ObjectError, ObjectHandle, ObjectHeap};
use crate::usage::{UsageRecord, UsageRegistry};

bitflags! {
    /// Comparison policy flags.
    ///
    /// The `_IN_DEEP` variants apply their shallow counterpart at every
    /// level below the top-level call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CompareMode: u8 {
        /// Nodes without a usage record compare as unchanged.
        const ASSUME_UNCHANGED_IF_UNAFFECTED = 1;
        /// Identical object references are still inspected key by key.
        /// Primitives always compare by value.
        const IGNORE_REF_EQUALITY = 2;
        const ASSUME_UNCHANGED_IF_UNAFFECTED_IN_DEEP = 4;
        const IGNORE_REF_EQUALITY_IN_DEEP = 8;
    }
}

impl Default for CompareMode {
    fn default() -> Self {
        Self::empty()
    }
}

impl CompareMode {
    /// Mode used for nested comparisons: every deep flag, plus its shallow
    /// counterpart.  Shallow-only flags are dropped.
    pub fn nested(self) -> Self {
        let deep = self.bits() >> 2;
        Self::from_bits_truncate((deep << 2) | deep)
    }
}

/// Cached verdict for one previous node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoEntry {
    /// Candidate the verdict was computed against.
    pub candidate: ObjectHandle,
    pub changed: bool,
}

/// Caller-owned memo: previous node → last verdict.  Only valid while the
/// registry it was filled from is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeMemo {
    entries: BTreeMap<ObjectHandle, MemoEntry>,
}

impl ChangeMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prev: ObjectHandle) -> Option<MemoEntry> {
        self.entries.get(&prev).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn insert(&mut self, prev: ObjectHandle, candidate: ObjectHandle, changed: bool) {
        self.entries.insert(prev, MemoEntry { candidate, changed });
    }
}

/// One comparison run over a heap and a registry.
pub(crate) struct ChangeDetector<'a> {
    heap: &'a ObjectHeap,
    registry: &'a UsageRegistry,
    max_depth: u32,
}

impl<'a> ChangeDetector<'a> {
    pub(crate) fn new(heap: &'a ObjectHeap, registry: &'a UsageRegistry, max_depth: u32) -> Self {
        Self {
            heap,
            registry,
            max_depth,
        }
    }

    pub(crate) fn is_changed(
        &self,
        prev: &JsValue,
        next: &JsValue,
        memo: Option<&mut ChangeMemo>,
        mode: CompareMode,
    ) -> Result<bool, ObjectError> {
        self.compare(prev, next, memo, mode, 0)
    }

    fn compare(
        &self,
        prev: &JsValue,
        next: &JsValue,
        mut memo: Option<&mut ChangeMemo>,
        mode: CompareMode,
        depth: u32,
    ) -> Result<bool, ObjectError> {
        let (Some(p), Some(n)) = (prev.as_object(), next.as_object()) else {
            return Ok(!prev.same_value(next));
        };
        if p == n && !mode.contains(CompareMode::IGNORE_REF_EQUALITY) {
            return Ok(false);
        }
        let unaffected = !mode.contains(CompareMode::ASSUME_UNCHANGED_IF_UNAFFECTED);
        let Some(record) = self.registry.get(self.heap.source_of(p)) else {
            return Ok(unaffected);
        };
        if depth >= self.max_depth {
            return Err(ObjectError::CompareDepthExceeded {
                max: self.max_depth,
            });
        }

        if let Some(memo) = memo.as_deref_mut() {
            if let Some(hit) = memo.get(p)
                && hit.candidate == n
            {
                return Ok(hit.changed);
            }
            memo.insert(p, n, false);
        }

        let verdict = self
            .compare_record(p, n, record, memo.as_deref_mut(), mode, depth)?
            .unwrap_or(unaffected);
        if let Some(memo) = memo {
            memo.insert(p, n, verdict);
        }
        Ok(verdict)
    }

    /// `Some(true)` on the first difference, `Some(false)` when something
    /// was checked and matched, `None` when the record held nothing to check.
    fn compare_record(
        &self,
        p: ObjectHandle,
        n: ObjectHandle,
        record: &UsageRecord,
        mut memo: Option<&mut ChangeMemo>,
        mode: CompareMode,
        depth: u32,
    ) -> Result<Option<bool>, ObjectError> {
        let heap = self.heap;
        let mut verdict = None;

        for key in &record.has_keys {
            if heap.has_property(p, key)? != heap.has_property(n, key)? {
                return Ok(Some(true));
            }
            verdict = Some(false);
        }

        if record.all_own_keys {
            if heap.own_keys(p)? != heap.own_keys(n)? {
                return Ok(Some(true));
            }
            verdict = Some(false);
        } else {
            for key in &record.has_own_keys {
                if heap.has_own(p, key)? != heap.has_own(n, key)? {
                    return Ok(Some(true));
                }
                verdict = Some(false);
            }
        }

        let nested = mode.nested();
        for key in &record.value_keys {
            let prev_child = heap.get_property(p, key)?;
            let next_child = heap.get_property(n, key)?;
            if self.compare(&prev_child, &next_child, memo.as_deref_mut(), nested, depth + 1)? {
                return Ok(Some(true));
            }
            verdict = Some(false);
        }

        Ok(verdict)
    }
}
