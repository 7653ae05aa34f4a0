//! Per-session usage registry.
//!
//! Maps each source node read through a tracking view to the kinds of
//! access performed on it.  A registry also remembers which sources were
//! declared fully used; those never carry a record again in the same
//! session, so change detection falls back to reference comparison for them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::object_model::{ObjectHandle, PropertyKey};

/// Identifier of one usage registry (one tracking session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistryId(pub u64);

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registry#{}", self.0)
    }
}

/// Access kinds recorded for one source node.  Key sets keep recording order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Keys tested for existence (`key in obj`).
    pub has_keys: IndexSet<PropertyKey>,
    /// Keys whose own descriptor was inspected (`Object.hasOwn`).
    pub has_own_keys: IndexSet<PropertyKey>,
    /// The full own-key list was enumerated.
    pub all_own_keys: bool,
    /// Keys whose value was read.
    pub value_keys: IndexSet<PropertyKey>,
}

impl UsageRecord {
    pub fn is_empty(&self) -> bool {
        self.has_keys.is_empty()
            && self.has_own_keys.is_empty()
            && !self.all_own_keys
            && self.value_keys.is_empty()
    }

    fn apply(&mut self, access: Access<'_>) {
        match access {
            Access::Has(key) => {
                self.has_keys.insert(key.clone());
            }
            Access::HasOwn(key) => {
                self.has_own_keys.insert(key.clone());
            }
            Access::AllOwnKeys => self.all_own_keys = true,
            Access::Value(key) => {
                self.value_keys.insert(key.clone());
            }
        }
    }
}

/// One observed access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access<'a> {
    Has(&'a PropertyKey),
    HasOwn(&'a PropertyKey),
    AllOwnKeys,
    Value(&'a PropertyKey),
}

impl fmt::Display for Access<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Has(k) => write!(f, "has({k})"),
            Self::HasOwn(k) => write!(f, "hasOwn({k})"),
            Self::AllOwnKeys => f.write_str("ownKeys"),
            Self::Value(k) => write!(f, "get({k})"),
        }
    }
}

/// Source node → usage record, plus the fully-used set of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRegistry {
    records: BTreeMap<ObjectHandle, UsageRecord>,
    fully_used: BTreeSet<ObjectHandle>,
}

impl UsageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one access against `source`.  Returns `false` (and records
    /// nothing) when the source was marked fully used.
    pub fn record(&mut self, source: ObjectHandle, access: Access<'_>) -> bool {
        if self.fully_used.contains(&source) {
            return false;
        }
        self.records.entry(source).or_default().apply(access);
        true
    }

    /// Drop the record for `source` and stop recording for it.
    pub fn mark_fully_used(&mut self, source: ObjectHandle) {
        self.records.remove(&source);
        self.fully_used.insert(source);
    }

    pub fn is_fully_used(&self, source: ObjectHandle) -> bool {
        self.fully_used.contains(&source)
    }

    pub fn get(&self, source: ObjectHandle) -> Option<&UsageRecord> {
        self.records.get(&source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectHandle, &UsageRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
