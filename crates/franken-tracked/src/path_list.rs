//! Reconstruct the read set of a session as a list of key paths, for
//! debugging and for tests.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_model::{JsValue, ObjectError, ObjectHandle, ObjectHeap, PropertyKey};
use crate::usage::UsageRegistry;

/// One step of a reconstructed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Value read of a key.
    Key(PropertyKey),
    /// Existence check (`:has(key)`).
    Has(PropertyKey),
    /// Own-descriptor check (`:hasOwn(key)`).
    HasOwn(PropertyKey),
    /// Full own-key enumeration (`:ownKeys`).
    OwnKeys,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Has(k) => write!(f, ":has({k})"),
            Self::HasOwn(k) => write!(f, ":hasOwn({k})"),
            Self::OwnKeys => f.write_str(":ownKeys"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(PropertyKey::from(key))
    }
}

pub(crate) struct PathWalker<'a> {
    heap: &'a ObjectHeap,
    registry: &'a UsageRegistry,
    only_with_values: bool,
    seen: BTreeSet<ObjectHandle>,
    paths: Vec<Vec<PathSegment>>,
}

impl<'a> PathWalker<'a> {
    pub(crate) fn new(heap: &'a ObjectHeap, registry: &'a UsageRegistry, only_with_values: bool) -> Self {
        Self {
            heap,
            registry,
            only_with_values,
            seen: BTreeSet::new(),
            paths: Vec::new(),
        }
    }

    pub(crate) fn collect(mut self, root: &JsValue) -> Result<Vec<Vec<PathSegment>>, ObjectError> {
        let mut path = Vec::new();
        self.walk(root, &mut path)?;
        Ok(self.paths)
    }

    fn walk(&mut self, value: &JsValue, path: &mut Vec<PathSegment>) -> Result<(), ObjectError> {
        let (heap, registry) = (self.heap, self.registry);
        let handle = value.as_object();
        if let Some(h) = handle
            && !self.seen.insert(h)
        {
            return Ok(());
        }
        let record = handle.and_then(|h| registry.get(heap.source_of(h)));
        let (Some(h), Some(record)) = (handle, record) else {
            if !path.is_empty() {
                self.paths.push(path.clone());
            }
            return Ok(());
        };

        for key in &record.has_keys {
            self.emit(path, PathSegment::Has(key.clone()));
        }
        if record.all_own_keys {
            self.emit(path, PathSegment::OwnKeys);
        } else {
            for key in &record.has_own_keys {
                self.emit(path, PathSegment::HasOwn(key.clone()));
            }
        }
        for key in &record.value_keys {
            if self.only_with_values
                && !heap
                    .get_own_property_descriptor(h, key)?
                    .is_some_and(|d| d.is_data())
            {
                continue;
            }
            let child = heap.get_property(h, key)?;
            path.push(PathSegment::Key(key.clone()));
            self.walk(&child, path)?;
            path.pop();
        }
        Ok(())
    }

    fn emit(&mut self, prefix: &[PathSegment], marker: PathSegment) {
        let mut path = prefix.to_vec();
        path.push(marker);
        self.paths.push(path);
    }
}
