//! Wrapper state and the identity cache that keeps one tracking view per
//! source node.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_model::ObjectHandle;
use crate::usage::RegistryId;

/// Identifier of one wrapper identity cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheId(pub u64);

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wrapper-cache#{}", self.0)
    }
}

/// Internal state of a tracking view, stored in its heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperState {
    /// Node the view observes; usage is recorded against it.
    pub source: ObjectHandle,
    /// Object operations act upon: the source, or its writable copy.
    pub target: ObjectHandle,
    /// Whether the source was effectively frozen when the view was built.
    pub frozen: bool,
    /// Registry recording reads; rebound on every wrap call.
    pub registry: RegistryId,
    /// Cache new child views go into; rebound on every wrap call.
    pub cache: Option<CacheId>,
}

/// Source node → wrapper handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperCache {
    wrappers: BTreeMap<ObjectHandle, ObjectHandle>,
}

impl WrapperCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: ObjectHandle) -> Option<ObjectHandle> {
        self.wrappers.get(&source).copied()
    }

    /// Store the view for `source`, returning the one it replaces.
    pub fn insert(&mut self, source: ObjectHandle, wrapper: ObjectHandle) -> Option<ObjectHandle> {
        self.wrappers.insert(source, wrapper)
    }

    pub fn remove(&mut self, source: ObjectHandle) -> Option<ObjectHandle> {
        self.wrappers.remove(&source)
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }
}
