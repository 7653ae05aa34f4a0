//! Which values get tracking views.
//!
//! Plain objects and arrays are trackable by default.  Anything else (class
//! instances, built-ins, null-prototype objects) is opaque unless opted in.
//! Overrides win over the default and are keyed by source identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::object_model::{JsValue, ObjectError, ObjectHeap, ObjectHandle};

/// Per-source trackability overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackabilityTable {
    overrides: BTreeMap<ObjectHandle, bool>,
}

impl TrackabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force `value` trackable or opaque.  Primitives are ignored.
    pub fn mark(&mut self, heap: &ObjectHeap, value: &JsValue, trackable: bool) {
        if let Some(h) = value.as_object() {
            self.overrides.insert(heap.source_of(h), trackable);
        }
    }

    pub fn override_for(&self, source: ObjectHandle) -> Option<bool> {
        self.overrides.get(&source).copied()
    }

    /// Override first, else whether the direct prototype is the bare object
    /// or bare array prototype.
    pub fn is_trackable(&self, heap: &ObjectHeap, value: &JsValue) -> Result<bool, ObjectError> {
        let Some(h) = value.as_object() else {
            return Ok(false);
        };
        let source = heap.source_of(h);
        if let Some(forced) = self.override_for(source) {
            return Ok(forced);
        }
        let proto = heap.get_prototype_of(source)?;
        Ok(proto == Some(heap.object_prototype()) || proto == Some(heap.array_prototype()))
    }
}
