//! Frozen-source support.
//!
//! A view over a frozen object must be able to return a fresh view for a
//! non-configurable, non-writable property, which the host's proxy
//! invariants forbid when the view targets the frozen object directly.  Such
//! views therefore target a writable copy, built once per source.

use std::collections::BTreeMap;

use crate::object_model::{
    ARRAY_TAG, JsValue, LENGTH_KEY, ObjectError, ObjectHandle, ObjectHeap, OrdinaryObject,
    PropertyDescriptor, PropertyKey,
};

/// Frozen, or carrying at least one own data property that is non-writable
/// or one own accessor that is non-configurable.  Configurable accessors
/// leave the object writable.
pub fn is_effectively_frozen(heap: &ObjectHeap, handle: ObjectHandle) -> Result<bool, ObjectError> {
    let obj = heap.ordinary(handle)?;
    Ok(obj.is_frozen()
        || obj.properties.values().any(|d| match d {
            PropertyDescriptor::Data { writable, .. } => !writable,
            PropertyDescriptor::Accessor { configurable, .. } => !configurable,
        }))
}

/// Memoized source → writable copy table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WritableCopies {
    copies: BTreeMap<ObjectHandle, ObjectHandle>,
}

impl WritableCopies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: ObjectHandle) -> Option<ObjectHandle> {
        self.copies.get(&source).copied()
    }

    /// Copy of `source` that accepts the view's invariants.  Returns the
    /// copy and whether it was built by this call.
    ///
    /// Arrays become a fresh array holding the same elements and length;
    /// holes stay holes.  Other
    /// objects keep their prototype and class tag and receive every own
    /// descriptor with `configurable` forced on.
    pub fn writable_copy_of(
        &mut self,
        heap: &mut ObjectHeap,
        source: ObjectHandle,
    ) -> Result<(ObjectHandle, bool), ObjectError> {
        if let Some(copy) = self.get(source) {
            return Ok((copy, false));
        }
        let original = heap.ordinary(source)?;
        let copy = if original.is_array() {
            let mut fresh = OrdinaryObject::with_prototype(Some(heap.array_prototype()));
            fresh.class_tag = Some(ARRAY_TAG.to_string());
            let indices = original
                .properties
                .keys()
                .filter(|k| k.array_index().is_some());
            for key in indices {
                let value = heap.get_property(source, key)?;
                fresh
                    .properties
                    .insert(key.clone(), PropertyDescriptor::data(value));
            }
            fresh.properties.insert(
                PropertyKey::from(LENGTH_KEY),
                PropertyDescriptor::hidden(JsValue::Int(i64::from(original.array_length()))),
            );
            heap.insert_ordinary(fresh)
        } else {
            let mut fresh = OrdinaryObject::with_prototype(original.prototype);
            fresh.class_tag = original.class_tag.clone();
            for (key, desc) in &original.properties {
                let mut desc = desc.clone();
                desc.set_configurable();
                fresh.properties.insert(key.clone(), desc);
            }
            heap.insert_ordinary(fresh)
        };
        self.copies.insert(source, copy);
        Ok((copy, true))
    }
}
