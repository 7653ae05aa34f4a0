//! Read-tracking views over object graphs and selective change detection.
//!
//! A consumer reads through a tracking view produced by [`Realm::wrap`]; every
//! existence check, own-key check, key enumeration and value read is recorded
//! per source node in a usage registry.  [`Realm::is_changed`] later answers
//! whether a candidate graph differs from the original in the parts that
//! were read, in time proportional to the read set.
//!
//! ```text
//! let registry = realm.create_registry();
//! let view = realm.wrap(&state, registry, Some(cache))?;
//! realm.get(&view, &"a".into())?;
//! realm.is_changed(&state, &next, registry, None, CompareMode::empty())?;
//! ```

#![forbid(unsafe_code)]

pub mod change_detection;
pub mod frozen_copy;
pub mod object_model;
pub mod path_list;
pub mod realm;
pub mod trackability;
pub mod usage;
pub mod wrapper_cache;

pub use change_detection::{ChangeMemo, CompareMode, MemoEntry};
pub use object_model::{
    JsValue, ObjectError, ObjectHandle, ObjectHeap, PropertyDescriptor, PropertyKey, WriteOp,
};
pub use path_list::PathSegment;
pub use realm::{Realm, RealmConfig, TrackingEvent, TrackingEventKind};
pub use usage::{RegistryId, UsageRecord, UsageRegistry};
pub use wrapper_cache::CacheId;
