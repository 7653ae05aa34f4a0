//! Tracking realm.
//!
//! A [`Realm`] owns the object heap together with everything tracking
//! needs: trackability overrides, writable copies of frozen sources, usage
//! registries (one per tracking session) and wrapper identity caches.
//!
//! Reads are observed through the realm's accessor API (`get`, `has`,
//! `has_own`, `own_keys`, ...).  Each accessor accepts raw objects and
//! wrappers alike; only wrappers record.  A value read through a wrapper is
//! itself wrapped, bound to the same registry and cache, so a traversal that
//! starts from one wrapper records every level it touches.
//!
//! Child views are shared: through the bound wrapper cache when there is
//! one, otherwise through a per-session table, so repeated reads of the same
//! child never allocate a second view.
//!
//! Lifecycle: registries and caches are created and released explicitly.
//! A wrapper whose registry was released stays usable as a pass-through
//! view and records nothing; children read through it come back unwrapped
//! unless its cache is still live.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::change_detection::{ChangeDetector, ChangeMemo, CompareMode};
use crate::frozen_copy::{WritableCopies, is_effectively_frozen};
use crate::object_model::{
    JsValue, LENGTH_KEY, ObjectError, ObjectHandle, ObjectHeap, PropertyDescriptor, PropertyKey,
    WriteOp, to_array_length,
};
use crate::path_list::{PathSegment, PathWalker};
use crate::trackability::TrackabilityTable;
use crate::usage::{Access, RegistryId, UsageRegistry};
use crate::wrapper_cache::{CacheId, WrapperCache, WrapperState};

/// Default bound on comparison recursion depth.
pub const DEFAULT_MAX_COMPARE_DEPTH: u32 = 1024;

// ---------------------------------------------------------------------------
// RealmConfig
// ---------------------------------------------------------------------------

/// Configuration controlling realm behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmConfig {
    /// Maximum nesting depth `is_changed` descends before failing with
    /// [`ObjectError::CompareDepthExceeded`].
    pub max_compare_depth: u32,
    /// Keep [`TrackingEvent`]s for later draining.
    pub record_events: bool,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            max_compare_depth: DEFAULT_MAX_COMPARE_DEPTH,
            record_events: true,
        }
    }
}

impl RealmConfig {
    /// Configuration that keeps no event log.
    pub fn quiet() -> Self {
        Self {
            record_events: false,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// TrackingEvent: structured events for diagnostics
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingEventKind {
    /// A new wrapper was built for the source.
    WrapperCreated { wrapper: ObjectHandle, frozen: bool },
    /// A cached wrapper was handed out again.
    WrapperReused { wrapper: ObjectHandle },
    /// The cached wrapper no longer matched the source's frozen-ness.
    WrapperReplaced {
        previous: ObjectHandle,
        wrapper: ObjectHandle,
    },
    /// A writable copy of a frozen source was built.
    WritableCopyCreated { copy: ObjectHandle },
    /// The source was declared fully used in a registry.
    MarkedFullyUsed { registry: RegistryId },
    /// A mutation through a frozen-source wrapper was refused.
    WriteRejected { op: WriteOp, key: String },
}

/// Structured event emitted by the realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// Monotonic sequence number for deterministic ordering.
    pub sequence: u64,
    /// Source node the event concerns.
    pub source: ObjectHandle,
    pub kind: TrackingEventKind,
}

// ---------------------------------------------------------------------------
// Escape-hatch marker
// ---------------------------------------------------------------------------

/// Marker sent through the existence channel by [`Realm::track_memo`].
/// Not constructible outside this module, so no caller key can collide.
#[derive(Debug, Clone, Copy)]
struct TrackToken;

#[derive(Debug, Clone, Copy)]
enum HasQuery<'a> {
    Key(&'a PropertyKey),
    Marker(TrackToken),
}

/// Where a wrap call looks for, and stores, an existing view.
#[derive(Debug, Clone, Copy)]
enum ViewTable {
    /// Caller-visible wrapper cache.
    Cache(CacheId),
    /// Views a cacheless session built for children.
    Session(RegistryId),
}

fn object_operand(value: &JsValue, op: &str) -> Result<ObjectHandle, ObjectError> {
    value
        .as_object()
        .ok_or_else(|| ObjectError::TypeError(format!("cannot {op} on {}", value.type_name())))
}

// ---------------------------------------------------------------------------
// Realm
// ---------------------------------------------------------------------------

/// Heap plus tracking state.
#[derive(Debug, Clone, Default)]
pub struct Realm {
    heap: ObjectHeap,
    trackability: TrackabilityTable,
    copies: WritableCopies,
    registries: BTreeMap<RegistryId, UsageRegistry>,
    caches: BTreeMap<CacheId, WrapperCache>,
    session_views: BTreeMap<RegistryId, WrapperCache>,
    next_registry: u64,
    next_cache: u64,
    config: RealmConfig,
    event_sequence: u64,
    events: Vec<TrackingEvent>,
}

impl Realm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RealmConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &RealmConfig {
        &self.config
    }

    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    /// Direct heap access.  Operations on the heap never record usage.
    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut self.heap
    }

    // -- Events --------------------------------------------------------------

    fn emit(&mut self, source: ObjectHandle, kind: TrackingEventKind) {
        if !self.config.record_events {
            return;
        }
        self.event_sequence += 1;
        self.events.push(TrackingEvent {
            sequence: self.event_sequence,
            source,
            kind,
        });
    }

    /// All recorded events not yet drained.
    pub fn events(&self) -> &[TrackingEvent] {
        &self.events
    }

    /// Current event sequence number.
    pub fn event_sequence(&self) -> u64 {
        self.event_sequence
    }

    pub fn drain_events(&mut self) -> Vec<TrackingEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Sessions --------------------------------------------------------------

    /// Start a tracking session.
    pub fn create_registry(&mut self) -> RegistryId {
        self.next_registry += 1;
        let id = RegistryId(self.next_registry);
        self.registries.insert(id, UsageRegistry::new());
        self.session_views.insert(id, WrapperCache::new());
        id
    }

    pub fn registry(&self, id: RegistryId) -> Result<&UsageRegistry, ObjectError> {
        self.registries
            .get(&id)
            .ok_or(ObjectError::UnknownRegistry(id))
    }

    /// End a tracking session, handing back what it recorded.  The result
    /// can still be queried with [`Realm::is_changed_in`] and
    /// [`Realm::path_list_in`].
    pub fn release_registry(&mut self, id: RegistryId) -> Result<UsageRegistry, ObjectError> {
        self.session_views.remove(&id);
        self.registries
            .remove(&id)
            .ok_or(ObjectError::UnknownRegistry(id))
    }

    pub fn create_wrapper_cache(&mut self) -> CacheId {
        self.next_cache += 1;
        let id = CacheId(self.next_cache);
        self.caches.insert(id, WrapperCache::new());
        id
    }

    pub fn wrapper_cache(&self, id: CacheId) -> Result<&WrapperCache, ObjectError> {
        self.caches
            .get(&id)
            .ok_or(ObjectError::UnknownWrapperCache(id))
    }

    pub fn release_wrapper_cache(&mut self, id: CacheId) -> Result<WrapperCache, ObjectError> {
        self.caches
            .remove(&id)
            .ok_or(ObjectError::UnknownWrapperCache(id))
    }

    // -- Trackability ----------------------------------------------------------

    /// Opt an object in to (or out of) tracking.  Primitives are ignored;
    /// wrappers apply the override to their source.
    pub fn mark_trackable(&mut self, value: &JsValue, trackable: bool) {
        self.trackability.mark(&self.heap, value, trackable);
    }

    pub fn is_trackable(&self, value: &JsValue) -> Result<bool, ObjectError> {
        self.trackability.is_trackable(&self.heap, value)
    }

    // -- Wrapping ----------------------------------------------------------------

    /// Tracking view of `value` recording into `registry`.
    ///
    /// Non-trackable values come back unchanged.  Wrappers are unwrapped to
    /// their source first, so views never nest.  With a cache, the same
    /// source yields the same view for as long as its frozen-ness holds;
    /// without one, every call builds a new view.
    pub fn wrap(
        &mut self,
        value: &JsValue,
        registry: RegistryId,
        cache: Option<CacheId>,
    ) -> Result<JsValue, ObjectError> {
        self.registry(registry)?;
        let table = match cache {
            Some(id) => {
                self.wrapper_cache(id)?;
                Some(ViewTable::Cache(id))
            }
            None => None,
        };
        self.wrap_bound(value, registry, cache, table)
    }

    /// View for a child read through a wrapper bound to `registry` and
    /// `cache`.  With neither a live cache nor a live session there is
    /// nothing to own a new view, so the child comes back unwrapped.
    fn wrap_child(
        &mut self,
        value: &JsValue,
        registry: RegistryId,
        cache: Option<CacheId>,
    ) -> Result<JsValue, ObjectError> {
        let table = match cache.filter(|id| self.caches.contains_key(id)) {
            Some(id) => ViewTable::Cache(id),
            None if self.session_views.contains_key(&registry) => ViewTable::Session(registry),
            None => return Ok(value.clone()),
        };
        self.wrap_bound(value, registry, cache, Some(table))
    }

    fn view_table(&self, table: ViewTable) -> Option<&WrapperCache> {
        match table {
            ViewTable::Cache(id) => self.caches.get(&id),
            ViewTable::Session(id) => self.session_views.get(&id),
        }
    }

    fn view_table_mut(&mut self, table: ViewTable) -> Option<&mut WrapperCache> {
        match table {
            ViewTable::Cache(id) => self.caches.get_mut(&id),
            ViewTable::Session(id) => self.session_views.get_mut(&id),
        }
    }

    fn wrap_bound(
        &mut self,
        value: &JsValue,
        registry: RegistryId,
        cache: Option<CacheId>,
        table: Option<ViewTable>,
    ) -> Result<JsValue, ObjectError> {
        let Some(handle) = value.as_object() else {
            return Ok(value.clone());
        };
        if !self.is_trackable(value)? {
            return Ok(value.clone());
        }
        let source = self.heap.source_of(handle);
        let frozen = is_effectively_frozen(&self.heap, source)?;
        let cached = table
            .and_then(|t| self.view_table(t))
            .and_then(|c| c.get(source));

        let wrapper = match cached {
            Some(wrapper)
                if self
                    .heap
                    .wrapper_state(wrapper)
                    .is_some_and(|state| state.frozen == frozen) =>
            {
                self.emit(source, TrackingEventKind::WrapperReused { wrapper });
                wrapper
            }
            previous => {
                let target = if frozen {
                    let (copy, created) = self.copies.writable_copy_of(&mut self.heap, source)?;
                    if created {
                        self.emit(source, TrackingEventKind::WritableCopyCreated { copy });
                    }
                    copy
                } else {
                    source
                };
                let wrapper = self.heap.alloc_wrapper(WrapperState {
                    source,
                    target,
                    frozen,
                    registry,
                    cache,
                });
                if let Some(c) = table.and_then(|t| self.view_table_mut(t)) {
                    c.insert(source, wrapper);
                }
                debug!(%source, %wrapper, frozen, "built tracking wrapper");
                let kind = match previous {
                    Some(previous) => TrackingEventKind::WrapperReplaced { previous, wrapper },
                    None => TrackingEventKind::WrapperCreated { wrapper, frozen },
                };
                self.emit(source, kind);
                wrapper
            }
        };

        if let Some(state) = self.heap.wrapper_state_mut(wrapper) {
            state.registry = registry;
            state.cache = cache;
        }
        Ok(JsValue::Object(wrapper))
    }

    /// Source node behind a wrapper; `None` for anything else.
    pub fn untracked(&self, value: &JsValue) -> Option<ObjectHandle> {
        let handle = value.as_object()?;
        self.heap.wrapper_state(handle).map(|state| state.source)
    }

    fn wrapper_of(&self, handle: ObjectHandle) -> Option<WrapperState> {
        self.heap.wrapper_state(handle).copied()
    }

    fn record(&mut self, state: &WrapperState, access: Access<'_>) {
        let Some(registry) = self.registries.get_mut(&state.registry) else {
            return;
        };
        if registry.record(state.source, access) {
            trace!(source = %state.source, registry = %state.registry, %access, "recorded access");
        }
    }

    // -- Interception ----------------------------------------------------------

    /// Read `object[key]`.  Through a wrapper this records a value read and
    /// returns the child wrapped with the same registry and cache.
    pub fn get(&mut self, object: &JsValue, key: &PropertyKey) -> Result<JsValue, ObjectError> {
        let handle = object_operand(object, "read property")?;
        let value = self.heap.get_property(handle, key)?;
        match self.wrapper_of(handle) {
            Some(state) => {
                self.record(&state, Access::Value(key));
                self.wrap_child(&value, state.registry, state.cache)
            }
            None => Ok(value),
        }
    }

    /// `key in object`.
    pub fn has(&mut self, object: &JsValue, key: &PropertyKey) -> Result<bool, ObjectError> {
        let handle = object_operand(object, "check property")?;
        self.has_query(handle, HasQuery::Key(key))
    }

    fn has_query(&mut self, handle: ObjectHandle, query: HasQuery<'_>) -> Result<bool, ObjectError> {
        let state = self.wrapper_of(handle);
        match query {
            HasQuery::Key(key) => {
                if let Some(state) = state {
                    self.record(&state, Access::Has(key));
                }
                self.heap.has_property(handle, key)
            }
            HasQuery::Marker(TrackToken) => {
                let Some(state) = state else {
                    return Ok(false);
                };
                let Some(registry) = self.registries.get_mut(&state.registry) else {
                    return Ok(true);
                };
                registry.mark_fully_used(state.source);
                debug!(source = %state.source, registry = %state.registry, "marked fully used");
                self.emit(
                    state.source,
                    TrackingEventKind::MarkedFullyUsed {
                        registry: state.registry,
                    },
                );
                Ok(true)
            }
        }
    }

    /// `Object.hasOwn(object, key)`.
    pub fn has_own(&mut self, object: &JsValue, key: &PropertyKey) -> Result<bool, ObjectError> {
        let handle = object_operand(object, "check own property")?;
        if let Some(state) = self.wrapper_of(handle) {
            self.record(&state, Access::HasOwn(key));
        }
        self.heap.has_own(handle, key)
    }

    /// `Object.getOwnPropertyDescriptor(object, key)`.  The descriptor's
    /// value is returned as stored, not wrapped.
    pub fn get_own_property_descriptor(
        &mut self,
        object: &JsValue,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ObjectError> {
        let handle = object_operand(object, "inspect own property")?;
        if let Some(state) = self.wrapper_of(handle) {
            self.record(&state, Access::HasOwn(key));
        }
        self.heap.get_own_property_descriptor(handle, key)
    }

    /// `Reflect.ownKeys(object)`.
    pub fn own_keys(&mut self, object: &JsValue) -> Result<Vec<PropertyKey>, ObjectError> {
        let handle = object_operand(object, "list own keys")?;
        if let Some(state) = self.wrapper_of(handle) {
            self.record(&state, Access::AllOwnKeys);
        }
        self.heap.own_keys(handle)
    }

    /// `Object.keys(object)`.
    pub fn keys(&mut self, object: &JsValue) -> Result<Vec<String>, ObjectError> {
        let handle = object_operand(object, "list keys")?;
        if let Some(state) = self.wrapper_of(handle) {
            self.record(&state, Access::AllOwnKeys);
        }
        self.heap.keys(handle)
    }

    /// Element values of an array (reads `length`, then each present index
    /// below it), or the enumerable own values of an object (enumerates keys,
    /// then reads each).  Holes are skipped.
    pub fn values(&mut self, object: &JsValue) -> Result<Vec<JsValue>, ObjectError> {
        let handle = object_operand(object, "list values")?;
        let keys: Vec<PropertyKey> = if self.heap.is_array(handle)? {
            let length = self.get(object, &PropertyKey::from(LENGTH_KEY))?;
            let len = to_array_length(&length).unwrap_or(0);
            let target = self.wrapper_of(handle).map_or(handle, |state| state.target);
            self.heap
                .own_keys(target)?
                .into_iter()
                .filter(|key| key.array_index().is_some_and(|i| i < len))
                .collect()
        } else {
            self.keys(object)?.into_iter().map(PropertyKey::from).collect()
        };
        keys.iter().map(|key| self.get(object, key)).collect()
    }

    /// `object[key] = value`.  Writes record nothing.  Fails when the view's
    /// source is frozen, or when the property rejects the assignment.
    pub fn set(&mut self, object: &JsValue, key: PropertyKey, value: JsValue) -> Result<(), ObjectError> {
        let handle = object_operand(object, "set property")?;
        self.reject_frozen_write(handle, WriteOp::Set, &key)?;
        if self.heap.set_property(handle, key.clone(), value)? {
            Ok(())
        } else {
            Err(ObjectError::TypeError(format!(
                "cannot assign to read only property '{key}'"
            )))
        }
    }

    /// `delete object[key]`.
    pub fn delete(&mut self, object: &JsValue, key: &PropertyKey) -> Result<(), ObjectError> {
        let handle = object_operand(object, "delete property")?;
        self.reject_frozen_write(handle, WriteOp::Delete, key)?;
        if self.heap.delete_property(handle, key)? {
            Ok(())
        } else {
            Err(ObjectError::TypeError(format!(
                "cannot delete property '{key}'"
            )))
        }
    }

    fn reject_frozen_write(
        &mut self,
        handle: ObjectHandle,
        op: WriteOp,
        key: &PropertyKey,
    ) -> Result<(), ObjectError> {
        let Some(state) = self.wrapper_of(handle).filter(|state| state.frozen) else {
            return Ok(());
        };
        let key = key.to_string();
        self.emit(
            state.source,
            TrackingEventKind::WriteRejected {
                op,
                key: key.clone(),
            },
        );
        Err(ObjectError::WriteToImmutable { op, key })
    }

    /// `Object.getPrototypeOf(object)`.  Views report their source's prototype.
    pub fn get_prototype_of(&self, object: &JsValue) -> Result<Option<ObjectHandle>, ObjectError> {
        let handle = object_operand(object, "get prototype")?;
        self.heap.get_prototype_of(handle)
    }

    // -- Escape hatch, comparison, reconstruction --------------------------------

    /// Declare the node behind a wrapper fully used: its granular record is
    /// dropped and later reads of it are not recorded in this session, so
    /// comparisons treat it as one opaque unit.  Returns `true` only for
    /// wrappers.
    pub fn track_memo(&mut self, value: &JsValue) -> Result<bool, ObjectError> {
        match value.as_object() {
            Some(handle) => self.has_query(handle, HasQuery::Marker(TrackToken)),
            None => Ok(false),
        }
    }

    /// Whether `next` differs from `prev` in anything `registry` saw read.
    pub fn is_changed(
        &self,
        prev: &JsValue,
        next: &JsValue,
        registry: RegistryId,
        memo: Option<&mut ChangeMemo>,
        mode: CompareMode,
    ) -> Result<bool, ObjectError> {
        let registry = self.registry(registry)?;
        self.is_changed_in(prev, next, registry, memo, mode)
    }

    /// [`Realm::is_changed`] against a usage registry held by the caller,
    /// such as one returned by [`Realm::release_registry`].
    pub fn is_changed_in(
        &self,
        prev: &JsValue,
        next: &JsValue,
        usage: &UsageRegistry,
        memo: Option<&mut ChangeMemo>,
        mode: CompareMode,
    ) -> Result<bool, ObjectError> {
        ChangeDetector::new(&self.heap, usage, self.config.max_compare_depth)
            .is_changed(prev, next, memo, mode)
    }

    /// Every recorded access reachable from `root`, as key paths.  With
    /// `only_with_values`, value reads of keys without an own data property
    /// (accessors, inherited keys) are left out.
    pub fn path_list(
        &self,
        root: &JsValue,
        registry: RegistryId,
        only_with_values: bool,
    ) -> Result<Vec<Vec<PathSegment>>, ObjectError> {
        let registry = self.registry(registry)?;
        self.path_list_in(root, registry, only_with_values)
    }

    /// [`Realm::path_list`] over a usage registry held by the caller.
    pub fn path_list_in(
        &self,
        root: &JsValue,
        usage: &UsageRegistry,
        only_with_values: bool,
    ) -> Result<Vec<Vec<PathSegment>>, ObjectError> {
        PathWalker::new(&self.heap, usage, only_with_values).collect(root)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
