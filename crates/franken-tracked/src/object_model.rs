//! Object model observed by the tracker: property keys, values, descriptors,
//! ordinary objects, and the handle-addressed heap that owns them.
//!
//! - **Property descriptors**: data vs accessor, configurable/enumerable/writable
//! - **Prototype chains**: `[[Prototype]]` slot with bounded, cycle-checked walks
//! - **Intrinsics**: bare object and array prototypes, plus one lazily created
//!   prototype per opaque built-in tag (`Date`, `Map`, `RegExp`, ...)
//! - **Wrapper slots**: tracking views live in the same arena as the objects
//!   they wrap, so they can be embedded in graphs and compared by identity
//!
//! Every raw heap operation sees through a wrapper slot to its target and
//! never records usage; recording is the job of [`crate::realm::Realm`].
//!
//! Own properties keep insertion order so enumeration follows ES2020 order:
//! array indices ascending, then string keys, then symbol keys.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::usage::RegistryId;
use crate::wrapper_cache::{CacheId, WrapperState};

/// Key of the array `length` property.
pub const LENGTH_KEY: &str = "length";

/// Class tag carried by array objects.
pub const ARRAY_TAG: &str = "Array";

/// Maximum prototype chain depth to prevent infinite loops.
pub const MAX_PROTOTYPE_CHAIN_DEPTH: u32 = 1024;

/// Array length `value` denotes: an integer in `0..=u32::MAX`.
pub fn to_array_length(value: &JsValue) -> Option<u32> {
    match value {
        JsValue::Int(n) => u32::try_from(*n).ok(),
        _ => None,
    }
}

fn invalid_array_length(value: &JsValue) -> ObjectError {
    ObjectError::TypeError(format!("invalid array length {value}"))
}

// ---------------------------------------------------------------------------
// PropertyKey: string or symbol
// ---------------------------------------------------------------------------

/// Unique symbol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// A property key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    /// String key.
    String(String),
    /// Symbol key (allocated by the heap).
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Key for array element `index`.
    pub fn index(index: u32) -> Self {
        Self::String(index.to_string())
    }

    /// Canonical array index this key names, if any (`"7"` but not `"07"`).
    pub fn array_index(&self) -> Option<u32> {
        match self {
            Self::String(s) => {
                let n = s.parse::<u32>().ok()?;
                (n != u32::MAX && n.to_string() == *s).then_some(n)
            }
            Self::Symbol(_) => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(id: SymbolId) -> Self {
        Self::Symbol(id)
    }
}

// ---------------------------------------------------------------------------
// ObjectHandle: typed reference to heap objects
// ---------------------------------------------------------------------------

/// Opaque handle referencing an object on the heap.  Handle equality is
/// object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// JsValue
// ---------------------------------------------------------------------------

/// A value stored in a property slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Symbol(SymbolId),
    Object(ObjectHandle),
}

impl JsValue {
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(h) => Some(*h),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "number",
            Self::Str(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
        }
    }

    /// SameValue comparison: identity for objects, equality for primitives.
    pub fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
            Self::Object(h) => write!(f, "[{h}]"),
        }
    }
}

impl From<bool> for JsValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for JsValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for JsValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for JsValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<ObjectHandle> for JsValue {
    fn from(h: ObjectHandle) -> Self {
        Self::Object(h)
    }
}

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

/// Native getter.  Receives the heap and the object the lookup started from.
pub type Getter = fn(&ObjectHeap, ObjectHandle) -> Result<JsValue, ObjectError>;

/// Native setter.  Receives the heap, the receiver, and the assigned value.
pub type Setter = fn(&mut ObjectHeap, ObjectHandle, JsValue) -> Result<(), ObjectError>;

/// ES2020 property descriptor (§6.2.5).
#[derive(Debug, Clone)]
pub enum PropertyDescriptor {
    /// Data descriptor: has `value` and `writable`.
    Data {
        value: JsValue,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    /// Accessor descriptor backed by native functions.
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
        enumerable: bool,
        configurable: bool,
    },
}

impl PartialEq for PropertyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Data {
                    value: a,
                    writable: aw,
                    enumerable: ae,
                    configurable: ac,
                },
                Self::Data {
                    value: b,
                    writable: bw,
                    enumerable: be,
                    configurable: bc,
                },
            ) => a.same_value(b) && aw == bw && ae == be && ac == bc,
            (
                Self::Accessor {
                    get: ag,
                    set: aset,
                    enumerable: ae,
                    configurable: ac,
                },
                Self::Accessor {
                    get: bg,
                    set: bset,
                    enumerable: be,
                    configurable: bc,
                },
            ) => same_getter(*ag, *bg) && same_setter(*aset, *bset) && ae == be && ac == bc,
            _ => false,
        }
    }
}

fn same_getter(a: Option<Getter>, b: Option<Getter>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => std::ptr::fn_addr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn same_setter(a: Option<Setter>, b: Option<Setter>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => std::ptr::fn_addr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl PropertyDescriptor {
    /// Create a default data descriptor (writable, enumerable, configurable).
    pub fn data(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Create a non-writable, non-enumerable, non-configurable data descriptor.
    pub fn data_frozen(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }

    /// Writable, configurable, but non-enumerable (array `length`).
    pub fn hidden(value: JsValue) -> Self {
        Self::Data {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Enumerable, configurable accessor.
    pub fn accessor(get: Option<Getter>, set: Option<Setter>) -> Self {
        Self::Accessor {
            get,
            set,
            enumerable: true,
            configurable: true,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data { .. })
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }

    /// Get the value if this is a data descriptor.
    pub fn value(&self) -> Option<&JsValue> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Is this a data descriptor with writable=true?  Accessors report false.
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { writable, .. } => *writable,
            Self::Accessor { .. } => false,
        }
    }

    pub fn set_configurable(&mut self) {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => {
                *configurable = true;
            }
        }
    }

    pub fn set_non_configurable(&mut self) {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => {
                *configurable = false;
            }
        }
    }

    /// Make this data descriptor non-writable (no-op for accessors).
    pub fn set_non_writable(&mut self) {
        if let Self::Data { writable, .. } = self {
            *writable = false;
        }
    }

    pub fn set_non_enumerable(&mut self) {
        match self {
            Self::Data { enumerable, .. } | Self::Accessor { enumerable, .. } => {
                *enumerable = false;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectError
// ---------------------------------------------------------------------------

/// Mutation kind rejected by a frozen-source view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    Set,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => f.write_str("set"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Errors from object model and tracking operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ObjectError {
    /// Host TypeError (strict-mode write failure, read on a primitive, ...).
    #[error("TypeError: {0}")]
    TypeError(String),
    /// Mutation through a view whose source was frozen when it was wrapped.
    #[error("TypeError: '{op}' on tracking view rejected for property '{key}' (source is frozen)")]
    WriteToImmutable { op: WriteOp, key: String },
    /// Object not found in the heap.
    #[error("{0} not found")]
    ObjectNotFound(ObjectHandle),
    /// Prototype chain cycle detected.
    #[error("TypeError: prototype chain cycle detected")]
    PrototypeCycleDetected,
    /// Maximum prototype chain depth exceeded.
    #[error("TypeError: prototype chain depth {depth} exceeds max {max}")]
    PrototypeChainTooDeep { depth: u32, max: u32 },
    /// Usage registry was never created or has been released.
    #[error("usage registry {0} is not live")]
    UnknownRegistry(RegistryId),
    /// Wrapper cache was never created or has been released.
    #[error("wrapper cache {0} is not live")]
    UnknownWrapperCache(CacheId),
    /// Comparison recursed deeper than the configured bound.
    #[error("RangeError: comparison exceeded maximum depth {max}")]
    CompareDepthExceeded { max: u32 },
}

// ---------------------------------------------------------------------------
// OrdinaryObject
// ---------------------------------------------------------------------------

/// An ordinary object with internal slots.
#[derive(Debug, Clone, PartialEq)]
pub struct OrdinaryObject {
    /// `[[Prototype]]` internal slot (None means end of chain).
    pub prototype: Option<ObjectHandle>,
    /// `[[Extensible]]` internal slot.
    pub extensible: bool,
    /// Own properties in insertion order.
    pub properties: IndexMap<PropertyKey, PropertyDescriptor>,
    /// Class tag (`"Array"`, `"Date"`, ...).
    pub class_tag: Option<String>,
}

impl Default for OrdinaryObject {
    fn default() -> Self {
        Self {
            prototype: None,
            extensible: true,
            properties: IndexMap::new(),
            class_tag: None,
        }
    }
}

impl OrdinaryObject {
    pub fn with_prototype(proto: Option<ObjectHandle>) -> Self {
        Self {
            prototype: proto,
            ..Self::default()
        }
    }

    pub fn is_array(&self) -> bool {
        self.class_tag.as_deref() == Some(ARRAY_TAG)
    }

    /// `[[GetOwnProperty]](P)`.
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.properties.contains_key(key)
    }

    /// `[[DefineOwnProperty]](P, Desc)`: define or update a property.
    ///
    /// Returns `Ok(true)` if the property was defined, `Ok(false)` if
    /// rejected (non-configurable conflict or non-extensible object).
    pub fn define_own_property(
        &mut self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        let new_length = match &desc {
            PropertyDescriptor::Data { value, .. }
                if self.is_array() && key == PropertyKey::from(LENGTH_KEY) =>
            {
                Some(to_array_length(value).ok_or_else(|| invalid_array_length(value))?)
            }
            _ => None,
        };
        if self.define_checked(key, desc)? {
            if let Some(len) = new_length {
                self.truncate_elements(len);
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn define_checked(
        &mut self,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        let Some(current) = self.properties.get(&key) else {
            if !self.extensible {
                return Ok(false);
            }
            self.properties.insert(key, desc);
            return Ok(true);
        };
        if !current.is_configurable() {
            if desc.is_configurable()
                || desc.is_enumerable() != current.is_enumerable()
                || current.is_data() != desc.is_data()
            {
                return Ok(false);
            }
            if let (
                PropertyDescriptor::Data {
                    writable: current_w,
                    value: current_v,
                    ..
                },
                PropertyDescriptor::Data {
                    writable: new_w,
                    value: new_v,
                    ..
                },
            ) = (current, &desc)
                && !current_w
                && (*new_w || !current_v.same_value(new_v))
            {
                return Ok(false);
            }
            if current.is_accessor() && *current != desc {
                return Ok(false);
            }
        }
        self.properties.insert(key, desc);
        Ok(true)
    }

    /// `[[Delete]](P)`: returns `false` if non-configurable.
    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        match self.properties.get(key) {
            Some(desc) if !desc.is_configurable() => false,
            Some(_) => {
                self.properties.shift_remove(key);
                true
            }
            None => true,
        }
    }

    /// `[[OwnPropertyKeys]]()`: array indices ascending, then string keys
    /// in insertion order, then symbol keys in insertion order.
    pub fn own_property_keys(&self) -> Vec<PropertyKey> {
        let mut int_keys: Vec<(u32, PropertyKey)> = Vec::new();
        let mut str_keys: Vec<PropertyKey> = Vec::new();
        let mut sym_keys: Vec<PropertyKey> = Vec::new();

        for key in self.properties.keys() {
            match (key.array_index(), key) {
                (Some(n), _) => int_keys.push((n, key.clone())),
                (None, PropertyKey::String(_)) => str_keys.push(key.clone()),
                (None, PropertyKey::Symbol(_)) => sym_keys.push(key.clone()),
            }
        }

        int_keys.sort_by_key(|(n, _)| *n);
        let mut result: Vec<PropertyKey> = int_keys.into_iter().map(|(_, k)| k).collect();
        result.extend(str_keys);
        result.extend(sym_keys);
        result
    }

    /// Current array `length` (0 when absent or not a valid length).
    pub fn array_length(&self) -> u32 {
        self.properties
            .get(&PropertyKey::from(LENGTH_KEY))
            .and_then(PropertyDescriptor::value)
            .and_then(to_array_length)
            .unwrap_or(0)
    }

    /// Drop index properties at or beyond `len`.
    fn truncate_elements(&mut self, len: u32) {
        self.properties
            .retain(|k, _| k.array_index().is_none_or(|i| i < len));
    }

    pub fn prevent_extensions(&mut self) {
        self.extensible = false;
    }

    /// `Object.freeze` semantics.
    pub fn freeze(&mut self) {
        self.extensible = false;
        for desc in self.properties.values_mut() {
            desc.set_non_configurable();
            desc.set_non_writable();
        }
    }

    /// `Object.seal` semantics.
    pub fn seal(&mut self) {
        self.extensible = false;
        for desc in self.properties.values_mut() {
            desc.set_non_configurable();
        }
    }

    /// Non-extensible, every property non-configurable, every data property
    /// non-writable.
    pub fn is_frozen(&self) -> bool {
        !self.extensible
            && self
                .properties
                .values()
                .all(|d| !d.is_configurable() && (d.is_accessor() || !d.is_writable()))
    }

    pub fn is_sealed(&self) -> bool {
        !self.extensible && self.properties.values().all(|d| !d.is_configurable())
    }
}

// ---------------------------------------------------------------------------
// ManagedObject: ordinary object or tracking wrapper
// ---------------------------------------------------------------------------

/// A heap slot: either an ordinary object or a tracking wrapper.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    Ordinary(OrdinaryObject),
    Wrapper(WrapperState),
}

impl ManagedObject {
    pub fn as_ordinary(&self) -> Option<&OrdinaryObject> {
        match self {
            Self::Ordinary(o) => Some(o),
            Self::Wrapper(_) => None,
        }
    }

    pub fn as_ordinary_mut(&mut self) -> Option<&mut OrdinaryObject> {
        match self {
            Self::Ordinary(o) => Some(o),
            Self::Wrapper(_) => None,
        }
    }

    pub fn as_wrapper(&self) -> Option<&WrapperState> {
        match self {
            Self::Wrapper(w) => Some(w),
            Self::Ordinary(_) => None,
        }
    }

    pub fn as_wrapper_mut(&mut self) -> Option<&mut WrapperState> {
        match self {
            Self::Wrapper(w) => Some(w),
            Self::Ordinary(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectHeap
// ---------------------------------------------------------------------------

/// Arena of managed objects plus the intrinsic prototypes.
#[derive(Debug, Clone)]
pub struct ObjectHeap {
    objects: Vec<ManagedObject>,
    next_symbol: u32,
    object_prototype: ObjectHandle,
    array_prototype: ObjectHandle,
    builtin_prototypes: BTreeMap<String, ObjectHandle>,
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectHeap {
    /// Create a heap holding only the bare object and array prototypes.
    pub fn new() -> Self {
        let object_prototype = ObjectHandle(0);
        let array_prototype = ObjectHandle(1);
        Self {
            objects: vec![
                ManagedObject::Ordinary(OrdinaryObject::with_prototype(None)),
                ManagedObject::Ordinary(OrdinaryObject::with_prototype(Some(object_prototype))),
            ],
            next_symbol: 1,
            object_prototype,
            array_prototype,
            builtin_prototypes: BTreeMap::new(),
        }
    }

    /// The bare object prototype (`Object.prototype`).
    pub fn object_prototype(&self) -> ObjectHandle {
        self.object_prototype
    }

    /// The bare array prototype (`Array.prototype`).
    pub fn array_prototype(&self) -> ObjectHandle {
        self.array_prototype
    }

    fn push(&mut self, obj: ManagedObject) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(obj);
        handle
    }

    /// Allocate an ordinary object with the given prototype.
    pub fn alloc(&mut self, proto: Option<ObjectHandle>) -> ObjectHandle {
        self.push(ManagedObject::Ordinary(OrdinaryObject::with_prototype(proto)))
    }

    /// Allocate an empty plain object (`{}`).
    pub fn alloc_object(&mut self) -> ObjectHandle {
        self.alloc(Some(self.object_prototype))
    }

    /// Allocate a plain object from `(key, value)` pairs in order.
    pub fn object_from_entries<K, I>(&mut self, entries: I) -> ObjectHandle
    where
        K: Into<PropertyKey>,
        I: IntoIterator<Item = (K, JsValue)>,
    {
        let mut obj = OrdinaryObject::with_prototype(Some(self.object_prototype));
        for (key, value) in entries {
            obj.properties
                .insert(key.into(), PropertyDescriptor::data(value));
        }
        self.push(ManagedObject::Ordinary(obj))
    }

    /// Allocate an array holding `elements`.
    pub fn alloc_array(&mut self, elements: Vec<JsValue>) -> ObjectHandle {
        let mut obj = OrdinaryObject::with_prototype(Some(self.array_prototype));
        obj.class_tag = Some(ARRAY_TAG.to_string());
        let len = elements.len();
        for (i, value) in elements.into_iter().enumerate() {
            obj.properties
                .insert(PropertyKey::index(i as u32), PropertyDescriptor::data(value));
        }
        obj.properties.insert(
            PropertyKey::from(LENGTH_KEY),
            PropertyDescriptor::hidden(JsValue::Int(len as i64)),
        );
        self.push(ManagedObject::Ordinary(obj))
    }

    /// Prototype shared by every built-in of class `tag`, created on first use.
    pub fn builtin_prototype(&mut self, tag: &str) -> ObjectHandle {
        if let Some(proto) = self.builtin_prototypes.get(tag) {
            return *proto;
        }
        let proto = self.alloc(Some(self.object_prototype));
        self.builtin_prototypes.insert(tag.to_string(), proto);
        proto
    }

    /// Allocate an opaque built-in instance (`new Date()`, `new Map()`, ...).
    pub fn alloc_builtin(&mut self, tag: &str) -> ObjectHandle {
        let proto = self.builtin_prototype(tag);
        let mut obj = OrdinaryObject::with_prototype(Some(proto));
        obj.class_tag = Some(tag.to_string());
        self.push(ManagedObject::Ordinary(obj))
    }

    pub(crate) fn alloc_wrapper(&mut self, state: WrapperState) -> ObjectHandle {
        self.push(ManagedObject::Wrapper(state))
    }

    /// Install a fully built ordinary object.
    pub fn insert_ordinary(&mut self, obj: OrdinaryObject) -> ObjectHandle {
        self.push(ManagedObject::Ordinary(obj))
    }

    /// Allocate a new unique symbol id.
    pub fn alloc_symbol(&mut self) -> SymbolId {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        id
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<&ManagedObject, ObjectError> {
        self.objects
            .get(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut ManagedObject, ObjectError> {
        self.objects
            .get_mut(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    /// Number of heap slots (objects and wrappers).
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // -- Wrapper resolution --------------------------------------------------

    /// Wrapper state stored at `handle`, if that slot is a wrapper.
    pub fn wrapper_state(&self, handle: ObjectHandle) -> Option<&WrapperState> {
        self.objects.get(handle.0 as usize)?.as_wrapper()
    }

    pub(crate) fn wrapper_state_mut(&mut self, handle: ObjectHandle) -> Option<&mut WrapperState> {
        self.objects.get_mut(handle.0 as usize)?.as_wrapper_mut()
    }

    /// Source node behind `handle` (the handle itself when not a wrapper).
    pub fn source_of(&self, handle: ObjectHandle) -> ObjectHandle {
        self.wrapper_state(handle).map_or(handle, |w| w.source)
    }

    /// Object that operations on `handle` act upon: a wrapper's target
    /// (the source, or its writable copy), else the handle itself.
    pub fn resolve(&self, handle: ObjectHandle) -> Result<ObjectHandle, ObjectError> {
        match self.get(handle)? {
            ManagedObject::Wrapper(w) => Ok(w.target),
            ManagedObject::Ordinary(_) => Ok(handle),
        }
    }

    /// Ordinary object behind `handle`, seeing through wrappers.
    pub fn ordinary(&self, handle: ObjectHandle) -> Result<&OrdinaryObject, ObjectError> {
        let target = self.resolve(handle)?;
        self.get(target)?
            .as_ordinary()
            .ok_or_else(|| ObjectError::TypeError(format!("{target} is not an ordinary object")))
    }

    pub fn ordinary_mut(&mut self, handle: ObjectHandle) -> Result<&mut OrdinaryObject, ObjectError> {
        let target = self.resolve(handle)?;
        self.get_mut(target)?
            .as_ordinary_mut()
            .ok_or_else(|| ObjectError::TypeError(format!("{target} is not an ordinary object")))
    }

    // -- Prototype chain lookup ----------------------------------------------

    /// Find `key` on `start` or its prototype chain.
    fn lookup(
        &self,
        start: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<Option<&PropertyDescriptor>, ObjectError> {
        let mut current = Some(start);
        let mut depth: u32 = 0;
        let mut visited = BTreeSet::new();

        while let Some(h) = current {
            if depth > MAX_PROTOTYPE_CHAIN_DEPTH {
                return Err(ObjectError::PrototypeChainTooDeep {
                    depth,
                    max: MAX_PROTOTYPE_CHAIN_DEPTH,
                });
            }
            let h = self.resolve(h)?;
            if !visited.insert(h) {
                return Err(ObjectError::PrototypeCycleDetected);
            }
            let obj = self.ordinary(h)?;
            if let Some(desc) = obj.get_own_property(key) {
                return Ok(Some(desc));
            }
            current = obj.prototype;
            depth += 1;
        }
        Ok(None)
    }

    // -- Raw (untracked) operations --------------------------------------------

    /// `[[Get]](O, P)`: walks the prototype chain and runs native getters
    /// with the original receiver.
    pub fn get_property(&self, handle: ObjectHandle, key: &PropertyKey) -> Result<JsValue, ObjectError> {
        let receiver = self.resolve(handle)?;
        match self.lookup(receiver, key)? {
            Some(PropertyDescriptor::Data { value, .. }) => Ok(value.clone()),
            Some(PropertyDescriptor::Accessor { get: Some(getter), .. }) => getter(self, receiver),
            Some(PropertyDescriptor::Accessor { get: None, .. }) | None => Ok(JsValue::Undefined),
        }
    }

    /// `[[Set]](O, P, V)`.  Returns `Ok(false)` when the assignment is
    /// rejected (non-writable, setterless accessor, non-extensible).
    pub fn set_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        value: JsValue,
    ) -> Result<bool, ObjectError> {
        enum Plan {
            Setter(Setter),
            Reject,
            Own,
        }

        let receiver = self.resolve(handle)?;
        let plan = match self.lookup(receiver, &key)? {
            Some(PropertyDescriptor::Accessor { set: Some(setter), .. }) => Plan::Setter(*setter),
            Some(PropertyDescriptor::Accessor { set: None, .. })
            | Some(PropertyDescriptor::Data { writable: false, .. }) => Plan::Reject,
            _ => Plan::Own,
        };
        match plan {
            Plan::Setter(setter) => {
                setter(self, receiver, value)?;
                Ok(true)
            }
            Plan::Reject => Ok(false),
            Plan::Own => {
                let obj = self.ordinary_mut(receiver)?;
                let is_length = obj.is_array() && key == PropertyKey::from(LENGTH_KEY);
                let new_length = if is_length {
                    Some(to_array_length(&value).ok_or_else(|| invalid_array_length(&value))?)
                } else {
                    None
                };
                if let Some(PropertyDescriptor::Data { value: slot, .. }) = obj.properties.get_mut(&key) {
                    *slot = value;
                } else if obj.extensible {
                    obj.properties
                        .insert(key.clone(), PropertyDescriptor::data(value));
                } else {
                    return Ok(false);
                }
                if let Some(len) = new_length {
                    obj.truncate_elements(len);
                } else if obj.is_array()
                    && let Some(index) = key.array_index()
                    && index >= obj.array_length()
                    && let Some(PropertyDescriptor::Data { value: len, .. }) =
                        obj.properties.get_mut(&PropertyKey::from(LENGTH_KEY))
                {
                    *len = JsValue::Int(i64::from(index) + 1);
                }
                Ok(true)
            }
        }
    }

    /// `[[HasProperty]](O, P)`: walks the prototype chain.
    pub fn has_property(&self, handle: ObjectHandle, key: &PropertyKey) -> Result<bool, ObjectError> {
        let start = self.resolve(handle)?;
        Ok(self.lookup(start, key)?.is_some())
    }

    /// `Object.hasOwn(O, P)`.
    pub fn has_own(&self, handle: ObjectHandle, key: &PropertyKey) -> Result<bool, ObjectError> {
        Ok(self.ordinary(handle)?.has_own_property(key))
    }

    /// `Object.getOwnPropertyDescriptor(O, P)`.
    pub fn get_own_property_descriptor(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<Option<PropertyDescriptor>, ObjectError> {
        Ok(self.ordinary(handle)?.get_own_property(key).cloned())
    }

    /// `Reflect.ownKeys(O)`.
    pub fn own_keys(&self, handle: ObjectHandle) -> Result<Vec<PropertyKey>, ObjectError> {
        Ok(self.ordinary(handle)?.own_property_keys())
    }

    /// `Object.keys(O)`: enumerable own string keys.
    pub fn keys(&self, handle: ObjectHandle) -> Result<Vec<String>, ObjectError> {
        let obj = self.ordinary(handle)?;
        Ok(obj
            .own_property_keys()
            .into_iter()
            .filter(|k| obj.properties.get(k).is_some_and(PropertyDescriptor::is_enumerable))
            .filter_map(|k| match k {
                PropertyKey::String(s) => Some(s),
                PropertyKey::Symbol(_) => None,
            })
            .collect())
    }

    /// `[[Delete]](O, P)`.
    pub fn delete_property(&mut self, handle: ObjectHandle, key: &PropertyKey) -> Result<bool, ObjectError> {
        Ok(self.ordinary_mut(handle)?.delete(key))
    }

    /// `Object.defineProperty(O, P, Desc)`.
    pub fn define_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        self.ordinary_mut(handle)?.define_own_property(key, desc)
    }

    /// `Object.getPrototypeOf(O)`.
    pub fn get_prototype_of(&self, handle: ObjectHandle) -> Result<Option<ObjectHandle>, ObjectError> {
        Ok(self.ordinary(handle)?.prototype)
    }

    pub fn is_array(&self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        Ok(self.ordinary(handle)?.is_array())
    }

    pub fn is_extensible(&self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        Ok(self.ordinary(handle)?.extensible)
    }

    pub fn prevent_extensions(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        self.ordinary_mut(handle)?.prevent_extensions();
        Ok(())
    }

    /// `Object.freeze(O)`.
    pub fn freeze(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        self.ordinary_mut(handle)?.freeze();
        Ok(())
    }

    /// `Object.seal(O)`.
    pub fn seal(&mut self, handle: ObjectHandle) -> Result<(), ObjectError> {
        self.ordinary_mut(handle)?.seal();
        Ok(())
    }

    /// `Object.isFrozen(O)`.
    pub fn is_frozen(&self, handle: ObjectHandle) -> Result<bool, ObjectError> {
        Ok(self.ordinary(handle)?.is_frozen())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
