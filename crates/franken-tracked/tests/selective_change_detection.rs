//! Integration tests for read tracking followed by `is_changed`.
//!
//! Focus areas:
//! - Shallow and deep value reads
//! - Shared wrappers across sessions (reference equality)
//! - Array `length` and element iteration
//! - Key enumeration, existence and own-property checks with path markers
//! - Cyclic graphs with and without a memo
//! - Opaque built-ins compared by reference
//! - Compare mode flags

use frankenengine_tracked::{
    ChangeMemo, CompareMode, JsValue, ObjectError, PathSegment, PropertyKey, Realm, RegistryId,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key(s: &str) -> PropertyKey {
    PropertyKey::String(s.to_string())
}

fn str_val(s: &str) -> JsValue {
    JsValue::Str(s.to_string())
}

fn obj(realm: &mut Realm, entries: &[(&str, JsValue)]) -> JsValue {
    JsValue::Object(realm.heap_mut().object_from_entries(entries.iter().cloned()))
}

fn arr(realm: &mut Realm, items: &[i64]) -> JsValue {
    JsValue::Object(
        realm
            .heap_mut()
            .alloc_array(items.iter().map(|n| JsValue::Int(*n)).collect()),
    )
}

fn changed(realm: &Realm, prev: &JsValue, next: &JsValue, registry: RegistryId) -> bool {
    realm
        .is_changed(prev, next, registry, None, CompareMode::empty())
        .expect("comparison succeeds")
}

fn paths(realm: &Realm, root: &JsValue, registry: RegistryId) -> Vec<Vec<String>> {
    realm
        .path_list(root, registry, false)
        .expect("path list")
        .into_iter()
        .map(|path| path.iter().map(PathSegment::to_string).collect())
        .collect()
}

fn raw_get(realm: &Realm, object: &JsValue, k: &str) -> JsValue {
    realm
        .heap()
        .get_property(object.as_object().expect("object"), &key(k))
        .expect("raw get")
}

// ===========================================================================
// 1. Shallow objects
// ===========================================================================

#[test]
fn no_property_access_compares_by_reference() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = obj(&mut realm, &[("a", str_val("a")), ("b", str_val("b"))]);
    realm.wrap(&s1, a1, None).unwrap();

    let same_shape = obj(&mut realm, &[("a", str_val("a")), ("b", str_val("b"))]);
    let new_a = obj(&mut realm, &[("a", str_val("a2")), ("b", str_val("b"))]);
    assert!(changed(&realm, &s1, &same_shape, a1));
    assert!(changed(&realm, &s1, &new_a, a1));
    assert!(!changed(&realm, &s1, &s1, a1));
}

#[test]
fn one_property_access_ignores_other_keys() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = obj(&mut realm, &[("a", str_val("a")), ("b", str_val("b"))]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    realm.get(&p1, &key("a")).unwrap();

    let same = obj(&mut realm, &[("a", str_val("a")), ("b", str_val("b"))]);
    let new_a = obj(&mut realm, &[("a", str_val("a2")), ("b", str_val("b"))]);
    let new_b = obj(&mut realm, &[("a", str_val("a")), ("b", str_val("b2"))]);
    assert!(!changed(&realm, &s1, &same, a1));
    assert!(changed(&realm, &s1, &new_a, a1));
    assert!(!changed(&realm, &s1, &new_b, a1));
}

// ===========================================================================
// 2. Deep objects
// ===========================================================================

#[test]
fn intermediate_access_treats_child_as_a_unit() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let inner = obj(&mut realm, &[("b", str_val("b")), ("c", str_val("c"))]);
    let s1 = obj(&mut realm, &[("a", inner.clone())]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    realm.get(&p1, &key("a")).unwrap();

    let same_ref = obj(&mut realm, &[("a", inner)]);
    let b2 = obj(&mut realm, &[("b", str_val("b2")), ("c", str_val("c"))]);
    let new_b = obj(&mut realm, &[("a", b2)]);
    let c2 = obj(&mut realm, &[("b", str_val("b")), ("c", str_val("c2"))]);
    let new_c = obj(&mut realm, &[("a", c2)]);
    assert!(!changed(&realm, &s1, &same_ref, a1));
    assert!(changed(&realm, &s1, &new_b, a1));
    assert!(changed(&realm, &s1, &new_c, a1));
}

#[test]
fn leaf_access_is_selective() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let inner = obj(&mut realm, &[("b", str_val("b")), ("c", str_val("c"))]);
    let s1 = obj(&mut realm, &[("a", inner.clone())]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    let pa = realm.get(&p1, &key("a")).unwrap();
    realm.get(&pa, &key("b")).unwrap();

    let same_ref = obj(&mut realm, &[("a", inner)]);
    let b2 = obj(&mut realm, &[("b", str_val("b2")), ("c", str_val("c"))]);
    let new_b = obj(&mut realm, &[("a", b2)]);
    let c2 = obj(&mut realm, &[("b", str_val("b")), ("c", str_val("c2"))]);
    let new_c = obj(&mut realm, &[("a", c2)]);
    assert!(!changed(&realm, &s1, &same_ref, a1));
    assert!(changed(&realm, &s1, &new_b, a1));
    assert!(!changed(&realm, &s1, &new_c, a1));
    assert_eq!(paths(&realm, &s1, a1), vec![vec!["a", "b"]]);
}

// ===========================================================================
// 3. Reference equality through a shared wrapper cache
// ===========================================================================

#[test]
fn shared_cache_yields_one_wrapper_for_two_sessions() {
    let mut realm = Realm::new();
    let cache = realm.create_wrapper_cache();
    let s1 = obj(&mut realm, &[("a", str_val("a")), ("b", str_val("b"))]);
    let a1 = realm.create_registry();
    let p1 = realm.wrap(&s1, a1, Some(cache)).unwrap();
    realm.get(&p1, &key("a")).unwrap();
    let a2 = realm.create_registry();
    let p2 = realm.wrap(&s1, a2, Some(cache)).unwrap();
    realm.get(&p2, &key("b")).unwrap();
    assert_eq!(p1, p2);

    let same = obj(&mut realm, &[("a", str_val("a")), ("b", str_val("b"))]);
    let new_a = obj(&mut realm, &[("a", str_val("a2")), ("b", str_val("b"))]);
    let new_b = obj(&mut realm, &[("a", str_val("a")), ("b", str_val("b2"))]);
    assert!(!changed(&realm, &s1, &same, a1));
    assert!(changed(&realm, &s1, &new_a, a1));
    assert!(!changed(&realm, &s1, &new_b, a1));
    assert!(!changed(&realm, &s1, &same, a2));
    assert!(!changed(&realm, &s1, &new_a, a2));
    assert!(changed(&realm, &s1, &new_b, a2));
}

#[test]
fn shared_child_wrapper_is_reused_across_parents() {
    let mut realm = Realm::new();
    let cache = realm.create_wrapper_cache();
    let inner = obj(&mut realm, &[("b", str_val("b")), ("c", str_val("c"))]);
    let s1 = obj(&mut realm, &[("a", inner.clone())]);
    let s2 = obj(&mut realm, &[("a", inner)]);

    let a1 = realm.create_registry();
    let p1 = realm.wrap(&s1, a1, Some(cache)).unwrap();
    let p1a = realm.get(&p1, &key("a")).unwrap();
    realm.get(&p1a, &key("b")).unwrap();

    let a2 = realm.create_registry();
    let p2 = realm.wrap(&s2, a2, Some(cache)).unwrap();
    let p2a = realm.get(&p2, &key("a")).unwrap();
    realm.get(&p2a, &key("c")).unwrap();

    assert_ne!(p1, p2);
    assert_eq!(p1a, p2a);

    let plain = obj(&mut realm, &[("b", str_val("b")), ("c", str_val("c"))]);
    let same = obj(&mut realm, &[("a", plain)]);
    let b2 = obj(&mut realm, &[("b", str_val("b2")), ("c", str_val("c"))]);
    let new_b = obj(&mut realm, &[("a", b2)]);
    let c2 = obj(&mut realm, &[("b", str_val("b")), ("c", str_val("c2"))]);
    let new_c = obj(&mut realm, &[("a", c2)]);
    assert!(!changed(&realm, &s1, &same, a1));
    assert!(changed(&realm, &s1, &new_b, a1));
    assert!(!changed(&realm, &s1, &new_c, a1));
    assert!(!changed(&realm, &s2, &same, a2));
    assert!(!changed(&realm, &s2, &new_b, a2));
    assert!(changed(&realm, &s2, &new_c, a2));
}

// ===========================================================================
// 4. Arrays
// ===========================================================================

#[test]
fn array_length_read_tracks_only_length() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = arr(&mut realm, &[1, 2, 3]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    assert_eq!(realm.get(&p1, &key("length")).unwrap(), JsValue::Int(3));

    let same = arr(&mut realm, &[1, 2, 3]);
    let longer = arr(&mut realm, &[1, 2, 3, 4]);
    let shorter = arr(&mut realm, &[1, 2]);
    let other_last = arr(&mut realm, &[1, 2, 4]);
    assert!(!changed(&realm, &s1, &same, a1));
    assert!(changed(&realm, &s1, &longer, a1));
    assert!(changed(&realm, &s1, &shorter, a1));
    assert!(!changed(&realm, &s1, &other_last, a1));
}

#[test]
fn array_iteration_tracks_every_element() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = arr(&mut realm, &[1, 2, 3]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    let items = realm.values(&p1).unwrap();
    assert_eq!(items, vec![JsValue::Int(1), JsValue::Int(2), JsValue::Int(3)]);

    let same = arr(&mut realm, &[1, 2, 3]);
    let longer = arr(&mut realm, &[1, 2, 3, 4]);
    let shorter = arr(&mut realm, &[1, 2]);
    let other_last = arr(&mut realm, &[1, 2, 4]);
    assert!(!changed(&realm, &s1, &same, a1));
    assert!(changed(&realm, &s1, &longer, a1));
    assert!(changed(&realm, &s1, &shorter, a1));
    assert!(changed(&realm, &s1, &other_last, a1));
}

#[test]
fn array_elements_are_wrapped_children() {
    let mut realm = Realm::new();
    let cache = realm.create_wrapper_cache();
    let a1 = realm.create_registry();
    let first = obj(&mut realm, &[("id", JsValue::Int(1)), ("name", str_val("x"))]);
    let list = JsValue::Object(realm.heap_mut().alloc_array(vec![first.clone()]));
    let view = realm.wrap(&list, a1, Some(cache)).unwrap();
    let element = realm.get(&view, &PropertyKey::index(0)).unwrap();
    assert_eq!(realm.untracked(&element), first.as_object());
    realm.get(&element, &key("id")).unwrap();

    let renamed = obj(&mut realm, &[("id", JsValue::Int(1)), ("name", str_val("y"))]);
    let next = JsValue::Object(realm.heap_mut().alloc_array(vec![renamed]));
    assert!(!changed(&realm, &list, &next, a1));
    assert_eq!(paths(&realm, &list, a1), vec![vec!["0", "id"]]);
}

// ===========================================================================
// 5. Keys, `in`, and own-property checks
// ===========================================================================

#[test]
fn object_keys_tracks_the_key_list() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let inner = obj(&mut realm, &[("b", str_val("b"))]);
    let s1 = obj(&mut realm, &[("a", inner.clone()), ("c", str_val("c"))]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    assert_eq!(realm.keys(&p1).unwrap(), vec!["a".to_string(), "c".to_string()]);

    let same_keys = obj(&mut realm, &[("a", inner.clone()), ("c", str_val("c"))]);
    let fresh_inner = obj(&mut realm, &[("b", str_val("b"))]);
    let same_keys_new_child = obj(&mut realm, &[("a", fresh_inner), ("c", str_val("c"))]);
    let fewer = obj(&mut realm, &[("a", inner.clone())]);
    let more = obj(
        &mut realm,
        &[("a", inner), ("c", str_val("c")), ("d", str_val("d"))],
    );
    assert!(!changed(&realm, &s1, &same_keys, a1));
    assert!(!changed(&realm, &s1, &same_keys_new_child, a1));
    assert!(changed(&realm, &s1, &fewer, a1));
    assert!(changed(&realm, &s1, &more, a1));
    assert_eq!(paths(&realm, &s1, a1), vec![vec![":ownKeys"]]);
}

#[test]
fn own_keys_order_is_significant() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = obj(&mut realm, &[("a", JsValue::Int(1)), ("b", JsValue::Int(2))]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    assert_eq!(realm.own_keys(&p1).unwrap(), vec![key("a"), key("b")]);

    let reordered = obj(&mut realm, &[("b", JsValue::Int(2)), ("a", JsValue::Int(1))]);
    let new_values = obj(&mut realm, &[("a", JsValue::Int(5)), ("b", JsValue::Int(6))]);
    assert!(changed(&realm, &s1, &reordered, a1));
    assert!(!changed(&realm, &s1, &new_values, a1));
}

#[test]
fn single_in_check_tracks_presence_only() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let inner = obj(&mut realm, &[("b", str_val("b"))]);
    let s1 = obj(&mut realm, &[("a", inner.clone()), ("c", str_val("c"))]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    assert!(realm.has(&p1, &key("a")).unwrap());

    let same = obj(&mut realm, &[("a", inner.clone()), ("c", str_val("c"))]);
    let only_a = obj(&mut realm, &[("a", inner)]);
    let null_a = obj(&mut realm, &[("a", JsValue::Null)]);
    let without_a = obj(&mut realm, &[("c", str_val("c")), ("d", str_val("d"))]);
    assert!(!changed(&realm, &s1, &same, a1));
    assert!(!changed(&realm, &s1, &only_a, a1));
    assert!(!changed(&realm, &s1, &null_a, a1));
    assert!(changed(&realm, &s1, &without_a, a1));
    assert_eq!(paths(&realm, &s1, a1), vec![vec![":has(a)"]]);
}

#[test]
fn has_own_check_tracks_own_presence_only() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let inner = obj(&mut realm, &[("b", str_val("b"))]);
    let s1 = obj(&mut realm, &[("a", inner.clone()), ("c", str_val("c"))]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    assert!(realm.has_own(&p1, &key("a")).unwrap());

    let same = obj(&mut realm, &[("a", inner.clone()), ("c", str_val("c"))]);
    let only_a = obj(&mut realm, &[("a", inner)]);
    let null_a = obj(&mut realm, &[("a", JsValue::Null), ("c", str_val("c"))]);
    let without_a = obj(&mut realm, &[("c", str_val("c")), ("d", str_val("d"))]);
    assert!(!changed(&realm, &s1, &same, a1));
    assert!(!changed(&realm, &s1, &only_a, a1));
    assert!(!changed(&realm, &s1, &null_a, a1));
    assert!(changed(&realm, &s1, &without_a, a1));
    assert_eq!(paths(&realm, &s1, a1), vec![vec![":hasOwn(a)"]]);
}

#[test]
fn descriptor_lookup_counts_as_own_check() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = obj(&mut realm, &[("a", JsValue::Int(1))]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    let desc = realm
        .get_own_property_descriptor(&p1, &key("a"))
        .unwrap()
        .expect("own property");
    assert_eq!(desc.value(), Some(&JsValue::Int(1)));
    assert_eq!(paths(&realm, &s1, a1), vec![vec![":hasOwn(a)"]]);
}

#[test]
fn inherited_key_passes_in_but_not_has_own() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let proto = realm.heap_mut().object_from_entries([("shared", JsValue::Int(1))]);
    let child = realm.heap_mut().alloc(Some(proto));
    let s1 = JsValue::Object(child);
    realm.mark_trackable(&s1, true);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    assert!(realm.has(&p1, &key("shared")).unwrap());
    assert!(!realm.has_own(&p1, &key("shared")).unwrap());
    assert_eq!(
        realm.path_list(&s1, a1, false).unwrap(),
        vec![
            vec![PathSegment::Has(key("shared"))],
            vec![PathSegment::HasOwn(key("shared"))],
        ]
    );
}

// ===========================================================================
// 6. Cycles
// ===========================================================================

fn self_referencing(realm: &mut Realm, a: JsValue) -> JsValue {
    let node = realm.heap_mut().object_from_entries([("a", a)]);
    realm
        .heap_mut()
        .set_property(node, key("self"), JsValue::Object(node))
        .unwrap();
    JsValue::Object(node)
}

#[test]
fn cycle_with_memo_reaches_a_verdict() {
    let mut realm = Realm::new();
    let cache = realm.create_wrapper_cache();
    let a1 = realm.create_registry();
    let s1 = self_referencing(&mut realm, str_val("a"));
    let p1 = realm.wrap(&s1, a1, Some(cache)).unwrap();
    let p_self = realm.get(&p1, &key("self")).unwrap();
    assert_eq!(p_self, p1);
    realm.get(&p_self, &key("a")).unwrap();

    let mut memo = ChangeMemo::new();
    let mut check = |realm: &Realm, next: &JsValue| {
        realm
            .is_changed(&s1, next, a1, Some(&mut memo), CompareMode::empty())
            .unwrap()
    };
    assert!(!check(&realm, &s1));
    let pointing_back = obj(&mut realm, &[("a", str_val("a")), ("self", s1.clone())]);
    assert!(!check(&realm, &pointing_back));
    let s2 = self_referencing(&mut realm, str_val("a"));
    assert!(!check(&realm, &s2));
    let s3 = self_referencing(&mut realm, str_val("a2"));
    assert!(check(&realm, &s3));
    assert_eq!(paths(&realm, &s1, a1), vec![vec!["a"]]);
}

#[test]
fn cycle_with_untracked_child_detects_new_child() {
    let mut realm = Realm::new();
    let cache = realm.create_wrapper_cache();
    let a1 = realm.create_registry();
    let inner = obj(&mut realm, &[("b", str_val("b"))]);
    let s1 = self_referencing(&mut realm, inner.clone());
    let p1 = realm.wrap(&s1, a1, Some(cache)).unwrap();
    let p_self = realm.get(&p1, &key("self")).unwrap();
    realm.get(&p_self, &key("a")).unwrap();

    let mut memo = ChangeMemo::new();
    assert!(!realm
        .is_changed(&s1, &s1, a1, Some(&mut memo), CompareMode::empty())
        .unwrap());
    let fresh_inner = obj(&mut realm, &[("b", str_val("b"))]);
    let s2 = self_referencing(&mut realm, fresh_inner);
    assert!(realm
        .is_changed(&s1, &s2, a1, Some(&mut memo), CompareMode::empty())
        .unwrap());
    assert_eq!(paths(&realm, &s1, a1), vec![vec!["a"]]);
}

#[test]
fn cycle_without_memo_fails_cleanly() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = self_referencing(&mut realm, str_val("a"));
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    let p_self = realm.get(&p1, &key("self")).unwrap();
    realm.get(&p_self, &key("a")).unwrap();
    let s2 = self_referencing(&mut realm, str_val("a"));

    let err = realm
        .is_changed(&s1, &s2, a1, None, CompareMode::empty())
        .unwrap_err();
    assert_eq!(
        err,
        ObjectError::CompareDepthExceeded {
            max: realm.config().max_compare_depth
        }
    );
}

#[test]
fn cycle_with_memo_detects_change() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = self_referencing(&mut realm, str_val("a"));
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    let p_self = realm.get(&p1, &key("self")).unwrap();
    realm.get(&p_self, &key("a")).unwrap();
    let s2 = self_referencing(&mut realm, str_val("aa"));

    let mut memo = ChangeMemo::new();
    assert!(realm
        .is_changed(&s1, &s2, a1, Some(&mut memo), CompareMode::empty())
        .unwrap());
    assert_eq!(memo.get(s1.as_object().unwrap()).map(|e| e.changed), Some(true));
}

// ===========================================================================
// 7. Opaque built-ins
// ===========================================================================

#[test]
fn builtins_are_compared_by_reference() {
    for tag in ["Boolean", "Error", "Date", "RegExp", "Map", "Int8Array"] {
        let mut realm = Realm::new();
        let cache = realm.create_wrapper_cache();
        let a1 = realm.create_registry();
        let builtin = JsValue::Object(realm.heap_mut().alloc_builtin(tag));
        let s1 = obj(&mut realm, &[("a", builtin.clone())]);
        let p1 = realm.wrap(&s1, a1, Some(cache)).unwrap();
        let pa = realm.get(&p1, &key("a")).unwrap();
        assert_eq!(pa, builtin, "{tag} must not be wrapped");
        realm.get(&pa, &key("message")).unwrap();

        let other = JsValue::Object(realm.heap_mut().alloc_builtin(tag));
        let next = obj(&mut realm, &[("a", other)]);
        assert!(!changed(&realm, &s1, &s1, a1), "{tag}");
        assert!(changed(&realm, &s1, &next, a1), "{tag}");
    }
}

// ===========================================================================
// 8. Compare modes
// ===========================================================================

#[test]
fn assume_unchanged_if_unaffected_applies_at_top_level_only() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let inner = obj(&mut realm, &[("b", JsValue::Int(1))]);
    let s1 = obj(&mut realm, &[("a", inner)]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    realm.get(&p1, &key("a")).unwrap();

    let untouched = obj(&mut realm, &[]);
    let other_untouched = obj(&mut realm, &[]);
    let shallow = CompareMode::ASSUME_UNCHANGED_IF_UNAFFECTED;
    assert!(!realm
        .is_changed(&untouched, &other_untouched, a1, None, shallow)
        .unwrap());

    let fresh = obj(&mut realm, &[("b", JsValue::Int(1))]);
    let next = obj(&mut realm, &[("a", fresh)]);
    // `a` itself was only read, never looked into: a new child is a change
    // unless the deep flag carries the policy down.
    assert!(realm.is_changed(&s1, &next, a1, None, shallow).unwrap());
    let deep = CompareMode::ASSUME_UNCHANGED_IF_UNAFFECTED_IN_DEEP;
    assert!(!realm.is_changed(&s1, &next, a1, None, deep).unwrap());
}

#[test]
fn ignore_ref_equality_inspects_identical_graphs() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = obj(&mut realm, &[("a", JsValue::Int(1))]);
    let p1 = realm.wrap(&s1, a1, None).unwrap();
    realm.get(&p1, &key("a")).unwrap();
    assert!(!realm
        .is_changed(&s1, &s1, a1, None, CompareMode::IGNORE_REF_EQUALITY)
        .unwrap());

    let untouched = obj(&mut realm, &[]);
    // No record and no reference short-cut: falls to the unaffected default.
    assert!(realm
        .is_changed(&untouched, &untouched, a1, None, CompareMode::IGNORE_REF_EQUALITY)
        .unwrap());
}

#[test]
fn deep_ignore_ref_equality_compares_read_leaves_by_value() {
    let mut realm = Realm::new();
    let cache = realm.create_wrapper_cache();
    let a1 = realm.create_registry();
    let inner = obj(&mut realm, &[("b", JsValue::Int(1))]);
    let s1 = obj(&mut realm, &[("a", inner.clone()), ("c", str_val("x"))]);
    let p1 = realm.wrap(&s1, a1, Some(cache)).unwrap();
    let pa = realm.get(&p1, &key("a")).unwrap();
    realm.get(&pa, &key("b")).unwrap();
    realm.get(&p1, &key("c")).unwrap();

    let mode = CompareMode::IGNORE_REF_EQUALITY | CompareMode::IGNORE_REF_EQUALITY_IN_DEEP;
    assert!(!realm.is_changed(&s1, &s1, a1, None, mode).unwrap());

    let same_inner = obj(&mut realm, &[("a", inner.clone()), ("c", str_val("x"))]);
    assert!(!realm.is_changed(&s1, &same_inner, a1, None, mode).unwrap());

    let new_c = obj(&mut realm, &[("a", inner), ("c", str_val("y"))]);
    assert!(realm.is_changed(&s1, &new_c, a1, None, mode).unwrap());
}

#[test]
fn stale_registry_is_rejected_by_comparison() {
    let mut realm = Realm::new();
    let a1 = realm.create_registry();
    let s1 = obj(&mut realm, &[]);
    realm.release_registry(a1).unwrap();
    assert_eq!(
        realm.is_changed(&s1, &s1, a1, None, CompareMode::empty()),
        Err(ObjectError::UnknownRegistry(a1))
    );
    assert!(realm.path_list(&s1, a1, false).is_err());
}

#[test]
fn raw_heap_reads_do_not_wrap() {
    let mut realm = Realm::new();
    let inner = obj(&mut realm, &[("b", JsValue::Int(1))]);
    let s1 = obj(&mut realm, &[("a", inner.clone())]);
    assert_eq!(raw_get(&realm, &s1, "a"), inner);
}
