//! End-to-end wire adapter coverage: diff a real value, encode it both ways,
//! decode, and replay the decoded operations against a *generic* document —
//! the realistic shape of the receiving end of a wire payload, which has a
//! `WireValue` tree to mutate rather than the sender's concrete Rust type.
//! (Decoded operations carry `WireValue`-boxed payloads, not the sender's
//! concrete type, since there is no way to recover a compile-time type from
//! bytes alone; see DESIGN.md's C10 section.)
mod common;

use std::collections::BTreeMap;

use common::Pair;
use valuepatch::wire::{apply_operations, binary, json, to_wire};
use valuepatch::{diff, equal, Condition, Patchable, Path};

#[test]
fn json_envelope_round_trips_a_map_patch_and_replays_onto_a_generic_document() {
    let mut old: BTreeMap<String, i64> = BTreeMap::new();
    old.insert("a".to_string(), 1);
    let mut new: BTreeMap<String, i64> = BTreeMap::new();
    new.insert("a".to_string(), 2);
    new.insert("b".to_string(), 3);

    let patch = diff(&old, &new);
    let encoded = json::encode(&patch, &Path::root());
    let decoded = json::decode(&encoded).unwrap();
    assert!(!decoded.strict);
    assert!(decoded.condition.is_none());

    let mut target: Box<dyn Patchable> = Box::new(to_wire(&old));
    apply_operations(&mut target, decoded.ops).unwrap();
    assert!(equal(target.as_ref(), &new));
}

#[test]
fn binary_envelope_round_trips_a_struct_patch_with_strict_and_condition() {
    let old = Pair { a: 1, b: 2 };
    let new = Pair { a: 3, b: 2 };
    let patch = diff(&old, &new)
        .with_strict(true)
        .with_condition(Condition::Exists(Path::parse("/a").unwrap()));

    let bytes = binary::encode(&patch, &Path::root()).unwrap();
    let decoded = binary::decode(&bytes).unwrap();
    assert!(decoded.strict);
    assert!(decoded.condition.is_some());

    let mut target: Box<dyn Patchable> = Box::new(to_wire(&old));
    apply_operations(&mut target, decoded.ops).unwrap();
    assert!(equal(target.as_ref(), &new));
}

#[test]
fn to_wire_preserves_semantic_equality_with_the_source_value() {
    let old = Pair { a: 1, b: 2 };
    let wire = to_wire(&old);
    assert!(equal(&old, &wire));
}

#[test]
fn rfc6902_projection_round_trips_through_a_generic_json_patch_shape() {
    let old = vec![1i64, 2, 3];
    let new = vec![1i64, 2, 3, 4];
    let patch = diff(&old, &new);

    let ops_json = json::to_rfc6902(&patch, &Path::root());
    let arr = ops_json.as_array().unwrap();
    assert!(arr.iter().all(|op| op["op"] == "add" || op["op"] == "replace" || op["op"] == "remove"));
}
