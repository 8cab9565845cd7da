//! C10: the JSON wire adapter (§4.10/§6).
//!
//! A patch projects to `{ "strict": bool, "condition": <string?>, "ops": [...] }`,
//! where each op mirrors RFC 6902's shape plus the non-standard `ts` (HLC
//! timestamp) member this library needs. A second projection, [`to_rfc6902`],
//! drops that extension and renders a standards-compliant array a generic
//! JSON Patch implementation can consume, folding any top-level condition
//! into a synthetic `test` op via the non-standard `if` member a conforming
//! processor is required to ignore rather than reject.
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::patch::Patch;
use crate::path::Path;

use super::model::{decoded_from, envelope_for, kind_name, DecodedPatch, Envelope};
use super::value::to_wire;
use crate::operation::Operation;

pub fn encode(patch: &Patch, base: &Path) -> Json {
    serde_json::to_value(envelope_for(patch, base)).expect("Envelope always serializes")
}

pub fn encode_to_string(patch: &Patch, base: &Path) -> Result<String> {
    serde_json::to_string(&encode(patch, base)).map_err(|e| Error::Encoding(e.to_string()))
}

pub fn decode(json: &Json) -> Result<DecodedPatch> {
    let envelope: Envelope =
        serde_json::from_value(json.clone()).map_err(|e| Error::Encoding(e.to_string()))?;
    decoded_from(envelope)
}

pub fn decode_from_str(s: &str) -> Result<DecodedPatch> {
    let json: Json = serde_json::from_str(s).map_err(|e| Error::Encoding(e.to_string()))?;
    decode(&json)
}

pub fn to_rfc6902(patch: &Patch, base: &Path) -> Json {
    let mut ops: Vec<Json> = Vec::new();
    if let Some(condition) = patch.meta().and_then(|m| m.condition.as_ref()) {
        ops.push(serde_json::json!({
            "op": "test",
            "path": base.to_string(),
            "if": condition.to_string(),
        }));
    }
    for op in patch.walk(base) {
        ops.push(rfc6902_op(&op));
    }
    Json::Array(ops)
}

fn rfc6902_op(op: &Operation) -> Json {
    let mut obj = serde_json::Map::new();
    obj.insert("op".to_string(), Json::String(kind_name(&op.kind).to_string()));
    obj.insert("path".to_string(), Json::String(op.path.to_string()));
    if let Some(value) = &op.value {
        obj.insert(
            "value".to_string(),
            serde_json::to_value(to_wire(value.as_ref())).expect("WireValue always serializes"),
        );
    }
    if let Some(from) = &op.from {
        obj.insert("from".to_string(), Json::String(from.to_string()));
    }
    Json::Object(obj)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::condition::Condition;
    use crate::operation::OperationKind;
    use crate::patch::Meta;

    #[test]
    fn encodes_a_value_replace_as_a_single_op() {
        let patch = Patch::Value {
            old: Box::new(1i64),
            new: Box::new(2i64),
            meta: Meta::default(),
        };
        let json = encode(&patch, &Path::root());
        assert_eq!(json["ops"].as_array().unwrap().len(), 1);
        assert_eq!(json["ops"][0]["op"], "replace");
    }

    #[test]
    fn decodes_back_into_an_equivalent_operation_list() {
        let patch = Patch::Value {
            old: Box::new(1i64),
            new: Box::new(2i64),
            meta: Meta::default(),
        };
        let json = encode(&patch, &Path::root());
        let decoded = decode(&json).unwrap();
        assert_eq!(decoded.ops.len(), 1);
        assert!(matches!(decoded.ops[0].kind, OperationKind::Replace));
    }

    // Inline rather than file-backed snapshots: there's no fixture directory
    // convention for this crate yet, and an inline literal can't drift out
    // of sync with a `.snap` file nobody remembered to regenerate.
    #[test]
    fn envelope_snapshot_for_a_value_replace() {
        let patch = Patch::Value {
            old: Box::new(1i64),
            new: Box::new(2i64),
            meta: Meta::default(),
        };
        let json = encode_to_string(&patch, &Path::root()).unwrap();
        insta::assert_snapshot!(json, @r#"{"ops":[{"op":"replace","path":"","value":{"Int":2}}]}"#);
    }

    #[test]
    fn envelope_snapshot_for_a_conditioned_strict_move() {
        let patch = Patch::Move {
            from: Path::parse("/a").unwrap(),
            old: Box::new(1i64),
            meta: Meta::default(),
        }
        .with_condition(Condition::Exists(Path::parse("/ready").unwrap()))
        .with_strict(true);
        let json = encode_to_string(&patch, &Path::parse("/b").unwrap()).unwrap();
        insta::assert_snapshot!(json, @r#"{"strict":true,"condition":"/ready","ops":[{"op":"move","path":"/b","from":"/a"}]}"#);
    }

    #[test]
    fn rfc6902_projection_prepends_a_synthetic_test_for_a_global_condition() {
        let patch = Patch::Value {
            old: Box::new(1i64),
            new: Box::new(2i64),
            meta: Meta::default(),
        }
        .with_condition(Condition::Exists(Path::parse("/ready").unwrap()));
        let ops = to_rfc6902(&patch, &Path::root());
        let arr = ops.as_array().unwrap();
        assert_eq!(arr[0]["op"], "test");
        assert_eq!(arr[1]["op"], "replace");
    }
}
