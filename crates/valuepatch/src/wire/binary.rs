//! C10: the binary wire adapter (§4.10).
//!
//! Reuses the exact `Operation`/`Condition` serde model the JSON adapter
//! builds (`wire::model::Envelope`) rather than a second parallel schema,
//! handed to `bincode` instead of `serde_json` for a compact, self-describing
//! encoding keyed by the same `WireValue` tags the JSON side uses. This is
//! deliberately not the teacher's `rkyv` zero-copy archive format: values
//! here are plain owned Rust values assembled from heterogeneous concrete
//! types behind `dyn Patchable`, with no single contiguous buffer to archive
//! in place the way the teacher's combined documents have (see DESIGN.md).
use crate::error::{Error, Result};
use crate::patch::Patch;
use crate::path::Path;

use super::model::{decoded_from, envelope_for, DecodedPatch, Envelope};

pub fn encode(patch: &Patch, base: &Path) -> Result<Vec<u8>> {
    bincode::serialize(&envelope_for(patch, base)).map_err(|e| Error::Encoding(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<DecodedPatch> {
    let envelope: Envelope = bincode::deserialize(bytes).map_err(|e| Error::Encoding(e.to_string()))?;
    decoded_from(envelope)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patch::Meta;
    use std::collections::BTreeMap;

    #[test]
    fn round_trips_a_value_replace_through_binary() {
        let patch = Patch::Value {
            old: Box::new(1i64),
            new: Box::new(2i64),
            meta: Meta::default(),
        };
        let bytes = encode(&patch, &Path::root()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.ops.len(), 1);
    }

    #[test]
    fn round_trips_a_struct_patch_with_a_strict_flag() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "count".to_string(),
            Patch::Value {
                old: Box::new(1i64),
                new: Box::new(2i64),
                meta: Meta::default(),
            },
        );
        let patch = Patch::Struct {
            fields,
            meta: Meta::default(),
        }
        .with_strict(true);
        let bytes = encode(&patch, &Path::root()).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.strict);
        assert_eq!(decoded.ops.len(), 1);
        assert_eq!(decoded.ops[0].path.to_string(), "/count");
    }
}
