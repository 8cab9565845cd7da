//! The operation-level wire shape shared by the JSON and binary encoders
//! (§4.10): both serialize a `Vec<WireOperation>` plus the patch's top-level
//! `strict`/`condition` guard, differing only in which `serde` data format
//! they hand that shape to.
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::hlc::Hlc;
use crate::operation::{Operation, OperationKind};
use crate::path::Path;

use super::value::{from_wire, to_wire, WireValue};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct WireOperation {
    pub op: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<WireValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ts: Option<Hlc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Envelope {
    #[serde(skip_serializing_if = "is_false", default)]
    pub strict: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub condition: Option<String>,
    pub ops: Vec<WireOperation>,
}

pub(super) fn is_false(b: &bool) -> bool {
    !*b
}

/// The result of decoding a wire envelope: a flat operation list plus the
/// top-level guard that applied to the whole batch. Reconstructing the
/// original typed [`crate::patch::Patch`] tree isn't attempted — the same
/// one-way-projection stance RFC 6902 itself takes, and the shape the
/// dependency resolver (C8) / a sequential applier already expect.
#[derive(Debug, Clone)]
pub struct DecodedPatch {
    pub strict: bool,
    pub condition: Option<Condition>,
    pub ops: Vec<Operation>,
}

pub(super) fn kind_name(kind: &OperationKind) -> &'static str {
    match kind {
        OperationKind::Add => "add",
        OperationKind::Remove => "remove",
        OperationKind::Replace => "replace",
        OperationKind::Move => "move",
        OperationKind::Copy => "copy",
        OperationKind::Log => "log",
        OperationKind::Test => "test",
    }
}

pub(super) fn parse_kind(name: &str) -> Result<OperationKind> {
    Ok(match name {
        "add" => OperationKind::Add,
        "remove" => OperationKind::Remove,
        "replace" => OperationKind::Replace,
        "move" => OperationKind::Move,
        "copy" => OperationKind::Copy,
        "log" => OperationKind::Log,
        "test" => OperationKind::Test,
        other => return Err(Error::Encoding(format!("unknown op kind {other:?}"))),
    })
}

pub(super) fn operation_to_wire(op: &Operation) -> WireOperation {
    WireOperation {
        op: kind_name(&op.kind).to_string(),
        path: op.path.to_string(),
        value: op.value.as_deref().map(to_wire),
        from: op.from.as_ref().map(|p| p.to_string()),
        message: op.message.clone(),
        ts: None,
    }
}

pub(super) fn wire_to_operation(w: WireOperation) -> Result<Operation> {
    let kind = parse_kind(&w.op)?;
    let path = Path::parse(&w.path)?;
    let from = w.from.map(|s| Path::parse(&s)).transpose()?;
    let value = w.value.map(from_wire);
    Ok(Operation {
        kind,
        path,
        value,
        from,
        message: w.message,
    })
}

pub(super) fn envelope_for(patch: &crate::patch::Patch, base: &Path) -> Envelope {
    let meta = patch.meta();
    Envelope {
        strict: meta.map(|m| m.strict).unwrap_or(false),
        condition: meta.and_then(|m| m.condition.as_ref()).map(|c| c.to_string()),
        ops: patch.walk(base).iter().map(operation_to_wire).collect(),
    }
}

pub(super) fn decoded_from(envelope: Envelope) -> Result<DecodedPatch> {
    let condition = envelope
        .condition
        .as_deref()
        .map(crate::condition::parse)
        .transpose()?;
    let ops = envelope
        .ops
        .into_iter()
        .map(wire_to_operation)
        .collect::<Result<Vec<_>>>()?;
    Ok(DecodedPatch {
        strict: envelope.strict,
        condition,
        ops,
    })
}
