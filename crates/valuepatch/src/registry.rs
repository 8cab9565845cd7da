//! C1: type descriptors, the tag parser's target representation, and the
//! process-wide sum-type registry.
//!
//! There is no `reflect`-style scan of a source declaration to drive this in
//! Rust; instead a type registers its own descriptor once (typically behind
//! a `std::sync::OnceLock` in its `Patchable::type_descriptor` impl). This
//! module only owns the descriptor *shape* and the validation invariants,
//! plus the concurrent registry of sum-type alternatives used by the
//! condition engine's `TypeIs` and by the binary wire adapter.
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::error::{Error, Result};
use crate::value::Patchable;

/// Per-field metadata, the Rust analogue of a parsed Go struct tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFlags {
    /// `-`: excluded from equality, diff, and apply entirely.
    pub ignore: bool,
    /// diff descends normally but the resulting child patch is wrapped so
    /// apply refuses to execute it.
    pub readonly: bool,
    /// diff never descends into this field; it is compared and patched as
    /// a single opaque value.
    pub atomic: bool,
    /// marks the field as the product type's stable identity, used to align
    /// slice elements. At most one field per type may set this.
    pub identity_key: bool,
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub wire_name: &'static str,
    pub flags: FieldFlags,
}

/// Cached, immutable per-type metadata. Exactly one `TypeDescriptor` should
/// ever exist per distinct Rust type; callers typically store it behind a
/// `OnceLock` and return a `&'static` reference from `Patchable::type_descriptor`.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub type_name: &'static str,
    pub fields: Vec<FieldDescriptor>,
    pub identity_key: Option<&'static str>,
}

impl TypeDescriptor {
    pub fn build(type_name: &'static str) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            type_name,
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_wire_name(&self, wire_name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.wire_name == wire_name)
    }
}

pub struct TypeDescriptorBuilder {
    type_name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl TypeDescriptorBuilder {
    pub fn field(self, name: &'static str, flags: FieldFlags) -> Self {
        self.field_with_wire_name(name, name, flags)
    }

    pub fn field_with_wire_name(
        mut self,
        name: &'static str,
        wire_name: &'static str,
        flags: FieldFlags,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            wire_name,
            flags,
        });
        self
    }

    /// Validates the invariants from §3: unique wire names, at most one
    /// identity-key field. Programmer error (not user-data error), so this
    /// panics — the same way a `reflect`-based implementation would panic
    /// on an inconsistent struct tag the first time the type is touched.
    pub fn build(self) -> TypeDescriptor {
        match self.try_build() {
            Ok(d) => d,
            Err(e) => panic!("invalid Patchable type descriptor: {e}"),
        }
    }

    pub fn try_build(self) -> Result<TypeDescriptor> {
        let mut seen_wire = std::collections::HashSet::new();
        let mut identity_key = None;
        for f in &self.fields {
            if !seen_wire.insert(f.wire_name) {
                return Err(Error::DuplicateWireName(
                    self.type_name,
                    f.name,
                    f.wire_name,
                ));
            }
            if f.flags.identity_key {
                if let Some(prior) = identity_key {
                    return Err(Error::DuplicateIdentityKey(self.type_name, prior, f.name));
                }
                identity_key = Some(f.name);
            }
        }
        Ok(TypeDescriptor {
            type_name: self.type_name,
            fields: self.fields,
            identity_key,
        })
    }
}

/// Codec hooks a sum-type alternative registers so the binary wire adapter
/// (C10) can encode/decode it without compile-time knowledge of every
/// alternative.
#[derive(Clone)]
pub struct SumTypeCodec {
    pub descriptor: &'static TypeDescriptor,
    pub decode: fn(&[u8]) -> Result<Box<dyn Patchable>>,
}

type RegistryMap = HashMap<&'static str, SumTypeCodec, fxhash::FxBuildHasher>;

static SUM_TYPES: OnceLock<RwLock<RegistryMap>> = OnceLock::new();

fn registry() -> &'static RwLock<RegistryMap> {
    SUM_TYPES.get_or_init(|| RwLock::new(RegistryMap::default()))
}

/// Register a sum-type alternative under a stable string id. Insertion is
/// monotonic: the registry only ever grows, so lookups never need to
/// synchronize with a writer mid-traversal beyond the lock itself.
pub fn register_sum_type(id: &'static str, codec: SumTypeCodec) {
    registry().write().expect("sum type registry poisoned").insert(id, codec);
}

pub fn lookup_sum_type(id: &str) -> Option<SumTypeCodec> {
    registry()
        .read()
        .expect("sum type registry poisoned")
        .get(id)
        .cloned()
}
