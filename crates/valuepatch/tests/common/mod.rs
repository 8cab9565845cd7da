//! Fixture types shared by the integration tests, standing in for the
//! "typed user struct" a real caller would register instead of diffing
//! blanket scalar/container impls alone.
use std::sync::OnceLock;

use valuepatch::{
    Error, FieldFlags, Kind, Patchable, Path, Result, StructFields, StructFieldsMut, TypeDescriptor,
};

/// A two-field product used for the field-swap cycle (S4): `T{A: int, B: int}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub a: i64,
    pub b: i64,
}

fn pair_descriptor() -> &'static TypeDescriptor {
    static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
    DESCRIPTOR.get_or_init(|| {
        TypeDescriptor::build("Pair")
            .field("a", FieldFlags::default())
            .field("b", FieldFlags::default())
            .build()
    })
}

impl Patchable for Pair {
    fn kind(&self) -> Kind {
        Kind::Struct
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn dyn_clone(&self) -> Box<dyn Patchable> {
        Box::new(self.clone())
    }
    fn struct_fields(&self) -> Option<&dyn StructFields> {
        Some(self)
    }
    fn struct_fields_mut(&mut self) -> Option<&mut dyn StructFieldsMut> {
        Some(self)
    }
    fn type_descriptor(&self) -> Option<&'static TypeDescriptor> {
        Some(pair_descriptor())
    }
}

impl StructFields for Pair {
    fn field_names(&self) -> &'static [&'static str] {
        &["a", "b"]
    }
    fn get(&self, name: &str) -> Option<&dyn Patchable> {
        match name {
            "a" => Some(&self.a),
            "b" => Some(&self.b),
            _ => None,
        }
    }
}

impl StructFieldsMut for Pair {
    fn get_mut(&mut self, name: &str) -> Option<&mut dyn Patchable> {
        match name {
            "a" => Some(&mut self.a),
            "b" => Some(&mut self.b),
            _ => None,
        }
    }
    fn replace(&mut self, name: &str, value: Box<dyn Patchable>) -> Result<()> {
        let v = *value
            .as_any()
            .downcast_ref::<i64>()
            .ok_or_else(|| Error::TypeMismatch {
                path: Path::root(),
                expected: "i64",
                actual: "other",
            })?;
        match name {
            "a" => self.a = v,
            "b" => self.b = v,
            _ => return Err(Error::PathNotFound(Path::root().pushed_property(name.to_string()))),
        }
        Ok(())
    }
}

/// A single-field product used for the condition/strict scenario (S5):
/// `T{I: int}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IHolder {
    pub i: i64,
}

fn i_holder_descriptor() -> &'static TypeDescriptor {
    static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
    DESCRIPTOR.get_or_init(|| TypeDescriptor::build("IHolder").field("i", FieldFlags::default()).build())
}

impl Patchable for IHolder {
    fn kind(&self) -> Kind {
        Kind::Struct
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn dyn_clone(&self) -> Box<dyn Patchable> {
        Box::new(self.clone())
    }
    fn struct_fields(&self) -> Option<&dyn StructFields> {
        Some(self)
    }
    fn struct_fields_mut(&mut self) -> Option<&mut dyn StructFieldsMut> {
        Some(self)
    }
    fn type_descriptor(&self) -> Option<&'static TypeDescriptor> {
        Some(i_holder_descriptor())
    }
}

impl StructFields for IHolder {
    fn field_names(&self) -> &'static [&'static str] {
        &["i"]
    }
    fn get(&self, name: &str) -> Option<&dyn Patchable> {
        match name {
            "i" => Some(&self.i),
            _ => None,
        }
    }
}

impl StructFieldsMut for IHolder {
    fn get_mut(&mut self, name: &str) -> Option<&mut dyn Patchable> {
        match name {
            "i" => Some(&mut self.i),
            _ => None,
        }
    }
    fn replace(&mut self, name: &str, value: Box<dyn Patchable>) -> Result<()> {
        let v = *value
            .as_any()
            .downcast_ref::<i64>()
            .ok_or_else(|| Error::TypeMismatch {
                path: Path::root(),
                expected: "i64",
                actual: "other",
            })?;
        match name {
            "i" => self.i = v,
            _ => return Err(Error::PathNotFound(Path::root().pushed_property(name.to_string()))),
        }
        Ok(())
    }
}

/// A product with a stable identity key, used for keyed slice alignment (S3):
/// elements of type `Item{id: key, v: string}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub v: String,
}

impl Item {
    pub fn new(id: i64, v: &str) -> Item {
        Item { id, v: v.to_string() }
    }
}

fn item_descriptor() -> &'static TypeDescriptor {
    static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
    DESCRIPTOR.get_or_init(|| {
        TypeDescriptor::build("Item")
            .field(
                "id",
                FieldFlags {
                    identity_key: true,
                    ..Default::default()
                },
            )
            .field("v", FieldFlags::default())
            .build()
    })
}

impl Patchable for Item {
    fn kind(&self) -> Kind {
        Kind::Struct
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn dyn_clone(&self) -> Box<dyn Patchable> {
        Box::new(self.clone())
    }
    fn struct_fields(&self) -> Option<&dyn StructFields> {
        Some(self)
    }
    fn struct_fields_mut(&mut self) -> Option<&mut dyn StructFieldsMut> {
        Some(self)
    }
    fn type_descriptor(&self) -> Option<&'static TypeDescriptor> {
        Some(item_descriptor())
    }
}

impl StructFields for Item {
    fn field_names(&self) -> &'static [&'static str] {
        &["id", "v"]
    }
    fn get(&self, name: &str) -> Option<&dyn Patchable> {
        match name {
            "id" => Some(&self.id),
            "v" => Some(&self.v),
            _ => None,
        }
    }
}

/// A product exercising the three field tags (properties 5-7 in
/// SPEC_FULL.md §8): `ignored` is invisible to diff/equal/apply, `atomic` is
/// compared and patched whole rather than descended into, and `locked` diffs
/// normally but apply refuses to execute the resulting change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flagged {
    pub visible: i64,
    pub ignored: i64,
    pub atomic: Vec<i64>,
    pub locked: i64,
}

fn flagged_descriptor() -> &'static TypeDescriptor {
    static DESCRIPTOR: OnceLock<TypeDescriptor> = OnceLock::new();
    DESCRIPTOR.get_or_init(|| {
        TypeDescriptor::build("Flagged")
            .field("visible", FieldFlags::default())
            .field(
                "ignored",
                FieldFlags {
                    ignore: true,
                    ..Default::default()
                },
            )
            .field(
                "atomic",
                FieldFlags {
                    atomic: true,
                    ..Default::default()
                },
            )
            .field(
                "locked",
                FieldFlags {
                    readonly: true,
                    ..Default::default()
                },
            )
            .build()
    })
}

impl Patchable for Flagged {
    fn kind(&self) -> Kind {
        Kind::Struct
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn dyn_clone(&self) -> Box<dyn Patchable> {
        Box::new(self.clone())
    }
    fn struct_fields(&self) -> Option<&dyn StructFields> {
        Some(self)
    }
    fn struct_fields_mut(&mut self) -> Option<&mut dyn StructFieldsMut> {
        Some(self)
    }
    fn type_descriptor(&self) -> Option<&'static TypeDescriptor> {
        Some(flagged_descriptor())
    }
}

impl StructFields for Flagged {
    fn field_names(&self) -> &'static [&'static str] {
        &["visible", "ignored", "atomic", "locked"]
    }
    fn get(&self, name: &str) -> Option<&dyn Patchable> {
        match name {
            "visible" => Some(&self.visible),
            "ignored" => Some(&self.ignored),
            "atomic" => Some(&self.atomic),
            "locked" => Some(&self.locked),
            _ => None,
        }
    }
}

impl StructFieldsMut for Flagged {
    fn get_mut(&mut self, name: &str) -> Option<&mut dyn Patchable> {
        match name {
            "visible" => Some(&mut self.visible),
            "ignored" => Some(&mut self.ignored),
            "atomic" => Some(&mut self.atomic),
            "locked" => Some(&mut self.locked),
            _ => None,
        }
    }
    fn replace(&mut self, name: &str, value: Box<dyn Patchable>) -> Result<()> {
        let v = *value
            .as_any()
            .downcast_ref::<i64>()
            .ok_or_else(|| Error::TypeMismatch {
                path: Path::root(),
                expected: "i64",
                actual: "other",
            })?;
        match name {
            "visible" => self.visible = v,
            "ignored" => self.ignored = v,
            "locked" => self.locked = v,
            _ => return Err(Error::PathNotFound(Path::root().pushed_property(name.to_string()))),
        }
        Ok(())
    }
}

impl StructFieldsMut for Item {
    fn get_mut(&mut self, name: &str) -> Option<&mut dyn Patchable> {
        match name {
            "id" => Some(&mut self.id),
            "v" => Some(&mut self.v),
            _ => None,
        }
    }
    fn replace(&mut self, name: &str, value: Box<dyn Patchable>) -> Result<()> {
        match name {
            "id" => {
                self.id = *value.as_any().downcast_ref::<i64>().ok_or_else(|| Error::TypeMismatch {
                    path: Path::root(),
                    expected: "i64",
                    actual: "other",
                })?;
            }
            "v" => {
                self.v = value
                    .as_any()
                    .downcast_ref::<String>()
                    .ok_or_else(|| Error::TypeMismatch {
                        path: Path::root(),
                        expected: "String",
                        actual: "other",
                    })?
                    .clone();
            }
            _ => return Err(Error::PathNotFound(Path::root().pushed_property(name.to_string()))),
        }
        Ok(())
    }
}
