//! The reflection substitute.
//!
//! Go's `reflect` package lets the original implementation walk an arbitrary
//! value's fields at runtime. Rust has no equivalent, so every type that
//! wants to participate in equality/diff/apply/merge implements [`Patchable`]
//! once, the same way concrete document representations in the teacher crate
//! implement `AsNode` by hand rather than deriving it.
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::registry::TypeDescriptor;

/// The runtime kind of a [`Patchable`] value, independent of its static Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Bool,
    Int,
    UInt,
    Float,
    String,
    Bytes,
    Struct,
    Sum,
    Pointer,
    Seq,
    Array,
    Map,
}

/// Borrowed view of a scalar leaf value, used by equality, ordering, and
/// condition-literal coercion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
    Null,
    Bool(bool),
    Int(i128),
    UInt(u128),
    Float(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> Scalar<'a> {
    /// Bit-exact float comparison: two NaNs are unequal, matching IEEE 754
    /// and the teacher's documented stance that floaty funny bitness is
    /// still compared exactly at the scalar leaf (the diff engine uses a
    /// separate epsilon-aware path only where the spec calls for one).
    pub fn scalar_eq(&self, other: &Scalar<'_>) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::UInt(a), Scalar::UInt(b)) => a == b,
            (Scalar::Int(a), Scalar::UInt(b)) | (Scalar::UInt(b), Scalar::Int(a)) => {
                *a >= 0 && *a as u128 == *b
            }
            (Scalar::Float(a), Scalar::Float(b)) => {
                if a.is_nan() || b.is_nan() {
                    false
                } else {
                    a.to_bits() == b.to_bits()
                }
            }
            (Scalar::Str(a), Scalar::Str(b)) => a == b,
            (Scalar::Bytes(a), Scalar::Bytes(b)) => a == b,
            _ => false,
        }
    }

    pub fn cmp_ord(&self, other: &Scalar<'_>) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        fn rank(s: &Scalar<'_>) -> u8 {
            match s {
                Scalar::Null => 0,
                Scalar::Bool(_) => 1,
                Scalar::Int(_) | Scalar::UInt(_) | Scalar::Float(_) => 2,
                Scalar::Str(_) => 3,
                Scalar::Bytes(_) => 4,
            }
        }
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Equal,
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (Scalar::Bytes(a), Scalar::Bytes(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::UInt(a), Scalar::UInt(b)) => a.cmp(b),
            (Scalar::Int(a), Scalar::UInt(b)) => {
                if *a < 0 {
                    Less
                } else {
                    (*a as u128).cmp(b)
                }
            }
            (Scalar::UInt(a), Scalar::Int(b)) => {
                if *b < 0 {
                    Greater
                } else {
                    a.cmp(&(*b as u128))
                }
            }
            (Scalar::Float(a), Scalar::Float(b)) => a.partial_cmp(b).unwrap_or(Equal),
            (Scalar::Int(a), Scalar::Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Equal),
            (Scalar::Float(a), Scalar::Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Equal),
            (Scalar::UInt(a), Scalar::Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Equal),
            (Scalar::Float(a), Scalar::UInt(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Equal),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

/// A scalar used as a map key: maps are restricted to scalar keys per the spec.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarKey {
    String(String),
    Int(i128),
}

impl fmt::Display for ScalarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKey::String(s) => write!(f, "{s}"),
            ScalarKey::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for ScalarKey {
    fn from(s: &str) -> Self {
        ScalarKey::String(s.to_string())
    }
}
impl From<String> for ScalarKey {
    fn from(s: String) -> Self {
        ScalarKey::String(s)
    }
}
impl From<i64> for ScalarKey {
    fn from(i: i64) -> Self {
        ScalarKey::Int(i as i128)
    }
}

/// Read-only access to the named fields of a product (struct) value.
pub trait StructFields {
    fn field_names(&self) -> &'static [&'static str];
    fn get(&self, name: &str) -> Option<&dyn Patchable>;
}

/// Mutable access to the named fields of a product (struct) value.
/// `replace` swaps the entire boxed child at `name`, which is how a
/// nested value-patch is applied without needing `&mut Box<dyn Patchable>`
/// at every recursion level.
pub trait StructFieldsMut: StructFields {
    fn get_mut(&mut self, name: &str) -> Option<&mut dyn Patchable>;
    fn replace(&mut self, name: &str, value: Box<dyn Patchable>) -> crate::error::Result<()>;
}

/// Read-only access to the items of a sequence (slice or array) value.
pub trait SeqItems {
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Option<&dyn Patchable>;
}

/// Mutable access to the items of a sequence value. Arrays (fixed length)
/// only ever use `get_mut`; slices additionally use `insert`/`remove`.
pub trait SeqItemsMut: SeqItems {
    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Patchable>;
    /// Whole-element replacement in place, valid for both growable slices
    /// and fixed-length arrays (unlike `insert`/`remove`, which only make
    /// sense for the former).
    fn set(&mut self, index: usize, value: Box<dyn Patchable>) -> crate::error::Result<()>;
    fn insert(&mut self, index: usize, value: Box<dyn Patchable>) -> crate::error::Result<()>;
    fn remove(&mut self, index: usize) -> crate::error::Result<Box<dyn Patchable>>;
}

/// Read-only access to the entries of a mapping value.
pub trait MapEntries {
    fn len(&self) -> usize;
    fn keys(&self) -> Vec<ScalarKey>;
    fn get(&self, key: &ScalarKey) -> Option<&dyn Patchable>;
}

/// Mutable access to the entries of a mapping value.
pub trait MapEntriesMut: MapEntries {
    fn get_mut(&mut self, key: &ScalarKey) -> Option<&mut dyn Patchable>;
    fn set(&mut self, key: ScalarKey, value: Box<dyn Patchable>);
    fn remove(&mut self, key: &ScalarKey) -> Option<Box<dyn Patchable>>;
}

/// The trait every participating Rust type implements once. Analogous to
/// the teacher's `AsNode`, but additionally exposes mutation hooks (since,
/// unlike a read-only document view, apply must mutate values in place)
/// and an object-safe clone (standing in for the out-of-scope deep-copy
/// collaborator at the `dyn Patchable` boundary).
pub trait Patchable: Any + dyn_clone::DynClone {
    fn kind(&self) -> Kind;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn dyn_clone(&self) -> Box<dyn Patchable>;

    /// Raw, untagged leaf equality. Structs/seqs/maps/pointers/sums return
    /// `None`; the equality engine recurses into their children instead.
    fn scalar(&self) -> Option<Scalar<'_>> {
        None
    }

    fn struct_fields(&self) -> Option<&dyn StructFields> {
        None
    }
    fn struct_fields_mut(&mut self) -> Option<&mut dyn StructFieldsMut> {
        None
    }

    fn seq_items(&self) -> Option<&dyn SeqItems> {
        None
    }
    fn seq_items_mut(&mut self) -> Option<&mut dyn SeqItemsMut> {
        None
    }

    fn map_entries(&self) -> Option<&dyn MapEntries> {
        None
    }
    fn map_entries_mut(&mut self) -> Option<&mut dyn MapEntriesMut> {
        None
    }

    /// `Some(None)` is a nil pointer; `Some(Some(v))` is a set pointer.
    /// `None` means this value isn't a pointer at all.
    fn pointer_target(&self) -> Option<Option<&dyn Patchable>> {
        None
    }
    /// Mutable counterpart of [`Patchable::pointer_target`], so path
    /// resolution can auto-dereference through a non-nil pointer on the
    /// mutation path the same way it does on the read path.
    fn pointer_target_mut(&mut self) -> Option<Option<&mut dyn Patchable>> {
        None
    }
    fn pointer_set(&mut self, _value: Option<Box<dyn Patchable>>) -> crate::error::Result<()> {
        Err(crate::error::Error::TypeMismatch {
            path: crate::path::Path::root(),
            expected: "pointer",
            actual: self.kind_name(),
        })
    }

    /// Sum (tagged interface) values report their active variant id and payload.
    fn sum_variant(&self) -> Option<(&'static str, &dyn Patchable)> {
        None
    }
    fn sum_variant_mut(&mut self) -> Option<(&'static str, &mut dyn Patchable)> {
        None
    }
    fn sum_set(
        &mut self,
        _variant: &'static str,
        _value: Box<dyn Patchable>,
    ) -> crate::error::Result<()> {
        Err(crate::error::Error::TypeMismatch {
            path: crate::path::Path::root(),
            expected: "sum",
            actual: self.kind_name(),
        })
    }

    /// Type descriptor for product/sum types; `None` for scalars and the
    /// built-in container types (`Vec`, `Option`, `BTreeMap`, arrays), which
    /// have no fields to tag.
    fn type_descriptor(&self) -> Option<&'static TypeDescriptor> {
        None
    }

    fn kind_name(&self) -> &'static str {
        match self.kind() {
            Kind::Null => "null",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::UInt => "uint",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Bytes => "bytes",
            Kind::Struct => "struct",
            Kind::Sum => "sum",
            Kind::Pointer => "pointer",
            Kind::Seq => "seq",
            Kind::Array => "array",
            Kind::Map => "map",
        }
    }
}

dyn_clone::clone_trait_object!(Patchable);

impl fmt::Debug for dyn Patchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Patchable({})", self.kind_name())
    }
}

/// A byte-string value. `Vec<u8>` is left to mean "a sequence of `u8`
/// scalars" (diffed element-wise); wrap bytes that should be treated as an
/// atomic blob in `Bytes`, the same way `serde_bytes::ByteBuf` disambiguates
/// `Vec<u8>` for serde.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

macro_rules! impl_scalar {
    ($ty:ty, $kind:expr, $ctor:expr) => {
        impl Patchable for $ty {
            fn kind(&self) -> Kind {
                $kind
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
                Some($ctor(self))
            }
        }
    };
}

impl_scalar!(bool, Kind::Bool, |v: &bool| Scalar::Bool(*v));
impl_scalar!(i8, Kind::Int, |v: &i8| Scalar::Int(*v as i128));
impl_scalar!(i16, Kind::Int, |v: &i16| Scalar::Int(*v as i128));
impl_scalar!(i32, Kind::Int, |v: &i32| Scalar::Int(*v as i128));
impl_scalar!(i64, Kind::Int, |v: &i64| Scalar::Int(*v as i128));
impl_scalar!(i128, Kind::Int, |v: &i128| Scalar::Int(*v));
impl_scalar!(u8, Kind::UInt, |v: &u8| Scalar::UInt(*v as u128));
impl_scalar!(u16, Kind::UInt, |v: &u16| Scalar::UInt(*v as u128));
impl_scalar!(u32, Kind::UInt, |v: &u32| Scalar::UInt(*v as u128));
impl_scalar!(u64, Kind::UInt, |v: &u64| Scalar::UInt(*v as u128));
impl_scalar!(u128, Kind::UInt, |v: &u128| Scalar::UInt(*v));
impl_scalar!(f32, Kind::Float, |v: &f32| Scalar::Float(*v as f64));
impl_scalar!(f64, Kind::Float, |v: &f64| Scalar::Float(*v));
fn string_scalar(v: &String) -> Scalar<'_> {
    Scalar::Str(v.as_str())
}
fn bytes_scalar(v: &Bytes) -> Scalar<'_> {
    Scalar::Bytes(v.0.as_slice())
}
impl_scalar!(String, Kind::String, string_scalar);
impl_scalar!(Bytes, Kind::Bytes, bytes_scalar);

impl<T: Patchable + Clone + 'static> Patchable for Option<Box<T>> {
    fn kind(&self) -> Kind {
        Kind::Pointer
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
    fn pointer_target(&self) -> Option<Option<&dyn Patchable>> {
        Some(self.as_ref().map(|b| b.as_ref() as &dyn Patchable))
    }
    fn pointer_target_mut(&mut self) -> Option<Option<&mut dyn Patchable>> {
        Some(self.as_mut().map(|b| b.as_mut() as &mut dyn Patchable))
    }
    fn pointer_set(&mut self, value: Option<Box<dyn Patchable>>) -> crate::error::Result<()> {
        *self = match value {
            None => None,
            Some(boxed) => {
                let any = boxed.dyn_clone();
                let concrete = any
                    .as_any()
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or_else(|| crate::error::Error::TypeMismatch {
                        path: crate::path::Path::root(),
                        expected: std::any::type_name::<T>(),
                        actual: "other",
                    })?;
                Some(Box::new(concrete))
            }
        };
        Ok(())
    }
}

impl<T: Patchable + Clone + 'static> Patchable for Vec<T> {
    fn kind(&self) -> Kind {
        Kind::Seq
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
    fn seq_items(&self) -> Option<&dyn SeqItems> {
        Some(self)
    }
    fn seq_items_mut(&mut self) -> Option<&mut dyn SeqItemsMut> {
        Some(self)
    }
}

impl<T: Patchable + Clone + 'static> SeqItems for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
    fn get(&self, index: usize) -> Option<&dyn Patchable> {
        <[T]>::get(self, index).map(|v| v as &dyn Patchable)
    }
}

impl<T: Patchable + Clone + 'static> SeqItemsMut for Vec<T> {
    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Patchable> {
        <[T]>::get_mut(self, index).map(|v| v as &mut dyn Patchable)
    }
    fn set(&mut self, index: usize, value: Box<dyn Patchable>) -> crate::error::Result<()> {
        let concrete = value
            .as_any()
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| crate::error::Error::TypeMismatch {
                path: crate::path::Path::root(),
                expected: std::any::type_name::<T>(),
                actual: "other",
            })?;
        let slot = <[T]>::get_mut(self, index)
            .ok_or_else(|| crate::error::Error::PathNotFound(crate::path::Path::root()))?;
        *slot = concrete;
        Ok(())
    }
    fn insert(&mut self, index: usize, value: Box<dyn Patchable>) -> crate::error::Result<()> {
        let concrete = value
            .as_any()
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| crate::error::Error::TypeMismatch {
                path: crate::path::Path::root(),
                expected: std::any::type_name::<T>(),
                actual: "other",
            })?;
        if index > self.len() {
            return Err(crate::error::Error::PathNotFound(crate::path::Path::root()));
        }
        Vec::insert(self, index, concrete);
        Ok(())
    }
    fn remove(&mut self, index: usize) -> crate::error::Result<Box<dyn Patchable>> {
        if index >= self.len() {
            return Err(crate::error::Error::PathNotFound(crate::path::Path::root()));
        }
        Ok(Box::new(Vec::remove(self, index)))
    }
}

impl<T: Patchable + Clone + 'static, const N: usize> Patchable for [T; N] {
    fn kind(&self) -> Kind {
        Kind::Array
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
    fn seq_items(&self) -> Option<&dyn SeqItems> {
        Some(self)
    }
    fn seq_items_mut(&mut self) -> Option<&mut dyn SeqItemsMut> {
        Some(self)
    }
}

impl<T: Patchable + Clone + 'static, const N: usize> SeqItems for [T; N] {
    fn len(&self) -> usize {
        N
    }
    fn get(&self, index: usize) -> Option<&dyn Patchable> {
        <[T]>::get(self.as_slice(), index).map(|v| v as &dyn Patchable)
    }
}

impl<T: Patchable + Clone + 'static, const N: usize> SeqItemsMut for [T; N] {
    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Patchable> {
        <[T]>::get_mut(self.as_mut_slice(), index).map(|v| v as &mut dyn Patchable)
    }
    fn set(&mut self, index: usize, value: Box<dyn Patchable>) -> crate::error::Result<()> {
        let concrete = value
            .as_any()
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| crate::error::Error::TypeMismatch {
                path: crate::path::Path::root(),
                expected: std::any::type_name::<T>(),
                actual: "other",
            })?;
        let slot = <[T]>::get_mut(self.as_mut_slice(), index)
            .ok_or_else(|| crate::error::Error::PathNotFound(crate::path::Path::root()))?;
        *slot = concrete;
        Ok(())
    }
    fn insert(&mut self, _index: usize, _value: Box<dyn Patchable>) -> crate::error::Result<()> {
        Err(crate::error::Error::TypeMismatch {
            path: crate::path::Path::root(),
            expected: "array (fixed length)",
            actual: "insert is only valid on seq",
        })
    }
    fn remove(&mut self, _index: usize) -> crate::error::Result<Box<dyn Patchable>> {
        Err(crate::error::Error::TypeMismatch {
            path: crate::path::Path::root(),
            expected: "array (fixed length)",
            actual: "remove is only valid on seq",
        })
    }
}

impl<V: Patchable + Clone + 'static> Patchable for BTreeMap<String, V> {
    fn kind(&self) -> Kind {
        Kind::Map
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
    fn map_entries(&self) -> Option<&dyn MapEntries> {
        Some(self)
    }
    fn map_entries_mut(&mut self) -> Option<&mut dyn MapEntriesMut> {
        Some(self)
    }
}

impl<V: Patchable + Clone + 'static> MapEntries for BTreeMap<String, V> {
    fn len(&self) -> usize {
        BTreeMap::len(self)
    }
    fn keys(&self) -> Vec<ScalarKey> {
        self.keys().cloned().map(ScalarKey::String).collect()
    }
    fn get(&self, key: &ScalarKey) -> Option<&dyn Patchable> {
        match key {
            ScalarKey::String(s) => BTreeMap::get(self, s).map(|v| v as &dyn Patchable),
            ScalarKey::Int(_) => None,
        }
    }
}

impl<V: Patchable + Clone + 'static> MapEntriesMut for BTreeMap<String, V> {
    fn get_mut(&mut self, key: &ScalarKey) -> Option<&mut dyn Patchable> {
        match key {
            ScalarKey::String(s) => BTreeMap::get_mut(self, s).map(|v| v as &mut dyn Patchable),
            ScalarKey::Int(_) => None,
        }
    }
    fn set(&mut self, key: ScalarKey, value: Box<dyn Patchable>) {
        if let ScalarKey::String(s) = key {
            if let Some(concrete) = value.as_any().downcast_ref::<V>().cloned() {
                self.insert(s, concrete);
            }
        }
    }
    fn remove(&mut self, key: &ScalarKey) -> Option<Box<dyn Patchable>> {
        match key {
            ScalarKey::String(s) => BTreeMap::remove(self, s).map(|v| Box::new(v) as Box<dyn Patchable>),
            ScalarKey::Int(_) => None,
        }
    }
}

#[allow(dead_code)]
fn _assert_object_safe(_: &dyn Patchable) {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nan_is_never_equal_to_itself() {
        assert!(!Scalar::Float(f64::NAN).scalar_eq(&Scalar::Float(f64::NAN)));
        assert!(!crate::equal::equal(&f64::NAN, &f64::NAN));
    }
}
