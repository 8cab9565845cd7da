//! C10: wire adapters. A [`crate::patch::Patch`] flattens to the operation
//! list [`crate::patch::Patch::walk`] already produces, and both encoders
//! serialize that list plus the patch's top-level strict/condition guard
//! (§4.10/§6) rather than inventing a second schema per format.
mod model;
mod value;

pub mod binary;
pub mod json;
pub mod replay;

pub use model::DecodedPatch;
pub use value::{from_wire, to_wire, WireValue};
pub use replay::apply_operations;
