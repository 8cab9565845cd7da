//! Hybrid Logical Clock timestamp type.
//!
//! The clock source itself (what produces a *new*, monotonically advancing
//! `Hlc`) is out of scope per §1 — callers stamp patches with timestamps
//! from whatever HLC generator they already run. This module only owns the
//! timestamp's shape, its total order, and its wire encoding.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hlc {
    pub physical: u64,
    pub logical: u32,
    pub node: HlcNode,
}

/// Interned-by-value node id. Kept as a thin wrapper (rather than a bare
/// `String`) so the ordering and equality story is explicit and stable if
/// richer node identifiers are ever needed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HlcNode(pub String);

impl From<&str> for HlcNode {
    fn from(s: &str) -> Self {
        HlcNode(s.to_string())
    }
}

impl Hlc {
    pub fn new(physical: u64, logical: u32, node: impl Into<HlcNode>) -> Hlc {
        Hlc {
            physical,
            logical,
            node: node.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn orders_lexicographically_on_the_triple() {
        let a = Hlc::new(10, 0, "n1");
        let b = Hlc::new(10, 1, "n1");
        let c = Hlc::new(11, 0, "n1");
        assert!(a < b);
        assert!(b < c);

        let tie_break = Hlc::new(10, 0, "n2");
        assert!(a < tie_break);
    }
}
