//! The flat `Operation` projection of a [`crate::patch::Patch`] tree,
//! analogous to a flattened RFC 6902 op list. `Patch::Walk` produces these;
//! the dependency resolver (C8) and both wire encoders consume them.
use crate::path::Path;
use crate::value::Patchable;

#[derive(Debug, Clone)]
pub enum OperationKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Log,
    Test,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OperationKind,
    pub path: Path,
    /// Present for `Add`/`Replace`/`Test`.
    pub value: Option<Box<dyn Patchable>>,
    /// Present for `Move`/`Copy`.
    pub from: Option<Path>,
    /// Present for `Log`.
    pub message: Option<String>,
}

impl Operation {
    pub fn add(path: Path, value: Box<dyn Patchable>) -> Operation {
        Operation {
            kind: OperationKind::Add,
            path,
            value: Some(value),
            from: None,
            message: None,
        }
    }

    pub fn remove(path: Path) -> Operation {
        Operation {
            kind: OperationKind::Remove,
            path,
            value: None,
            from: None,
            message: None,
        }
    }

    pub fn replace(path: Path, value: Box<dyn Patchable>) -> Operation {
        Operation {
            kind: OperationKind::Replace,
            path,
            value: Some(value),
            from: None,
            message: None,
        }
    }

    pub fn move_(from: Path, path: Path) -> Operation {
        Operation {
            kind: OperationKind::Move,
            path,
            value: None,
            from: Some(from),
            message: None,
        }
    }

    pub fn copy(from: Path, path: Path) -> Operation {
        Operation {
            kind: OperationKind::Copy,
            path,
            value: None,
            from: Some(from),
            message: None,
        }
    }

    pub fn log(path: Path, message: impl Into<String>) -> Operation {
        Operation {
            kind: OperationKind::Log,
            path,
            value: None,
            from: None,
            message: Some(message.into()),
        }
    }

    pub fn test(path: Path, value: Box<dyn Patchable>) -> Operation {
        Operation {
            kind: OperationKind::Test,
            path,
            value: Some(value),
            from: None,
            message: None,
        }
    }

    /// Paths this operation reads from, beyond its own target `path` — used
    /// by the dependency resolver to order sibling writes (§4.8).
    pub fn reads(&self) -> Vec<&Path> {
        self.from.iter().collect()
    }

    pub fn writes(&self) -> &Path {
        &self.path
    }
}
