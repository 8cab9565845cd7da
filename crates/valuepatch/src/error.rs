use crate::path::Path;

/// Errors produced anywhere in the diff / equal / apply / merge pipeline.
///
/// Diffing never returns this type except on an internal invariant
/// violation (a panic would also be acceptable there, but an `Error` lets
/// callers recover in library contexts). Apply and merge use it pervasively.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no value at path {0}")]
    PathNotFound(Path),

    #[error("value at {path} has kind {actual:?}, expected {expected:?}")]
    TypeMismatch {
        path: Path,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("precondition mismatch at {path}: expected {expected}, found {actual}")]
    PreconditionMismatch {
        path: Path,
        expected: String,
        actual: String,
    },

    #[error("condition not met")]
    ConditionNotMet,

    #[error("attempted to mutate read-only field at {0}")]
    ReadOnlyViolation(Path),

    #[error("circular dependency among sibling operations at {0}")]
    CircularDependency(Path),

    #[error("merge conflict at {path}: {reason}")]
    Conflict { path: Path, reason: String },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("type {0:?} already has an identity-key field {1:?}; cannot register a second, {2:?}")]
    DuplicateIdentityKey(&'static str, &'static str, &'static str),

    #[error("field {1:?} of type {0:?} has duplicate wire name {2:?}")]
    DuplicateWireName(&'static str, &'static str, &'static str),

    #[error("unregistered sum-type id {0:?}")]
    UnregisteredType(String),

    #[error(transparent)]
    Condition(#[from] crate::condition::ParseError),

    #[error("{context}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn context(self, context: impl Into<String>) -> Error {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Apply accumulates per-operation failures rather than stopping at the
/// first one, except in strict mode. This mirrors the teacher's pattern of
/// a component-local error enum wrapping a list of located failures.
#[derive(thiserror::Error, Debug)]
#[error("apply failed with {} error(s): {}", .0.len(), .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct ApplyError(pub Vec<Error>);

impl ApplyError {
    pub fn single(err: Error) -> ApplyError {
        ApplyError(vec![err])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
