use thiserror::Error;

macro_rules! usage_error {
    ($($arg:tt)*) => {
        anyhow::Error::from($crate::error::PsyError::Usage(format!($($arg)*)))
    };
}

macro_rules! not_implemented {
    ($($arg:tt)*) => {
        anyhow::Error::from($crate::error::PsyError::NotImplemented(format!($($arg)*)))
    };
}

macro_rules! generation_error {
    ($($arg:tt)*) => {
        anyhow::Error::from($crate::error::PsyError::Generation(format!($($arg)*)))
    };
}

macro_rules! internal_error {
    ($($arg:tt)*) => {
        anyhow::Error::from($crate::error::PsyError::Internal(format!($($arg)*)))
    };
}

macro_rules! transformation_error {
    ($($arg:tt)*) => {
        anyhow::Error::from($crate::error::PsyError::Transformation(format!($($arg)*)))
    };
}

pub(crate) use generation_error;
pub(crate) use internal_error;
pub(crate) use not_implemented;
pub(crate) use transformation_error;
pub(crate) use usage_error;

/// Errors raised by the core.
///
/// All fallible operations return [anyhow::Result]; the errors created by
/// this crate are always one of these variants so that callers can recover
/// the kind via `err.downcast_ref::<PsyError>()`.
///
/// # Error Categories
///
/// - [`PsyError::Usage`] and [`PsyError::NotImplemented`] - the request
///   itself is invalid (bad API name, unknown transformation, unsupported
///   construct).
/// - [`PsyError::Transformation`] - a transformation was asked to do
///   something that it cannot do safely. The tree is left untouched.
/// - [`PsyError::Generation`] - the program being compiled violates a rule
///   of the programming model (argument passed twice, nested parallel
///   regions, ...).
/// - [`PsyError::Internal`] - an invariant of the core itself is broken.
/// - [`PsyError::ResourceConflict`] - generated output would clash with an
///   existing file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PsyError {
    #[error("{0}")]
    Usage(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Transformation Error: {0}")]
    Transformation(String),
    #[error("Generation Error: {0}")]
    Generation(String),
    #[error("Internal Error: {0}")]
    Internal(String),
    #[error("{0}")]
    ResourceConflict(String),
}

/// Coarse classification of a [PsyError].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    SemanticViolation,
    InternalConsistency,
    ResourceConflict,
}

impl PsyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PsyError::Usage(_) | PsyError::NotImplemented(_) | PsyError::Transformation(_) => {
                ErrorKind::Usage
            }
            PsyError::Generation(_) => ErrorKind::SemanticViolation,
            PsyError::Internal(_) => ErrorKind::InternalConsistency,
            PsyError::ResourceConflict(_) => ErrorKind::ResourceConflict,
        }
    }
}

/// Kind of the error if it was raised by this crate.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<PsyError>().map(|e| e.kind())
}

#[test]
fn test_error_kind() {
    let err = generation_error!("Cannot nest OpenMP parallel regions.");
    assert_eq!(error_kind(&err), Some(ErrorKind::SemanticViolation));
    assert_eq!(
        err.to_string(),
        "Generation Error: Cannot nest OpenMP parallel regions."
    );
    let err = not_implemented!("type '{}'", "logical");
    assert_eq!(error_kind(&err), Some(ErrorKind::Usage));
    assert_eq!(err.to_string(), "Not implemented: type 'logical'");
    let err = anyhow::anyhow!("foreign");
    assert_eq!(error_kind(&err), None);
}
