use thiserror::Error;

/// Errors surfaced by forest operations.
///
/// Argument validation fails fast at the public boundary; internal invariant
/// violations surface as `InconsistentState` and indicate a bug rather than a
/// recoverable condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForestError {
    #[error("invalid argument: {msg}")]
    InvalidArgument { msg: &'static str },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("point handle {handle} is not live")]
    InvalidHandle { handle: usize },

    #[error("capacity exhausted: {msg}")]
    ExhaustedCapacity { msg: &'static str },

    #[error("forest holds no observations")]
    EmptyForest,

    #[error("inconsistent internal state: {msg}")]
    InconsistentState { msg: &'static str },
}

pub type Result<T> = std::result::Result<T, ForestError>;

/// Returns `InvalidArgument` with the given message unless `test` holds.
pub(crate) fn ensure_arg(test: bool, msg: &'static str) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(ForestError::InvalidArgument { msg })
    }
}

/// Returns `InconsistentState` with the given message unless `test` holds.
pub(crate) fn ensure_state(test: bool, msg: &'static str) -> Result<()> {
    if test {
        Ok(())
    } else {
        Err(ForestError::InconsistentState { msg })
    }
}
