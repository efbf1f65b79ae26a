use crate::expression::CompilationError;
use thiserror::Error;

/// Failures a request can surface. Per-sample evaluation failures never reach
/// this type; they become gaps or invalid samples instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("could not compile '{expression}': {reason}")]
    Compilation {
        expression: String,
        reason: CompilationError,
    },
    #[error("{0}")]
    Bounds(String),
    #[error("{0}")]
    DegenerateResult(String),
    #[error("{0}")]
    IntegrandUndefined(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Rejects non-finite or inverted `[min, max]` intervals.
pub fn check_interval(label: &str, min: f64, max: f64) -> EngineResult<()> {
    if !min.is_finite() || !max.is_finite() {
        return Err(EngineError::Bounds(format!(
            "{label} bounds must be finite (got [{min}, {max}])."
        )));
    }
    if min >= max {
        return Err(EngineError::Bounds(format!(
            "{label} lower bound must be less than upper bound (got [{min}, {max}])."
        )));
    }
    Ok(())
}
