//! The seam between the numeric engine and whatever turns expression text into
//! something callable.
//!
//! Everything downstream of the dispatcher only sees [`CompiledExpression`], so
//! the bytecode engine in [`crate::equation_engine`] can be swapped for another
//! parser/evaluator without touching the samplers or the quadrature code.

use std::collections::HashMap;
use thiserror::Error;

/// Raised when expression text cannot be turned into a callable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    #[error("expression is empty")]
    Empty,
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("malformed number '{0}'")]
    MalformedNumber(String),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: &'static str,
        found: usize,
    },
}

/// Raised by a single evaluation. The scalar evaluator absorbs these into the
/// invalid marker; they never reach a response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationFailure {
    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(String),
    #[error("malformed bytecode")]
    MalformedBytecode,
}

/// Named parameter values supplied with a request.
pub type Scope = HashMap<String, f64>;

/// A borrowed view over the request scope plus a few local overrides such as
/// the sampling variable. Locals shadow scope entries.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    scope: &'a Scope,
    locals: &'a [(&'a str, f64)],
}

impl<'a> Bindings<'a> {
    pub fn new(scope: &'a Scope, locals: &'a [(&'a str, f64)]) -> Self {
        Self { scope, locals }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.locals
            .iter()
            .find(|(local, _)| *local == name)
            .map(|(_, value)| *value)
            .or_else(|| self.scope.get(name).copied())
    }
}

/// A compiled, immutable expression.
pub trait CompiledExpression {
    fn evaluate(&self, bindings: &Bindings) -> Result<f64, EvaluationFailure>;

    /// Analytic derivative with respect to `wrt`, if the implementation can
    /// provide one. `None` means callers fall back to finite differences.
    fn derivative(
        &self,
        _bindings: &Bindings,
        _wrt: &str,
    ) -> Option<Result<f64, EvaluationFailure>> {
        None
    }
}

/// Turns expression text into a [`CompiledExpression`].
pub trait ExpressionCompiler {
    type Output: CompiledExpression;

    fn compile(&self, text: &str) -> Result<Self::Output, CompilationError>;
}
