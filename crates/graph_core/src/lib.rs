pub mod autodiff;
pub mod boundary;
pub mod dispatch;
pub mod equation_engine;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod protocol;
pub mod quadrature;
pub mod roots;
pub mod sampling;
pub mod surface;
/// The `graph_core` crate is the numeric engine behind the plotter. It turns
/// expression text into render-ready data and scalar results.
///
/// Key components:
/// - **Expression engine**: `ExpressionCompiler`/`CompiledExpression` seam, with a bytecode VM
///   implementation that also evaluates over dual numbers for analytic derivatives.
/// - **Samplers**: adaptive curve sampling with boundary pinning, and a fixed-resolution surface grid.
/// - **Analysis**: scan-and-bisect zeros, extrema and intersections; Simpson/trapezoid quadrature.
/// - **Dispatch**: the JSON request protocol and an in-process worker thread that serves it.
pub mod worker;

pub use dispatch::Dispatcher;
pub use error::{EngineError, EngineResult};
pub use protocol::{Request, Response};
pub use worker::EngineWorker;
