//! Non-throwing evaluation of compiled expressions and the validity oracle
//! shared by every sampler.

use crate::expression::{Bindings, CompiledExpression, Scope};

/// Most names a single sampling variable is bound under (e.g. `t` and `theta`).
const MAX_ALIASES: usize = 2;

/// Evaluates `compiled`, turning any evaluation failure into `None`.
/// Non-finite results are passed through; [`is_valid`] classifies them.
pub fn evaluate<E: CompiledExpression + ?Sized>(compiled: &E, bindings: &Bindings) -> Option<f64> {
    compiled.evaluate(bindings).ok()
}

/// True iff `y` is finite and `|y| <= abs_limit`.
pub fn is_valid(y: f64, abs_limit: f64) -> bool {
    y.is_finite() && y.abs() <= abs_limit
}

/// Binds `compiled` as a function of one variable known under `names`.
pub fn scalar_fn<'a, E: CompiledExpression + ?Sized>(
    compiled: &'a E,
    scope: &'a Scope,
    names: &'a [&'a str],
) -> impl Fn(f64) -> Option<f64> + 'a {
    let count = names.len().min(MAX_ALIASES);
    move |x| {
        let mut locals = [("", x); MAX_ALIASES];
        for (slot, name) in locals.iter_mut().zip(names) {
            *slot = (*name, x);
        }
        evaluate(compiled, &Bindings::new(scope, &locals[..count]))
    }
}

/// Binds `compiled` as a function of `x` and `y`.
pub fn surface_fn<'a, E: CompiledExpression + ?Sized>(
    compiled: &'a E,
    scope: &'a Scope,
) -> impl Fn(f64, f64) -> Option<f64> + 'a {
    move |x, y| {
        let locals = [("x", x), ("y", y)];
        evaluate(compiled, &Bindings::new(scope, &locals))
    }
}

/// Derivative of `compiled` with respect to `names[0]`. Uses the analytic
/// derivative when the expression provides one, otherwise a centered finite
/// difference with step `fallback_step`.
pub fn slope_fn<'a, E: CompiledExpression + ?Sized>(
    compiled: &'a E,
    scope: &'a Scope,
    names: &'a [&'a str],
    fallback_step: f64,
) -> impl Fn(f64) -> Option<f64> + 'a {
    let value = scalar_fn(compiled, scope, names);
    let count = names.len().min(MAX_ALIASES);
    move |x| {
        let mut locals = [("", x); MAX_ALIASES];
        for (slot, name) in locals.iter_mut().zip(names) {
            *slot = (*name, x);
        }
        let bindings = Bindings::new(scope, &locals[..count]);
        let wrt = names.first().copied().unwrap_or("x");
        match compiled.derivative(&bindings, wrt) {
            Some(result) => result.ok(),
            None => central_difference(&value, x, fallback_step),
        }
    }
}

/// Finite difference step for a derivative taken over `[a, b]`.
pub fn difference_step(a: f64, b: f64) -> f64 {
    1e-5_f64.max((b - a).abs() / 1e6)
}

/// `(f(x + h) - f(x - h)) / 2h`, or `None` if either side fails.
pub fn central_difference(f: impl Fn(f64) -> Option<f64>, x: f64, h: f64) -> Option<f64> {
    let ahead = f(x + h)?;
    let behind = f(x - h)?;
    Some((ahead - behind) / (2.0 * h))
}
