//! Fixed-step quadrature for the four integral modes.
//!
//! Cartesian and double integrals tolerate undefined samples (fallback or
//! zero contribution). Parametric and polar integrals fail on the first one.

use crate::error::{check_interval, EngineError, EngineResult};
use crate::surface::Range;
use tracing::debug;

pub const CARTESIAN_STEPS: usize = 1000;
pub const MIN_CARTESIAN_STEPS: usize = 100;
pub const MAX_CARTESIAN_STEPS: usize = 10_000_000;
pub const CURVE_STEPS: usize = 2000;
pub const DOUBLE_INTEGRAL_GRID: usize = 120;

fn defined(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Composite Simpson over `values.len() - 1` (even) intervals of width `h`.
fn simpson(values: &[f64], h: f64) -> f64 {
    let last = values.len() - 1;
    let sum: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let weight = if i == 0 || i == last {
                1.0
            } else if i % 2 == 1 {
                4.0
            } else {
                2.0
            };
            weight * v
        })
        .sum();
    sum * h / 3.0
}

fn trapezoid(values: &[f64], h: f64) -> f64 {
    let last = values.len() - 1;
    let inner: f64 = values[1..last].iter().sum();
    h * (0.5 * (values[0] + values[last]) + inner)
}

fn even_steps(steps: usize) -> usize {
    steps + steps % 2
}

/// `∫ f dx` over `[a, b]` by Simpson's rule with 100 to 10^7 steps. If any
/// sample is undefined, falls back to the trapezoid rule with undefined
/// samples counted as zero.
pub fn definite_integral<F>(f: F, a: f64, b: f64, steps: usize) -> EngineResult<f64>
where
    F: Fn(f64) -> Option<f64>,
{
    check_interval("integral", a, b)?;
    if steps > MAX_CARTESIAN_STEPS {
        return Err(EngineError::Bounds(format!(
            "steps must be at most {MAX_CARTESIAN_STEPS} (got {steps})."
        )));
    }
    let n = even_steps(steps.max(MIN_CARTESIAN_STEPS));
    let h = (b - a) / n as f64;
    let samples: Vec<Option<f64>> = (0..=n).map(|i| defined(f(a + h * i as f64))).collect();

    if let Some(values) = samples.iter().copied().collect::<Option<Vec<f64>>>() {
        return Ok(simpson(&values, h));
    }
    let undefined = samples.iter().filter(|s| s.is_none()).count();
    debug!(undefined, steps = n, "integrand undefined at some samples, using trapezoid rule");
    let values: Vec<f64> = samples.into_iter().map(|s| s.unwrap_or(0.0)).collect();
    Ok(trapezoid(&values, h))
}

/// Simpson over `[a, b]` that rejects the first undefined sample.
fn strict_simpson<G>(g: G, a: f64, b: f64, steps: usize, what: &str) -> EngineResult<f64>
where
    G: Fn(f64) -> Option<f64>,
{
    check_interval("integral", a, b)?;
    let n = even_steps(steps);
    let h = (b - a) / n as f64;
    let mut values = Vec::with_capacity(n + 1);
    for i in 0..=n {
        let t = a + h * i as f64;
        let value = defined(g(t)).ok_or_else(|| {
            EngineError::IntegrandUndefined(format!(
                "The {what} is undefined at t = {t}; the integral cannot be computed."
            ))
        })?;
        values.push(value);
    }
    Ok(simpson(&values, h))
}

/// Signed area `∫ y(t) x'(t) dt` swept by a parametric curve.
pub fn parametric_area<DX, Y>(dx: DX, y: Y, a: f64, b: f64) -> EngineResult<f64>
where
    DX: Fn(f64) -> Option<f64>,
    Y: Fn(f64) -> Option<f64>,
{
    strict_simpson(|t| Some(y(t)? * dx(t)?), a, b, CURVE_STEPS, "parametric integrand")
}

/// Sector area `½ ∫ r(θ)² dθ`.
pub fn polar_area<R>(r: R, a: f64, b: f64) -> EngineResult<f64>
where
    R: Fn(f64) -> Option<f64>,
{
    strict_simpson(|t| r(t).map(|r| 0.5 * r * r), a, b, CURVE_STEPS, "polar integrand")
}

/// `∬ f dy dx` over a rectangle by nested trapezoid rules on a fixed grid.
/// Undefined cells contribute zero.
pub fn double_integral<F>(f: F, x_range: Range, y_range: Range) -> EngineResult<f64>
where
    F: Fn(f64, f64) -> Option<f64>,
{
    check_interval("x", x_range.min, x_range.max)?;
    check_interval("y", y_range.min, y_range.max)?;
    let n = DOUBLE_INTEGRAL_GRID;
    let xs = x_range.linspace(n + 1);
    let ys = y_range.linspace(n + 1);
    let hx = (x_range.max - x_range.min) / n as f64;
    let hy = (y_range.max - y_range.min) / n as f64;

    let inner: Vec<f64> = xs
        .iter()
        .map(|&x| {
            let column: Vec<f64> = ys.iter().map(|&y| defined(f(x, y)).unwrap_or(0.0)).collect();
            trapezoid(&column, hy)
        })
        .collect();
    Ok(trapezoid(&inner, hx))
}
