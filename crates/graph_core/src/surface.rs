use crate::error::{check_interval, EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Cells with |z| at or above this are dropped from the grid.
pub const SURFACE_Z_LIMIT: f64 = 1e6;
/// Largest accepted grid side.
pub const MAX_RESOLUTION: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `count` evenly spaced coordinates covering both ends.
    pub fn linspace(&self, count: usize) -> Vec<f64> {
        let denom = (count.max(2) - 1) as f64;
        let step = (self.max - self.min) / denom;
        (0..count)
            .map(|i| {
                if i + 1 == count {
                    self.max
                } else {
                    self.min + step * i as f64
                }
            })
            .collect()
    }
}

/// A fixed-resolution height field. `z[j][i]` is the value at `(x[i], y[j])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<Vec<Option<f64>>>,
}

impl SurfaceGrid {
    pub fn null_count(&self) -> usize {
        self.z.iter().flatten().filter(|z| z.is_none()).count()
    }
}

/// Evaluates `f` on a `resolution × resolution` grid. Fails only when every
/// cell is undefined.
pub fn generate_surface<F>(
    f: F,
    x_range: Range,
    y_range: Range,
    resolution: usize,
) -> EngineResult<SurfaceGrid>
where
    F: Fn(f64, f64) -> Option<f64>,
{
    check_interval("x", x_range.min, x_range.max)?;
    check_interval("y", y_range.min, y_range.max)?;
    if !(2..=MAX_RESOLUTION).contains(&resolution) {
        return Err(EngineError::Bounds(format!(
            "resolution must be between 2 and {MAX_RESOLUTION} (got {resolution})."
        )));
    }

    let xs = x_range.linspace(resolution);
    let ys = y_range.linspace(resolution);
    let mut defined = 0usize;
    let z: Vec<Vec<Option<f64>>> = ys
        .iter()
        .map(|&y| {
            xs.iter()
                .map(|&x| {
                    let value = f(x, y).filter(|z| z.is_finite() && z.abs() < SURFACE_Z_LIMIT);
                    if value.is_some() {
                        defined += 1;
                    }
                    value
                })
                .collect()
        })
        .collect();

    if defined == 0 {
        return Err(EngineError::DegenerateResult(
            "The surface is undefined over the whole domain.".to_string(),
        ));
    }
    Ok(SurfaceGrid { x: xs, y: ys, z })
}
