//! Adaptive curve sampling.
//!
//! A domain is split into `initial_points` coarse cells. Cells whose ends are
//! both valid are refined by recursive bisection until the midpoint agrees
//! with linear interpolation (or a depth/width cap is hit). Cells that cross a
//! valid/invalid transition get their boundary pinned by
//! [`BoundaryLocator`] and a gap marker spliced in, so singularities render as
//! breaks instead of spikes.

use crate::boundary::{BoundaryLocator, Resolution};
use crate::error::{check_interval, EngineError, EngineResult};
use crate::evaluator::is_valid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sampling and root-finding tolerances. Every field is optional on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingOptions {
    /// Largest |y| still treated as finite.
    pub abs_limit: f64,
    /// Recursion cap for refinement and boundary bisection.
    pub max_depth: usize,
    /// Finest x resolution; `None` means domain width / 500000.
    pub min_step: Option<f64>,
    pub abs_eps: f64,
    pub rel_eps: f64,
    /// Coarse scan count for root finding.
    pub segments: usize,
    pub intersection_eps: f64,
    pub intersection_max_iter: usize,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            abs_limit: 1e5,
            max_depth: 16,
            min_step: None,
            abs_eps: 1e-3,
            rel_eps: 1e-2,
            segments: 400,
            intersection_eps: 1e-8,
            intersection_max_iter: 60,
        }
    }
}

const MIN_STEP_DIVISOR: f64 = 500_000.0;

/// Upper bound on `initialPoints`, for both cartesian and parametric curves.
pub const MAX_INITIAL_POINTS: usize = 1_000_000;
/// Upper bound on `segments`.
pub const MAX_SEGMENTS: usize = 1_000_000;
/// Upper bound on `maxDepth`.
pub const MAX_DEPTH: usize = 64;
/// Upper bound on `intersectionMaxIter`.
pub const MAX_INTERSECTION_ITER: usize = 1_000;

impl SamplingOptions {
    pub fn validate(&self) -> EngineResult<()> {
        let positive = [
            ("absLimit", self.abs_limit),
            ("absEps", self.abs_eps),
            ("relEps", self.rel_eps),
            ("intersectionEps", self.intersection_eps),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::Bounds(format!(
                    "{name} must be a positive finite number (got {value})."
                )));
            }
        }
        if let Some(step) = self.min_step {
            if !(step.is_finite() && step > 0.0) {
                return Err(EngineError::Bounds(format!(
                    "minStep must be a positive finite number (got {step})."
                )));
            }
        }
        let counts = [
            ("segments", self.segments, 1, MAX_SEGMENTS),
            ("maxDepth", self.max_depth, 0, MAX_DEPTH),
            ("intersectionMaxIter", self.intersection_max_iter, 0, MAX_INTERSECTION_ITER),
        ];
        for (name, value, min, max) in counts {
            if !(min..=max).contains(&value) {
                return Err(EngineError::Bounds(format!(
                    "{name} must be between {min} and {max} (got {value})."
                )));
            }
        }
        Ok(())
    }

    pub fn min_step_for(&self, width: f64) -> f64 {
        self.min_step.unwrap_or(width.abs() / MIN_STEP_DIVISOR)
    }

    pub fn resolution_for(&self, width: f64) -> Resolution {
        Resolution {
            min_step: self.min_step_for(width),
            max_depth: self.max_depth,
        }
    }
}

/// The y half of a sample: a value, or a marker for a drawn break.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    Value(f64),
    Gap,
}

impl Sample {
    pub fn value(self) -> Option<f64> {
        match self {
            Sample::Value(y) => Some(y),
            Sample::Gap => None,
        }
    }

    pub fn is_gap(self) -> bool {
        matches!(self, Sample::Gap)
    }
}

impl From<Option<f64>> for Sample {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Sample::Gap, Sample::Value)
    }
}

// Gaps travel as `null` so the renderer breaks the line there.
impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Sample::Value(y) => serializer.serialize_some(y),
            Sample::Gap => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Sample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<f64>::deserialize(deserializer).map(Sample::from)
    }
}

/// Parallel x/y arrays with x non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    pub x: Vec<f64>,
    pub y: Vec<Sample>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn gap_count(&self) -> usize {
        self.y.iter().filter(|s| s.is_gap()).count()
    }
}

impl FromIterator<(f64, Sample)> for SampleSet {
    fn from_iter<I: IntoIterator<Item = (f64, Sample)>>(iter: I) -> Self {
        let (x, y) = iter.into_iter().unzip();
        Self { x, y }
    }
}

/// Recursive refinement over one function. Holds no state between calls.
pub struct AdaptiveSampler<F> {
    f: F,
    abs_limit: f64,
    abs_eps: f64,
    rel_eps: f64,
    resolution: Resolution,
}

impl<F> AdaptiveSampler<F>
where
    F: Fn(f64) -> Option<f64>,
{
    pub fn new(f: F, options: &SamplingOptions, domain_width: f64) -> Self {
        Self {
            f,
            abs_limit: options.abs_limit,
            abs_eps: options.abs_eps,
            rel_eps: options.rel_eps,
            resolution: options.resolution_for(domain_width),
        }
    }

    /// `f(x)` if the validity oracle accepts it.
    pub fn probe(&self, x: f64) -> Option<f64> {
        (self.f)(x).filter(|y| is_valid(*y, self.abs_limit))
    }

    /// Samples `[x1, x2]` given valid endpoint values, returning an ordered
    /// sequence that starts at `x1` and ends at `x2`.
    pub fn sample_adaptively(&self, x1: f64, x2: f64, y1: f64, y2: f64, depth: usize) -> Vec<(f64, Sample)> {
        let mut out = vec![(x1, Sample::Value(y1))];
        self.refine(x1, y1, x2, y2, depth, &mut out);
        out
    }

    /// Appends samples for `(x1, x2]`; the caller has already emitted `x1`.
    fn refine(&self, x1: f64, y1: f64, x2: f64, y2: f64, depth: usize, out: &mut Vec<(f64, Sample)>) {
        let x_mid = 0.5 * (x1 + x2);
        let at_limit = depth >= self.resolution.max_depth || (x2 - x1) <= self.resolution.min_step;

        let Some(y_mid) = self.probe(x_mid) else {
            if at_limit {
                out.push((x_mid, Sample::Gap));
                out.push((x2, Sample::Value(y2)));
                return;
            }
            let probe = |x| self.probe(x);
            let locator = BoundaryLocator::new(&probe, self.resolution);
            let left = locator.find_last_finite_before(x1, x_mid, y1);
            let right = locator.find_first_finite_after(x_mid, x2, y2);

            if left.x > x1 {
                self.refine(x1, y1, left.x, left.y, depth + 1, out);
            }
            out.push((0.5 * (left.x + right.x), Sample::Gap));
            out.push((right.x, Sample::Value(right.y)));
            if right.x < x2 {
                self.refine(right.x, right.y, x2, y2, depth + 1, out);
            }
            return;
        };

        let error = (y_mid - 0.5 * (y1 + y2)).abs();
        let relative = error / ((y2 - y1).abs() + 1e-12);
        if at_limit || (error <= self.abs_eps && relative <= self.rel_eps) {
            out.push((x2, Sample::Value(y2)));
            return;
        }

        self.refine(x1, y1, x_mid, y_mid, depth + 1, out);
        self.refine(x_mid, y_mid, x2, y2, depth + 1, out);
    }

    /// Samples `[x_min, x_max]` over `cells` coarse cells.
    pub fn sample_range(&self, x_min: f64, x_max: f64, cells: usize) -> SampleSet {
        let cells = cells.max(1);
        let dx = (x_max - x_min) / cells as f64;
        let probe = |x| self.probe(x);
        let locator = BoundaryLocator::new(&probe, self.resolution);

        let mut out = Vec::with_capacity(cells.min(MAX_INITIAL_POINTS).saturating_mul(2) + 1);
        let mut prev_x = x_min;
        let mut prev = self.probe(x_min);
        out.push((x_min, Sample::from(prev)));

        for i in 1..=cells {
            let x = if i == cells { x_max } else { x_min + dx * i as f64 };
            let current = self.probe(x);
            match (prev, current) {
                (Some(y0), Some(y1)) => self.refine(prev_x, y0, x, y1, 0, &mut out),
                (Some(y0), None) => {
                    let edge = locator.find_last_finite_before(prev_x, x, y0);
                    if edge.x > prev_x {
                        self.refine(prev_x, y0, edge.x, edge.y, 0, &mut out);
                    }
                    out.push((x, Sample::Gap));
                }
                (None, Some(y1)) => {
                    let edge = locator.find_first_finite_after(prev_x, x, y1);
                    out.push((edge.x, Sample::Value(edge.y)));
                    if edge.x < x {
                        self.refine(edge.x, edge.y, x, y1, 0, &mut out);
                    }
                }
                (None, None) => push_gap(&mut out, x),
            }
            prev_x = x;
            prev = current;
        }

        self.pin_trailing_edge(&mut out, x_max);
        out.into_iter().collect()
    }

    /// Makes the last sample sit exactly on `x_max`. Stored values have all
    /// passed `probe`, so an edge beyond `absLimit` is already a gap.
    fn pin_trailing_edge(&self, out: &mut Vec<(f64, Sample)>, x_max: f64) {
        match out.last() {
            Some((x, _)) if *x == x_max => {}
            _ => out.push((x_max, Sample::from(self.probe(x_max)))),
        }
    }
}

/// Runs of invalid cells collapse to a leading and a trailing gap.
fn push_gap(out: &mut Vec<(f64, Sample)>, x: f64) {
    let n = out.len();
    if n >= 2 && out[n - 1].1.is_gap() && out[n - 2].1.is_gap() {
        out[n - 1].0 = x;
    } else {
        out.push((x, Sample::Gap));
    }
}

fn check_initial_points(count: usize) -> EngineResult<()> {
    if !(1..=MAX_INITIAL_POINTS).contains(&count) {
        return Err(EngineError::Bounds(format!(
            "initialPoints must be between 1 and {MAX_INITIAL_POINTS} (got {count})."
        )));
    }
    Ok(())
}

/// Samples `f` over `[x_min, x_max]`. Pure in its inputs.
pub fn generate_samples<F>(
    f: F,
    x_min: f64,
    x_max: f64,
    initial_points: usize,
    options: &SamplingOptions,
) -> EngineResult<SampleSet>
where
    F: Fn(f64) -> Option<f64>,
{
    check_interval("x", x_min, x_max)?;
    options.validate()?;
    check_initial_points(initial_points)?;
    let sampler = AdaptiveSampler::new(f, options, x_max - x_min);
    Ok(sampler.sample_range(x_min, x_max, initial_points))
}

/// Parallel coordinate arrays for a parametric curve. A gap blanks both
/// coordinates of the same sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveSamples {
    pub x: Vec<Sample>,
    pub y: Vec<Sample>,
}

impl CurveSamples {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Samples `(fx(t), fy(t))` on a uniform grid of `cells` intervals over
/// `[t_min, t_max]`. Consecutive undefined points collapse into one gap.
pub fn sample_parametric<FX, FY>(
    fx: FX,
    fy: FY,
    t_min: f64,
    t_max: f64,
    cells: usize,
    options: &SamplingOptions,
) -> EngineResult<CurveSamples>
where
    FX: Fn(f64) -> Option<f64>,
    FY: Fn(f64) -> Option<f64>,
{
    check_interval("t", t_min, t_max)?;
    options.validate()?;
    check_initial_points(cells)?;
    let valid = |v: &f64| is_valid(*v, options.abs_limit);
    let dt = (t_max - t_min) / cells as f64;
    let mut out = CurveSamples::default();
    for i in 0..=cells {
        let t = if i == cells { t_max } else { t_min + dt * i as f64 };
        match fx(t).filter(valid).zip(fy(t).filter(valid)) {
            Some((x, y)) => {
                out.x.push(Sample::Value(x));
                out.y.push(Sample::Value(y));
            }
            None if out.y.last().is_some_and(|s| s.is_gap()) => {}
            None => {
                out.x.push(Sample::Gap);
                out.y.push(Sample::Gap);
            }
        }
    }
    Ok(out)
}
