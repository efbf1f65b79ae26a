//! Scan-and-bisect root isolation, reused for zeros, extrema and curve
//! intersections.
//!
//! Roots closer together than half a scan interval are merged into the first
//! one found. Two genuine roots inside that radius lose the second one; this
//! is accepted in exchange for never reporting the same crossing twice.

use crate::evaluator::is_valid;
use crate::sampling::SamplingOptions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointKind {
    Zero,
    Maximum,
    Minimum,
    Intersection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<PointKind>,
}

/// Search window for [`find_intersections`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Window {
    fn contains(&self, x: f64, y: f64) -> bool {
        (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }
}

/// Finds points where `f1(x) = f2(x)` inside `window`.
///
/// The reported y is `f1` at the root. Points whose y falls outside the window
/// are dropped.
pub fn find_intersections<F1, F2>(
    f1: F1,
    f2: F2,
    window: &Window,
    options: &SamplingOptions,
) -> Vec<Point2D>
where
    F1: Fn(f64) -> Option<f64>,
    F2: Fn(f64) -> Option<f64>,
{
    let valid = |y: f64| is_valid(y, options.abs_limit);
    let diff = |x: f64| {
        let a = f1(x).filter(|y| valid(*y))?;
        let b = f2(x).filter(|y| valid(*y))?;
        Some(a - b)
    };

    let segments = options.segments.max(1);
    let step = (window.x_max - window.x_min) / segments as f64;
    let radius = 0.5 * step;

    let mut roots: Vec<Point2D> = Vec::new();
    let mut xa = window.x_min;
    let mut fa = diff(xa);
    for i in 1..=segments {
        let xb = if i == segments {
            window.x_max
        } else {
            window.x_min + step * i as f64
        };
        let fb = diff(xb);
        if let (Some(va), Some(vb)) = (fa, fb) {
            if va * vb <= 0.0 {
                let root = bisect(&diff, xa, xb, va, vb, options);
                let accepted = f1(root)
                    .filter(|y| valid(*y) && window.contains(root, *y))
                    .filter(|_| roots.iter().all(|p| (p.x - root).abs() >= radius));
                if let Some(y) = accepted {
                    roots.push(Point2D { x: root, y, kind: None });
                }
            }
        }
        xa = xb;
        fa = fb;
    }
    roots
}

/// Shrinks `[lo, hi]` around a sign change. Stops at `intersection_eps`
/// width, after `intersection_max_iter` halvings, or when the difference
/// becomes undefined inside the bracket.
fn bisect(
    diff: &impl Fn(f64) -> Option<f64>,
    lo: f64,
    hi: f64,
    f_lo: f64,
    f_hi: f64,
    options: &SamplingOptions,
) -> f64 {
    if f_lo == 0.0 {
        return lo;
    }
    if f_hi == 0.0 {
        return hi;
    }
    let (mut lo, mut hi, mut f_lo) = (lo, hi, f_lo);
    for _ in 0..options.intersection_max_iter {
        if hi - lo <= options.intersection_eps {
            break;
        }
        let mid = 0.5 * (lo + hi);
        let Some(f_mid) = diff(mid) else {
            break;
        };
        if f_mid == 0.0 {
            return mid;
        }
        if f_lo * f_mid < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }
    0.5 * (lo + hi)
}

/// Zeros of `f` inside `window`.
pub fn find_zeros<F>(f: F, window: &Window, options: &SamplingOptions) -> Vec<Point2D>
where
    F: Fn(f64) -> Option<f64>,
{
    find_intersections(f, |_| Some(0.0), window, options)
        .into_iter()
        .map(|p| Point2D {
            kind: Some(PointKind::Zero),
            ..p
        })
        .collect()
}

/// Local extrema of `f`, located as zeros of `slope` and classified by
/// comparing `f` half a scan interval either side. Critical points that are
/// neither a maximum nor a minimum are dropped, and so are flat stretches: an
/// extremum must be strictly above (or below) at least one neighbour.
pub fn find_extrema<F, D>(f: F, slope: D, window: &Window, options: &SamplingOptions) -> Vec<Point2D>
where
    F: Fn(f64) -> Option<f64>,
    D: Fn(f64) -> Option<f64>,
{
    let valid = |y: f64| is_valid(y, options.abs_limit);
    let probe = |x: f64| f(x).filter(|y| valid(*y));
    let critical = find_intersections(&slope, |_| Some(0.0), &Window {
        y_min: f64::NEG_INFINITY,
        y_max: f64::INFINITY,
        ..*window
    }, options);

    let offset = 0.5 * (window.x_max - window.x_min) / options.segments.max(1) as f64;
    critical
        .into_iter()
        .filter_map(|p| {
            let y = probe(p.x)?;
            if !window.contains(p.x, y) {
                return None;
            }
            let left = probe(p.x - offset)?;
            let right = probe(p.x + offset)?;
            let kind = if y >= left && y >= right && (y > left || y > right) {
                PointKind::Maximum
            } else if y <= left && y <= right && (y < left || y < right) {
                PointKind::Minimum
            } else {
                return None;
            };
            Some(Point2D {
                x: p.x,
                y,
                kind: Some(kind),
            })
        })
        .collect()
}
