//! Bisection that pins the transition between a valid and an invalid region.
//!
//! Both searches stop on a width or iteration cap rather than on exact
//! convergence, and only ever report points the validity oracle accepted.

use tracing::trace;

/// Caps shared by the boundary searches and the adaptive sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub min_step: f64,
    pub max_depth: usize,
}

/// The valid point closest to a valid/invalid transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryPoint {
    pub x: f64,
    pub y: f64,
    /// The iteration cap ran out before the bracket shrank to `min_step`.
    pub exhausted: bool,
}

/// `probe` must return `Some` only for values the validity oracle accepts.
pub struct BoundaryLocator<'p, P> {
    probe: &'p P,
    resolution: Resolution,
}

impl<'p, P> BoundaryLocator<'p, P>
where
    P: Fn(f64) -> Option<f64>,
{
    pub fn new(probe: &'p P, resolution: Resolution) -> Self {
        Self { probe, resolution }
    }

    /// Walks right from a valid `x_valid` toward an invalid `x_invalid`,
    /// returning the rightmost confirmed-valid point.
    pub fn find_last_finite_before(&self, x_valid: f64, x_invalid: f64, y_valid: f64) -> BoundaryPoint {
        let (mut valid, mut invalid, mut y) = (x_valid, x_invalid, y_valid);
        let mut iterations = 0;
        while iterations < self.resolution.max_depth && (invalid - valid).abs() > self.resolution.min_step {
            let mid = 0.5 * (valid + invalid);
            match (self.probe)(mid) {
                Some(value) => {
                    valid = mid;
                    y = value;
                }
                None => invalid = mid,
            }
            iterations += 1;
        }
        let exhausted = (invalid - valid).abs() > self.resolution.min_step;
        trace!(x = valid, iterations, exhausted, "pinned left boundary");
        BoundaryPoint { x: valid, y, exhausted }
    }

    /// Walks left from a valid `x_valid` toward an invalid `x_invalid`,
    /// returning the leftmost confirmed-valid point.
    pub fn find_first_finite_after(&self, x_invalid: f64, x_valid: f64, y_valid: f64) -> BoundaryPoint {
        let (mut invalid, mut valid, mut y) = (x_invalid, x_valid, y_valid);
        let mut iterations = 0;
        while iterations < self.resolution.max_depth && (valid - invalid).abs() > self.resolution.min_step {
            let mid = 0.5 * (invalid + valid);
            match (self.probe)(mid) {
                Some(value) => {
                    valid = mid;
                    y = value;
                }
                None => invalid = mid,
            }
            iterations += 1;
        }
        let exhausted = (valid - invalid).abs() > self.resolution.min_step;
        trace!(x = valid, iterations, exhausted, "pinned right boundary");
        BoundaryPoint { x: valid, y, exhausted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::is_valid;

    fn sqrt_probe(x: f64) -> Option<f64> {
        Some(x.sqrt()).filter(|y| is_valid(*y, 1e5))
    }

    #[test]
    fn first_finite_after_approaches_domain_edge() {
        let resolution = Resolution {
            min_step: 1e-6,
            max_depth: 40,
        };
        let locator = BoundaryLocator::new(&sqrt_probe, resolution);
        let point = locator.find_first_finite_after(-1.0, 1.0, 1.0);

        assert!(!point.exhausted);
        assert!(point.x >= 0.0 && point.x < 1e-5, "got {}", point.x);
        assert!(is_valid(point.y, 1e5));
    }

    #[test]
    fn last_finite_before_stays_on_valid_side() {
        let probe = |x: f64| Some(1.0 / (1.0 - x)).filter(|y| is_valid(*y, 1e5));
        let resolution = Resolution {
            min_step: 1e-9,
            max_depth: 60,
        };
        let locator = BoundaryLocator::new(&probe, resolution);
        let point = locator.find_last_finite_before(0.0, 1.0, 1.0);

        assert!(point.x < 1.0);
        assert!(1.0 - point.x < 1e-4, "got {}", point.x);
        assert_eq!(probe(point.x), Some(point.y));
    }

    #[test]
    fn iteration_cap_is_reported() {
        let resolution = Resolution {
            min_step: 1e-12,
            max_depth: 3,
        };
        let locator = BoundaryLocator::new(&sqrt_probe, resolution);
        let point = locator.find_first_finite_after(-1.0, 1.0, 1.0);

        assert!(point.exhausted);
        // Even when capped, the returned point is one the oracle accepted.
        assert!(sqrt_probe(point.x).is_some());
    }
}
