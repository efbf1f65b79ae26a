//! Request dispatcher: decodes a message, compiles its expressions and routes
//! them into the samplers, root finder and quadrature engine.

use crate::equation_engine::BytecodeCompiler;
use crate::error::{check_interval, EngineError, EngineResult};
use crate::evaluator::{difference_step, scalar_fn, slope_fn, surface_fn};
use crate::expression::ExpressionCompiler;
use crate::protocol::{
    CartesianPlot, CartesianRequest, ComputeRequest, IntegralMode, IntegralRequest,
    IntegralResult, ParametricPlot, ParametricRequest, PlotResult, PolarPlot, PolarRequest,
    Request, Response, SurfaceRequest,
};
use crate::quadrature::{definite_integral, double_integral, parametric_area, polar_area, CARTESIAN_STEPS};
use crate::roots::{find_extrema, find_intersections, find_zeros, Point2D, PointKind, Window};
use crate::sampling::{generate_samples, sample_parametric, SampleSet};
use crate::surface::{generate_surface, SurfaceGrid};
use serde_json::Value;
use tracing::{debug, warn};

const CARTESIAN_VARS: &[&str] = &["x"];
const PARAMETRIC_VARS: &[&str] = &["t"];
const POLAR_VARS: &[&str] = &["t", "theta"];

/// Samples plus the analyses requested for one cartesian expression.
struct CurveAnalysis {
    samples: SampleSet,
    zeros: Vec<Point2D>,
    extrema: Vec<Point2D>,
}

/// Stateless between requests: every call compiles, computes and discards.
pub struct Dispatcher<C> {
    compiler: C,
}

impl Default for Dispatcher<BytecodeCompiler> {
    fn default() -> Self {
        Self::new(BytecodeCompiler)
    }
}

impl<C: ExpressionCompiler> Dispatcher<C> {
    pub fn new(compiler: C) -> Self {
        Self { compiler }
    }

    /// Handles one raw message. `None` means the message was not a request
    /// kind this engine answers.
    pub fn handle(&self, message: &Value) -> Option<Response> {
        let request = match Request::from_message(message)? {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "rejected malformed request");
                return Some(err.into());
            }
        };
        Some(self.dispatch(request))
    }

    pub fn dispatch(&self, request: Request) -> Response {
        debug!(?request, "dispatching request");
        let outcome = match request {
            Request::Compute(request) => self.compute(request).map(Response::Result),
            Request::ComputeIntegral(request) => {
                self.integrate(request).map(Response::IntegralResult)
            }
        };
        outcome.unwrap_or_else(|err| {
            warn!(%err, "request failed");
            err.into()
        })
    }

    fn compile(&self, text: &str) -> EngineResult<C::Output> {
        self.compiler
            .compile(text)
            .map_err(|reason| EngineError::Compilation {
                expression: text.to_string(),
                reason,
            })
    }

    fn compute(&self, request: ComputeRequest) -> EngineResult<PlotResult> {
        match request {
            ComputeRequest::Cartesian(request) => self.cartesian(&request).map(PlotResult::Cartesian),
            ComputeRequest::Parametric(request) => {
                self.parametric(&request).map(PlotResult::Parametric)
            }
            ComputeRequest::Polar(request) => self.polar(&request).map(PlotResult::Polar),
            ComputeRequest::Surface(request) => self.surface(&request).map(PlotResult::Surface),
        }
    }

    fn cartesian(&self, request: &CartesianRequest) -> EngineResult<CartesianPlot> {
        request.options.validate()?;
        check_interval("x", request.x_min, request.x_max)?;
        if let (Some(y_min), Some(y_max)) = (request.y_min, request.y_max) {
            check_interval("y", y_min, y_max)?;
        }

        let first = self.compile(&request.expression)?;
        let second = match request.expression2.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(self.compile(text)?),
            _ => None,
        };
        let window = Window {
            x_min: request.x_min,
            x_max: request.x_max,
            y_min: request.y_min.unwrap_or(f64::NEG_INFINITY),
            y_max: request.y_max.unwrap_or(f64::INFINITY),
        };

        let primary = self.analyse_curve(&first, request, &window)?;
        let secondary = second
            .as_ref()
            .map(|compiled| self.analyse_curve(compiled, request, &window))
            .transpose()?;

        let intersections = match &second {
            Some(second) if request.calculate_intersections => find_intersections(
                scalar_fn(&first, &request.scope, CARTESIAN_VARS),
                scalar_fn(second, &request.scope, CARTESIAN_VARS),
                &window,
                &request.options,
            )
            .into_iter()
            .map(|p| Point2D {
                kind: Some(PointKind::Intersection),
                ..p
            })
            .collect(),
            _ => Vec::new(),
        };

        let mut zeros = primary.zeros;
        let mut extrema = primary.extrema;
        let samples2 = secondary.map(|curve| {
            zeros.extend(curve.zeros);
            extrema.extend(curve.extrema);
            curve.samples
        });
        debug!(
            points = primary.samples.len(),
            gaps = primary.samples.gap_count(),
            zeros = zeros.len(),
            extrema = extrema.len(),
            intersections = intersections.len(),
            "computed cartesian plot"
        );
        Ok(CartesianPlot {
            samples1: primary.samples,
            samples2,
            intersections,
            zeros,
            extrema,
        })
    }

    fn analyse_curve(
        &self,
        compiled: &C::Output,
        request: &CartesianRequest,
        window: &Window,
    ) -> EngineResult<CurveAnalysis> {
        let options = &request.options;
        let f = scalar_fn(compiled, &request.scope, CARTESIAN_VARS);
        let samples = generate_samples(&f, request.x_min, request.x_max, request.initial_points, options)?;
        let zeros = if request.calculate_zeros {
            find_zeros(&f, window, options)
        } else {
            Vec::new()
        };
        let extrema = if request.calculate_extrema {
            let step = difference_step(request.x_min, request.x_max);
            let slope = slope_fn(compiled, &request.scope, CARTESIAN_VARS, step);
            find_extrema(&f, slope, window, options)
        } else {
            Vec::new()
        };
        Ok(CurveAnalysis {
            samples,
            zeros,
            extrema,
        })
    }

    fn parametric(&self, request: &ParametricRequest) -> EngineResult<ParametricPlot> {
        let fx = self.compile(&request.x_expr)?;
        let fy = self.compile(&request.y_expr)?;
        let samples1 = sample_parametric(
            scalar_fn(&fx, &request.scope, PARAMETRIC_VARS),
            scalar_fn(&fy, &request.scope, PARAMETRIC_VARS),
            request.t_min,
            request.t_max,
            request.initial_points,
            &request.options,
        )?;
        debug!(points = samples1.len(), "computed parametric plot");
        Ok(ParametricPlot { samples1 })
    }

    fn polar(&self, request: &PolarRequest) -> EngineResult<PolarPlot> {
        let r = self.compile(&request.r_expr)?;
        let samples = generate_samples(
            scalar_fn(&r, &request.scope, POLAR_VARS),
            request.t_min,
            request.t_max,
            request.initial_points,
            &request.options,
        )?;
        debug!(points = samples.len(), gaps = samples.gap_count(), "computed polar plot");
        Ok(PolarPlot {
            samples1: samples.into(),
        })
    }

    fn surface(&self, request: &SurfaceRequest) -> EngineResult<SurfaceGrid> {
        let z = self.compile(&request.expr)?;
        let grid = generate_surface(
            surface_fn(&z, &request.scope),
            request.x_range,
            request.y_range,
            request.resolution,
        )?;
        debug!(
            resolution = request.resolution,
            nulls = grid.null_count(),
            "computed surface"
        );
        Ok(grid)
    }

    fn integrate(&self, request: IntegralRequest) -> EngineResult<IntegralResult> {
        let result = match request {
            IntegralRequest::Cartesian {
                expression,
                a,
                b,
                steps,
                scope,
            } => {
                let f = self.compile(&expression)?;
                let value = definite_integral(
                    scalar_fn(&f, &scope, CARTESIAN_VARS),
                    a,
                    b,
                    steps.unwrap_or(CARTESIAN_STEPS),
                )?;
                IntegralResult {
                    expression: Some(expression),
                    ..IntegralResult::new(IntegralMode::Cartesian, value).with_bounds(a, b)
                }
            }
            IntegralRequest::Parametric {
                x_expr,
                y_expr,
                a,
                b,
                scope,
            } => {
                let fx = self.compile(&x_expr)?;
                let fy = self.compile(&y_expr)?;
                let value = parametric_area(
                    slope_fn(&fx, &scope, PARAMETRIC_VARS, difference_step(a, b)),
                    scalar_fn(&fy, &scope, PARAMETRIC_VARS),
                    a,
                    b,
                )?;
                IntegralResult {
                    x_expr: Some(x_expr),
                    y_expr: Some(y_expr),
                    ..IntegralResult::new(IntegralMode::Parametric, value).with_bounds(a, b)
                }
            }
            IntegralRequest::Polar { r_expr, a, b, scope } => {
                let r = self.compile(&r_expr)?;
                let value = polar_area(scalar_fn(&r, &scope, POLAR_VARS), a, b)?;
                IntegralResult {
                    r_expr: Some(r_expr),
                    ..IntegralResult::new(IntegralMode::Polar, value).with_bounds(a, b)
                }
            }
            IntegralRequest::Surface {
                expr,
                x_range,
                y_range,
                scope,
            } => {
                let z = self.compile(&expr)?;
                let value = double_integral(surface_fn(&z, &scope), x_range, y_range)?;
                IntegralResult {
                    expr: Some(expr),
                    x_range: Some(x_range),
                    y_range: Some(y_range),
                    ..IntegralResult::new(IntegralMode::Surface, value)
                }
            }
        };
        debug!(mode = ?result.mode, value = result.value, "computed integral");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::f64::consts::PI;

    fn respond(message: Value) -> Value {
        let response = Dispatcher::new(BytecodeCompiler)
            .handle(&message)
            .expect("known request kinds always get a response");
        serde_json::to_value(response).expect("responses serialize")
    }

    fn numbers(value: &Value) -> Vec<f64> {
        value
            .as_array()
            .expect("array")
            .iter()
            .filter_map(Value::as_f64)
            .collect()
    }

    #[test]
    fn cartesian_plot_with_every_analysis() {
        let response = respond(json!({
            "type": "compute",
            "mode": "cartesian",
            "expression": "sin(x)",
            "expression2": "cos(x)",
            "xMin": 0,
            "xMax": 7,
            "yMin": -2,
            "yMax": 2,
            "initialPoints": 200,
            "calculateZeros": true,
            "calculateExtrema": true,
            "calculateIntersections": true
        }));
        assert_eq!(response["type"], "result");
        assert_eq!(response["mode"], "cartesian");

        let xs = numbers(&response["samples1"]["x"]);
        assert_eq!(xs.last().copied(), Some(7.0));
        assert!(xs.windows(2).all(|w| w[0] <= w[1]));
        assert!(response["samples2"]["y"].is_array());

        let intersections = response["intersections"].as_array().expect("array");
        assert_eq!(intersections.len(), 2);
        for p in intersections {
            assert_eq!(p["type"], "intersection");
            let x = p["x"].as_f64().expect("x");
            assert!((x.sin() - x.cos()).abs() < 1e-6);
        }
        assert!((intersections[0]["x"].as_f64().expect("x") - PI / 4.0).abs() < 1e-6);

        let zeros = response["zeros"].as_array().expect("array");
        assert!(!zeros.is_empty());
        for p in zeros {
            assert_eq!(p["type"], "zero");
            let x = p["x"].as_f64().expect("x");
            assert!(x.sin().abs() < 1e-6 || x.cos().abs() < 1e-6, "{x} is not a zero");
        }

        let extrema = response["extrema"].as_array().expect("array");
        let peak = extrema
            .iter()
            .find(|p| (p["x"].as_f64().expect("x") - PI / 2.0).abs() < 1e-6)
            .expect("sin peaks at pi/2");
        assert_eq!(peak["type"], "maximum");
        assert!((peak["y"].as_f64().expect("y") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn analyses_are_empty_unless_requested() {
        let response = respond(json!({
            "type": "compute",
            "mode": "cartesian",
            "expression": "x^2 - 1",
            "xMin": -2,
            "xMax": 2,
        }));
        assert_eq!(response["zeros"], json!([]));
        assert_eq!(response["extrema"], json!([]));
        assert_eq!(response["intersections"], json!([]));
        assert!(response.get("samples2").is_none());
    }

    #[test]
    fn reciprocal_plot_breaks_at_the_pole() {
        let response = respond(json!({
            "type": "compute",
            "mode": "cartesian",
            "expression": "1/x",
            "xMin": -1,
            "xMax": 1,
            "initialPoints": 100
        }));
        let xs = numbers(&response["samples1"]["x"]);
        let ys = response["samples1"]["y"].as_array().expect("array");
        assert!(xs
            .iter()
            .zip(ys)
            .any(|(x, y)| y.is_null() && x.abs() < 0.05));
        assert!(ys.iter().filter_map(Value::as_f64).all(|y| y.abs() <= 1e5));
    }

    #[test]
    fn scope_parameters_are_bound() {
        let response = respond(json!({
            "type": "computeIntegral",
            "mode": "cartesian",
            "expression": "a * x",
            "a": 0,
            "b": 1,
            "scope": {"a": 2}
        }));
        assert_eq!(response["type"], "integralResult");
        assert!((response["value"].as_f64().expect("value") - 1.0).abs() < 1e-9);
        assert_eq!(response["expression"], "a * x");
        assert_eq!(response["a"], 0.0);
        assert_eq!(response["b"], 1.0);
    }

    #[test]
    fn parametric_and_polar_plots() {
        let response = respond(json!({
            "type": "compute",
            "mode": "parametric",
            "xExpr": "cos(t)",
            "yExpr": "sin(t)",
            "tMin": 0,
            "tMax": 2.0 * PI,
            "initialPoints": 64
        }));
        assert_eq!(response["mode"], "parametric");
        assert_eq!(numbers(&response["samples1"]["x"]).len(), 65);

        let response = respond(json!({
            "type": "compute",
            "mode": "polar",
            "rExpr": "1 + 0*theta",
            "tMin": 0,
            "tMax": 2.0 * PI,
            "initialPoints": 32
        }));
        assert_eq!(response["mode"], "polar");
        assert_eq!(response["samples1"]["polar"], true);
        let radii = numbers(&response["samples1"]["r"]);
        assert!(!radii.is_empty());
        assert!(radii.iter().all(|r| *r == 1.0));
        assert_eq!(numbers(&response["samples1"]["theta"]).last().copied(), Some(2.0 * PI));
    }

    #[test]
    fn surface_plot_and_degenerate_surface() {
        let response = respond(json!({
            "type": "compute",
            "mode": "3d",
            "expr": "x^2 + y^2",
            "xRange": {"min": -5, "max": 5},
            "yRange": {"min": -5, "max": 5},
            "resolution": 20
        }));
        assert_eq!(response["mode"], "3d");
        let rows = response["z"].as_array().expect("rows");
        assert_eq!(rows.len(), 20);
        assert!(rows.iter().all(|row| numbers(row).len() == 20));

        let response = respond(json!({
            "type": "compute",
            "mode": "3d",
            "expr": "sqrt(-1 - x^2 - y^2)",
            "xRange": {"min": -1, "max": 1},
            "yRange": {"min": -1, "max": 1}
        }));
        assert_eq!(response["type"], "error");
    }

    #[test]
    fn integrals_in_every_mode() {
        let parametric = respond(json!({
            "type": "computeIntegral",
            "mode": "parametric",
            "xExpr": "cos(t)",
            "yExpr": "sin(t)",
            "a": 0,
            "b": 2.0 * PI
        }));
        assert!((parametric["value"].as_f64().expect("value") + PI).abs() < 1e-6);
        assert_eq!(parametric["xExpr"], "cos(t)");
        assert_eq!(parametric["yExpr"], "sin(t)");

        let polar = respond(json!({
            "type": "computeIntegral",
            "mode": "polar",
            "rExpr": "theta",
            "a": 0,
            "b": 1
        }));
        assert!((polar["value"].as_f64().expect("value") - 1.0 / 6.0).abs() < 1e-9);

        let double = respond(json!({
            "type": "computeIntegral",
            "mode": "3d",
            "expr": "x + y",
            "xRange": {"min": 0, "max": 1},
            "yRange": {"min": 0, "max": 1}
        }));
        assert!((double["value"].as_f64().expect("value") - 1.0).abs() < 1e-9);
        assert_eq!(double["mode"], "3d");
        assert_eq!(double["xRange"], json!({"min": 0.0, "max": 1.0}));
        assert!(double.get("a").is_none());
    }

    #[test]
    fn failures_surface_as_error_messages() {
        let compile = respond(json!({
            "type": "compute",
            "mode": "cartesian",
            "expression": "sin(",
            "xMin": 0,
            "xMax": 1
        }));
        assert_eq!(compile["type"], "error");
        assert!(compile["message"]
            .as_str()
            .expect("message")
            .contains("could not compile 'sin('"));

        let bounds = respond(json!({
            "type": "computeIntegral",
            "mode": "cartesian",
            "expression": "x",
            "a": 1,
            "b": 1
        }));
        assert_eq!(bounds["type"], "error");

        let undefined = respond(json!({
            "type": "computeIntegral",
            "mode": "polar",
            "rExpr": "sqrt(theta)",
            "a": -1,
            "b": 1
        }));
        assert_eq!(undefined["type"], "error");
    }

    #[test]
    fn misspelled_function_is_an_error_not_a_blank_plot() {
        let response = respond(json!({
            "type": "compute",
            "mode": "cartesian",
            "expression": "sinn(x)",
            "xMin": -1,
            "xMax": 1
        }));
        assert_eq!(response["type"], "error");
        assert!(response["message"].as_str().expect("message").contains("sinn"));
    }

    #[test]
    fn oversized_requests_are_rejected() {
        let requests = [
            json!({"type": "compute", "mode": "cartesian", "expression": "x", "xMin": 0, "xMax": 1, "initialPoints": u64::MAX}),
            json!({"type": "compute", "mode": "parametric", "xExpr": "t", "yExpr": "t", "tMin": 0, "tMax": 1, "initialPoints": u64::MAX}),
            json!({"type": "compute", "mode": "cartesian", "expression": "x", "xMin": 0, "xMax": 1, "options": {"segments": u64::MAX}, "calculateZeros": true}),
            json!({"type": "compute", "mode": "3d", "expr": "x + y", "xRange": {"min": 0, "max": 1}, "yRange": {"min": 0, "max": 1}, "resolution": 1_000_000}),
            json!({"type": "computeIntegral", "mode": "cartesian", "expression": "x", "a": 0, "b": 1, "steps": u64::MAX}),
        ];
        for request in requests {
            let response = respond(request.clone());
            assert_eq!(response["type"], "error", "{request}");
        }
    }

    #[test]
    fn constant_function_has_no_extrema() {
        let response = respond(json!({
            "type": "compute",
            "mode": "cartesian",
            "expression": "3",
            "xMin": -1,
            "xMax": 1,
            "calculateExtrema": true
        }));
        assert_eq!(response["type"], "result");
        assert_eq!(response["extrema"], json!([]));
    }

    #[test]
    fn unknown_kinds_get_no_response() {
        let dispatcher = Dispatcher::new(BytecodeCompiler);
        assert!(dispatcher.handle(&json!({"type": "progress"})).is_none());
        assert!(dispatcher.handle(&json!("compute")).is_none());
    }
}
