//! Wire types for the request/response messages exchanged with the worker.
//!
//! Every message is a JSON object carrying a `type` discriminator. Requests of
//! kind `compute` and `computeIntegral` additionally carry a `mode`.

use crate::error::{EngineError, EngineResult};
use crate::expression::Scope;
use crate::roots::Point2D;
use crate::sampling::{CurveSamples, Sample, SampleSet, SamplingOptions};
use crate::surface::{Range, SurfaceGrid};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_INITIAL_POINTS: usize = 1000;
pub const DEFAULT_RESOLUTION: usize = 50;

fn default_initial_points() -> usize {
    DEFAULT_INITIAL_POINTS
}

fn default_resolution() -> usize {
    DEFAULT_RESOLUTION
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartesianRequest {
    pub expression: String,
    #[serde(default)]
    pub expression2: Option<String>,
    pub x_min: f64,
    pub x_max: f64,
    #[serde(default)]
    pub y_min: Option<f64>,
    #[serde(default)]
    pub y_max: Option<f64>,
    #[serde(default = "default_initial_points")]
    pub initial_points: usize,
    #[serde(default)]
    pub options: SamplingOptions,
    #[serde(default)]
    pub calculate_zeros: bool,
    #[serde(default)]
    pub calculate_extrema: bool,
    #[serde(default)]
    pub calculate_intersections: bool,
    #[serde(default)]
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParametricRequest {
    pub x_expr: String,
    pub y_expr: String,
    pub t_min: f64,
    pub t_max: f64,
    #[serde(default = "default_initial_points")]
    pub initial_points: usize,
    #[serde(default)]
    pub options: SamplingOptions,
    #[serde(default)]
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolarRequest {
    pub r_expr: String,
    pub t_min: f64,
    pub t_max: f64,
    #[serde(default = "default_initial_points")]
    pub initial_points: usize,
    #[serde(default)]
    pub options: SamplingOptions,
    #[serde(default)]
    pub scope: Scope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceRequest {
    pub expr: String,
    pub x_range: Range,
    pub y_range: Range,
    #[serde(default = "default_resolution")]
    pub resolution: usize,
    #[serde(default)]
    pub scope: Scope,
}

/// A `compute` request, tagged by `mode`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode")]
pub enum ComputeRequest {
    #[serde(rename = "cartesian")]
    Cartesian(CartesianRequest),
    #[serde(rename = "parametric")]
    Parametric(ParametricRequest),
    #[serde(rename = "polar")]
    Polar(PolarRequest),
    #[serde(rename = "3d")]
    Surface(SurfaceRequest),
}

/// A `computeIntegral` request, tagged by `mode`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode")]
pub enum IntegralRequest {
    #[serde(rename = "cartesian", rename_all = "camelCase")]
    Cartesian {
        expression: String,
        a: f64,
        b: f64,
        #[serde(default)]
        steps: Option<usize>,
        #[serde(default)]
        scope: Scope,
    },
    #[serde(rename = "parametric", rename_all = "camelCase")]
    Parametric {
        x_expr: String,
        y_expr: String,
        a: f64,
        b: f64,
        #[serde(default)]
        scope: Scope,
    },
    #[serde(rename = "polar", rename_all = "camelCase")]
    Polar {
        r_expr: String,
        a: f64,
        b: f64,
        #[serde(default)]
        scope: Scope,
    },
    #[serde(rename = "3d", rename_all = "camelCase")]
    Surface {
        expr: String,
        x_range: Range,
        y_range: Range,
        #[serde(default)]
        scope: Scope,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Compute(ComputeRequest),
    ComputeIntegral(IntegralRequest),
}

impl Request {
    /// Decodes a raw message. Returns `None` for messages whose `type` is not
    /// a known request kind; those get no response at all.
    pub fn from_message(message: &Value) -> Option<EngineResult<Request>> {
        let kind = message.get("type")?.as_str()?;
        let decoded = match kind {
            "compute" => ComputeRequest::deserialize(message).map(Request::Compute),
            "computeIntegral" => {
                IntegralRequest::deserialize(message).map(Request::ComputeIntegral)
            }
            _ => return None,
        };
        Some(decoded.map_err(|err| EngineError::InvalidRequest(err.to_string())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartesianPlot {
    pub samples1: SampleSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples2: Option<SampleSet>,
    pub intersections: Vec<Point2D>,
    pub zeros: Vec<Point2D>,
    pub extrema: Vec<Point2D>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParametricPlot {
    pub samples1: CurveSamples,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolarSamples {
    pub r: Vec<Sample>,
    pub theta: Vec<f64>,
    pub polar: bool,
}

impl From<SampleSet> for PolarSamples {
    fn from(set: SampleSet) -> Self {
        Self {
            r: set.y,
            theta: set.x,
            polar: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolarPlot {
    pub samples1: PolarSamples,
}

/// Payload of a `result` response, tagged by `mode`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode")]
pub enum PlotResult {
    #[serde(rename = "cartesian")]
    Cartesian(CartesianPlot),
    #[serde(rename = "parametric")]
    Parametric(ParametricPlot),
    #[serde(rename = "polar")]
    Polar(PolarPlot),
    #[serde(rename = "3d")]
    Surface(SurfaceGrid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegralMode {
    #[serde(rename = "cartesian")]
    Cartesian,
    #[serde(rename = "parametric")]
    Parametric,
    #[serde(rename = "polar")]
    Polar,
    #[serde(rename = "3d")]
    Surface,
}

/// Integral value plus the inputs it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegralResult {
    pub value: f64,
    pub mode: IntegralMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_range: Option<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_range: Option<Range>,
}

impl IntegralResult {
    pub fn new(mode: IntegralMode, value: f64) -> Self {
        Self {
            value,
            mode,
            a: None,
            b: None,
            expression: None,
            x_expr: None,
            y_expr: None,
            r_expr: None,
            expr: None,
            x_range: None,
            y_range: None,
        }
    }

    pub fn with_bounds(self, a: f64, b: f64) -> Self {
        Self {
            a: Some(a),
            b: Some(b),
            ..self
        }
    }
}

/// Exactly one of these is produced per known request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    Result(PlotResult),
    IntegralResult(IntegralResult),
    Error { message: String },
}

impl From<EngineError> for Response {
    fn from(err: EngineError) -> Self {
        Response::Error {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cartesian_request_fills_defaults() {
        let message = json!({
            "type": "compute",
            "mode": "cartesian",
            "expression": "sin(x)",
            "xMin": -1,
            "xMax": 1,
        });
        let request = Request::from_message(&message)
            .expect("known kind")
            .expect("valid request");
        let cartesian = match request {
            Request::Compute(ComputeRequest::Cartesian(cartesian)) => cartesian,
            other => panic!("expected a cartesian compute request, got {other:?}"),
        };
        assert_eq!(cartesian.initial_points, DEFAULT_INITIAL_POINTS);
        assert_eq!(cartesian.options, SamplingOptions::default());
        assert_eq!(cartesian.expression2, None);
        assert!(!cartesian.calculate_zeros);
        assert!(cartesian.scope.is_empty());
    }

    #[test]
    fn integral_request_decodes_each_mode() {
        let message = json!({
            "type": "computeIntegral",
            "mode": "3d",
            "expr": "x*y",
            "xRange": {"min": 0, "max": 1},
            "yRange": {"min": 0, "max": 2},
            "scope": {"k": 2}
        });
        let request = Request::from_message(&message)
            .expect("known kind")
            .expect("valid request");
        assert!(matches!(
            request,
            Request::ComputeIntegral(IntegralRequest::Surface { ref expr, .. }) if expr == "x*y"
        ));

        let message = json!({
            "type": "computeIntegral",
            "mode": "parametric",
            "xExpr": "cos(t)",
            "yExpr": "sin(t)",
            "a": 0,
            "b": 1
        });
        assert!(matches!(
            Request::from_message(&message),
            Some(Ok(Request::ComputeIntegral(IntegralRequest::Parametric { .. })))
        ));
    }

    #[test]
    fn unknown_kinds_are_ignored_and_bad_payloads_rejected() {
        assert!(Request::from_message(&json!({"type": "ping"})).is_none());
        assert!(Request::from_message(&json!({"mode": "cartesian"})).is_none());

        let missing_bounds = json!({"type": "compute", "mode": "cartesian", "expression": "x"});
        assert!(matches!(
            Request::from_message(&missing_bounds),
            Some(Err(EngineError::InvalidRequest(_)))
        ));
        let unknown_mode = json!({"type": "compute", "mode": "4d"});
        assert!(matches!(
            Request::from_message(&unknown_mode),
            Some(Err(EngineError::InvalidRequest(_)))
        ));
    }

    #[test]
    fn responses_are_tagged_by_type_and_mode() {
        let response = Response::Result(PlotResult::Polar(PolarPlot {
            samples1: SampleSet {
                x: vec![0.0, 1.0],
                y: vec![Sample::Value(2.0), Sample::Gap],
            }
            .into(),
        }));
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "result",
                "mode": "polar",
                "samples1": {"r": [2.0, null], "theta": [0.0, 1.0], "polar": true}
            })
        );

        let integral = Response::IntegralResult(IntegralResult {
            expression: Some("x".to_string()),
            ..IntegralResult::new(IntegralMode::Cartesian, 0.5).with_bounds(0.0, 1.0)
        });
        assert_eq!(
            serde_json::to_value(&integral).expect("serialize"),
            json!({
                "type": "integralResult",
                "value": 0.5,
                "mode": "cartesian",
                "a": 0.0,
                "b": 1.0,
                "expression": "x"
            })
        );

        let error: Response = EngineError::Bounds("bad".to_string()).into();
        assert_eq!(
            serde_json::to_value(&error).expect("serialize"),
            json!({"type": "error", "message": "bad"})
        );
    }
}
