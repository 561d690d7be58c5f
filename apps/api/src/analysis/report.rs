//! The structured fit report returned by the model, plus the
//! normalization applied before anything is stored: every score is
//! rounded and clamped to 0..=100, whatever the model sent back.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("model returned an unusable report: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecommendation {
    pub status: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutAnalysis {
    pub score: i32,
    pub feedback: String,
    #[serde(default)]
    pub tips: Vec<String>,
}

/// Full analysis output. The metric table and improvement list stay as
/// JSON — their shape is prompt-defined and only rendered, never
/// interpreted, downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub overall_score: i32,
    pub verdict: String,
    pub summary: String,
    pub job_title: String,
    pub company_name: String,
    pub app_recommendation: AppRecommendation,
    pub layout_analysis: LayoutAnalysis,
    #[serde(default)]
    pub metrics: Value,
    #[serde(default)]
    pub recommendation: Value,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub matched_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<Value>,
}

/// Builds a report from the model's decoded JSON, normalizing all
/// score fields first.
pub fn from_value(mut value: Value) -> Result<AnalysisReport, ReportError> {
    normalize_scores(&mut value);
    Ok(serde_json::from_value(value)?)
}

fn clamped(v: &Value) -> Value {
    let n = v.as_f64().unwrap_or(0.0).round() as i64;
    json!(n.clamp(0, 100))
}

fn normalize_scores(value: &mut Value) {
    if let Some(score) = value.get_mut("overall_score") {
        *score = clamped(score);
    }
    if let Some(score) = value
        .get_mut("layout_analysis")
        .and_then(|l| l.get_mut("score"))
    {
        *score = clamped(score);
    }
    if let Some(metrics) = value.get_mut("metrics").and_then(Value::as_object_mut) {
        for metric in metrics.values_mut() {
            if let Some(score) = metric.get_mut("score") {
                *score = clamped(score);
            }
        }
    }
    if let Some(improvements) = value.get_mut("improvements").and_then(Value::as_array_mut) {
        for improvement in improvements {
            if let Some(score) = improvement.get_mut("currentScore") {
                *score = clamped(score);
            }
        }
    }
}
