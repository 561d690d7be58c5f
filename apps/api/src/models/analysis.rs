use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A stored fit analysis. `report` holds the full structured AI output;
/// the scalar columns exist so history listings avoid decoding it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cv_filename: String,
    pub cv_text: String,
    pub jd_text: String,
    pub job_title: String,
    pub company_name: String,
    pub overall_score: i32,
    pub verdict: String,
    pub summary: String,
    pub report: Value,
    pub created_at: DateTime<Utc>,
}

/// Slim projection for paged history listings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisSummaryRow {
    pub id: Uuid,
    pub cv_filename: String,
    pub job_title: String,
    pub company_name: String,
    pub overall_score: i32,
    pub created_at: DateTime<Utc>,
}
