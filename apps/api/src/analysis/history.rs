//! Stored-analysis history: paged listing, single fetch, delete.
//! Always scoped to the authenticated user.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::analysis::{AnalysisRow, AnalysisSummaryRow};
use crate::state::AppState;

const PAGE_SIZE: i64 = 10;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub id: Option<Uuid>,
    pub page: Option<i64>,
}

/// GET /api/v1/history — `?id=` fetches one analysis in full,
/// otherwise a paged summary listing, newest first.
pub async fn handle_get_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    if let Some(id) = params.id {
        let analysis: Option<AnalysisRow> =
            sqlx::query_as("SELECT * FROM analyses WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&state.db)
                .await?;
        let analysis =
            analysis.ok_or_else(|| AppError::NotFound(format!("Analysis {id} not found")))?;
        return Ok(Json(json!({ "analysis": analysis })));
    }

    let page = params.page.unwrap_or(1).max(1);
    let offset = (page - 1) * PAGE_SIZE;

    let analyses: Vec<AnalysisSummaryRow> = sqlx::query_as(
        r#"
        SELECT id, cv_filename, job_title, company_name, overall_score, created_at
        FROM analyses
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(PAGE_SIZE)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM analyses WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(json!({
        "analyses": analyses,
        "total": total,
        "page": page,
        "limit": PAGE_SIZE,
    })))
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub id: Uuid,
}

/// DELETE /api/v1/history?id=
pub async fn handle_delete_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<DeleteQuery>,
) -> Result<Json<Value>, AppError> {
    sqlx::query("DELETE FROM analyses WHERE id = $1 AND user_id = $2")
        .bind(params.id)
        .bind(user_id)
        .execute(&state.db)
        .await?;
    Ok(Json(json!({ "success": true })))
}
