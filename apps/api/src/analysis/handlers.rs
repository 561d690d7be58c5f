use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::analysis::{extract, truncate_chars};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::quota::gate::Remaining;
use crate::state::AppState;

/// Stored-text caps; the full documents are not needed after analysis.
const MAX_STORED_CV_CHARS: usize = 10_000;
const MAX_STORED_JD_CHARS: usize = 5_000;

/// POST /api/v1/analyze
///
/// Multipart: `cv` (file) + `jd` (text). The quota gate runs before any
/// expensive work; if extraction or the AI call fails afterwards, the
/// consumed slot is NOT refunded — a failed analysis still costs one.
pub async fn handle_analyze(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let decision = state.quota.try_consume(user_id).await?;
    if !decision.allowed {
        let body = json!({
            "error": format!(
                "You have used all {} free analyses today. Upgrade to Pro to continue.",
                state.quota.daily_limit()
            ),
            "limitReached": true,
            "remainingToday": 0,
        });
        return Ok((StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response());
    }

    let (filename, data, jd_text) = read_upload(&mut multipart).await?;
    let jd_text = jd_text.trim().to_string();
    if jd_text.chars().count() < extract::MIN_JD_CHARS {
        return Err(AppError::Validation(format!(
            "Job description too short (minimum {} characters)",
            extract::MIN_JD_CHARS
        )));
    }
    extract::validate_upload(&filename, data.len())?;

    let cv_text = extract::extract_text(&data, &filename)?;
    if cv_text.chars().count() < extract::MIN_CV_CHARS {
        return Err(AppError::Validation(
            "Could not read enough text from the CV; please check the file".to_string(),
        ));
    }

    let report = state
        .llm
        .analyze_fit(&cv_text, &jd_text)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    let analysis_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO analyses
            (id, user_id, cv_filename, cv_text, jd_text, job_title, company_name,
             overall_score, verdict, summary, report, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
        "#,
    )
    .bind(analysis_id)
    .bind(user_id)
    .bind(&filename)
    .bind(truncate_chars(&cv_text, MAX_STORED_CV_CHARS))
    .bind(truncate_chars(&jd_text, MAX_STORED_JD_CHARS))
    .bind(&report.job_title)
    .bind(&report.company_name)
    .bind(report.overall_score)
    .bind(&report.verdict)
    .bind(&report.summary)
    .bind(serde_json::to_value(&report).unwrap_or(Value::Null))
    .execute(&state.db)
    .await?;

    let (remaining_today, is_pro) = match decision.remaining {
        Remaining::Unlimited => (None, true),
        Remaining::Limited(n) => (Some(n), false),
    };
    info!(%user_id, %analysis_id, score = report.overall_score, "analysis stored");

    Ok(Json(json!({
        "success": true,
        "analysisId": analysis_id,
        "remainingToday": remaining_today,
        "isPro": is_pro,
    }))
    .into_response())
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>, String), AppError> {
    let mut cv: Option<(String, Vec<u8>)> = None;
    let mut jd: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        match field.name() {
            Some("cv") => {
                let filename = field.file_name().unwrap_or("cv.pdf").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read CV upload: {e}")))?;
                cv = Some((filename, bytes.to_vec()));
            }
            Some("jd") => {
                let text = field.text().await.map_err(|e| {
                    AppError::Validation(format!("Could not read job description: {e}"))
                })?;
                jd = Some(text);
            }
            _ => {}
        }
    }

    let (filename, data) = cv.ok_or_else(|| AppError::Validation("Missing CV file".into()))?;
    let jd = jd.ok_or_else(|| AppError::Validation("Missing job description".into()))?;
    Ok((filename, data, jd))
}
