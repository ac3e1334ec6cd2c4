//! Endpoints the content player's SCORM API wrapper talks to.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::{
    auth::CurrentUser,
    error::ApiError,
    models::{CompletionStatus, ProgressGetReq, ProgressSetReq},
    state::AppState,
};

pub async fn set_value(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ProgressSetReq>,
) -> Result<Json<Value>, ApiError> {
    state
        .progress
        .set(user.id(), req.course_id, &req.cmi_element, req.value)
        .await?;
    Ok(Json(json!({ "status": "success" })))
}

pub async fn get_value(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ProgressGetReq>,
) -> Result<Json<Value>, ApiError> {
    let value = state.progress.get(user.id(), req.course_id, &req.cmi_element).await?;
    Ok(Json(json!({ "status": "success", "value": value })))
}

#[derive(Serialize)]
pub struct ProgressView {
    pub course_id: i64,
    pub completion_status: CompletionStatus,
    pub score: Option<f64>,
    pub progress_data: Map<String, Value>,
}

/// The caller's whole record; an untouched course reads as "not attempted".
pub async fn course_progress(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<i64>,
) -> Result<Json<ProgressView>, ApiError> {
    let view = match state.progress.record(user.id(), course_id).await? {
        Some(r) => ProgressView {
            course_id,
            completion_status: r.completion_status,
            score: r.score,
            progress_data: r.progress_data,
        },
        None => ProgressView {
            course_id,
            completion_status: CompletionStatus::default(),
            score: None,
            progress_data: Map::new(),
        },
    };
    Ok(Json(view))
}
