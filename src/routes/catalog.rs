//! Courses, launch, grants and orders.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    auth::CurrentUser,
    error::ApiError,
    launch::LaunchInfo,
    models::*,
    state::AppState,
    store::StoreError,
};

pub async fn marketplace(State(state): State<AppState>) -> Result<Json<Vec<CourseSummary>>, ApiError> {
    let courses = state.store.list_marketplace_courses().await?;
    Ok(Json(courses.iter().map(CourseSummary::from).collect()))
}

#[derive(Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: CourseSummary,
    /// Languages with launchable content.
    pub languages: Vec<LanguageEntry>,
}

pub async fn course_detail(
    State(state): State<AppState>,
    Path(course_id): Path<i64>,
) -> Result<Json<CourseDetail>, ApiError> {
    let course = state
        .store
        .find_course(course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("COURSE_NOT_FOUND", format!("course {course_id} not found")))?;
    let mut languages: Vec<Language> = state
        .registry
        .packages(course_id)
        .await?
        .into_iter()
        .filter(Package::is_extracted)
        .map(|p| p.language)
        .collect();
    languages.sort();

    Ok(Json(CourseDetail {
        course: CourseSummary::from(&course),
        languages: languages.into_iter().map(LanguageEntry::from).collect(),
    }))
}

pub async fn create_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<NewCourse>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    user.require_superuser()?;
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("title is required"));
    }
    if !req.price.is_finite() || req.price < 0.0 {
        return Err(ApiError::bad_request("price must be a non-negative number"));
    }
    if req.time_to_complete < 0 {
        return Err(ApiError::bad_request("time_to_complete must not be negative"));
    }

    let course = state.store.create_course(&req).await?;
    tracing::info!(course_id = course.id, title = %course.title, "course created");
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn delete_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    user.require_superuser()?;
    state.registry.delete_course(course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn launch(
    State(state): State<AppState>,
    Path((course_id, language)): Path<(i64, String)>,
) -> Result<Json<LaunchInfo>, ApiError> {
    Ok(Json(state.launcher.resolve(course_id, &language).await?))
}

pub async fn available_languages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let company_id = user.company_id()?;
    let languages = state.launcher.entitled_languages(course_id, company_id).await?;
    Ok(Json(json!({ "languages": languages })))
}

pub async fn create_grant(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(mut req): Json<NewGrant>,
) -> Result<(StatusCode, Json<CompanyCourseGrant>), ApiError> {
    user.require_superuser()?;
    req.available_languages = req
        .available_languages
        .iter()
        .map(|code| {
            code.parse::<Language>()
                .map(|l| l.code().to_string())
                .map_err(|e| ApiError::bad_request(e.to_string()))
        })
        .collect::<Result<_, _>>()?;

    let grant = state.store.create_grant(&req).await.map_err(|e| match e {
        StoreError::Duplicate(_) => ApiError::Conflict {
            code: "DUPLICATE_GRANT",
            message: format!("company {} already has access to course {}", req.company_id, req.course_id),
        },
        other => other.into(),
    })?;
    tracing::info!(grant_id = grant.id, company_id = grant.company_id, course_id = grant.course_id, "course granted");
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn user_courses(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<CourseSummary>>, ApiError> {
    let company_id = user.company_id()?;
    let courses = state.store.granted_courses(company_id).await?;
    Ok(Json(courses.iter().map(CourseSummary::from).collect()))
}

pub async fn language_options(State(state): State<AppState>) -> Result<Json<Vec<LanguageOption>>, ApiError> {
    Ok(Json(state.store.list_language_options().await?))
}

pub async fn create_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateOrderReq>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let company_id = user.company_id()?;
    if req.languages.is_empty() {
        return Err(ApiError::bad_request("at least one language must be selected"));
    }
    if state.store.find_course(req.course).await?.is_none() {
        return Err(ApiError::not_found("COURSE_NOT_FOUND", format!("course {} not found", req.course)));
    }

    let order = state
        .store
        .create_order(&NewOrder {
            course_id: req.course,
            company_id,
            languages: req.languages,
            note: req.note,
        })
        .await?;
    tracing::info!(order_id = order.id, company_id, course_id = order.course_id, "order placed");
    Ok((StatusCode::CREATED, Json(order)))
}
