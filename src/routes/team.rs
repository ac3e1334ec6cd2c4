//! Company membership: listing, invitations, removal and the dashboard.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    error::ApiError,
    mailer,
    models::{CompanyDashboard, DashboardUpdate, InviteReq, NewInvitation, TeamMember},
    state::AppState,
};

pub async fn list_members(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<TeamMember>>, ApiError> {
    let company_id = user.admin_company_id()?;
    let members = state.store.company_users(company_id).await?;
    Ok(Json(members.iter().map(|m| TeamMember::from_user(m, user.id())).collect()))
}

pub async fn invite(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<InviteReq>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let company_id = user.admin_company_id()?;
    let email = req.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("User with this email already exists"));
    }

    let invitation = state
        .store
        .create_invitation(&NewInvitation {
            email: email.clone(),
            company_id,
            invited_by: user.id(),
            expires_at: Some(Utc::now() + Duration::days(state.config.invitation_ttl_days)),
        })
        .await?;

    let accept_url = format!("{}/accept-invite/{}/", state.config.frontend_url, invitation.token);
    mailer::send_detached(
        state.mailer.clone(),
        mailer::invitation(&state.config.default_from_email, &email, &accept_url),
    );
    tracing::info!(company_id, invited_by = user.id(), "invitation created");

    Ok((StatusCode::CREATED, Json(json!({ "message": "Invitation sent", "email": email }))))
}

pub async fn remove_member(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if user_id == user.id() {
        return Err(ApiError::bad_request("You cannot remove yourself"));
    }
    let not_found = || ApiError::not_found("USER_NOT_FOUND", format!("user {user_id} not found"));

    let target = state.store.find_user(user_id).await?.ok_or_else(not_found)?;
    if !user.0.is_superuser {
        let company_id = user.admin_company_id()?;
        if target.company_id != Some(company_id) {
            return Err(not_found());
        }
    }

    if !state.store.delete_user(user_id).await? {
        return Err(not_found());
    }
    tracing::info!(removed = user_id, by = user.id(), "team member removed");
    Ok(Json(json!({ "message": "User removed" })))
}

/// Attaches an existing account to the inviting company, or tells the
/// frontend to show the registration form.
pub async fn accept_invite(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let invitation = state
        .store
        .find_invitation(token)
        .await?
        .ok_or_else(|| ApiError::not_found("INVITATION_NOT_FOUND", "Invitation not found"))?;
    if invitation.accepted {
        return Err(ApiError::bad_request("Invitation has already been used"));
    }
    if invitation.expires_at.is_some_and(|t| t < Utc::now()) {
        return Err(ApiError::bad_request("Invitation has expired"));
    }

    let company_name = state
        .store
        .find_company(invitation.company_id)
        .await?
        .map(|c| c.name);

    let existing = match invitation.email.as_deref() {
        Some(email) => state.store.find_user_by_email(email).await?,
        None => None,
    };
    let Some(existing) = existing else {
        return Ok(Json(json!({
            "message": "User needs to create an account",
            "needs_registration": true,
            "email": invitation.email,
            "company_id": invitation.company_id,
            "company_name": company_name,
        })));
    };

    state.store.set_user_company(existing.id, invitation.company_id).await?;
    state.store.mark_invitation_accepted(token).await?;
    tracing::info!(user_id = existing.id, company_id = invitation.company_id, "invitation accepted");

    Ok(Json(json!({
        "message": "Invitation accepted",
        "needs_registration": false,
        "company_id": invitation.company_id,
        "company_name": company_name,
    })))
}

pub async fn dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<CompanyDashboard>, ApiError> {
    let company_id = user.company_id()?;
    let company = state
        .store
        .find_company(company_id)
        .await?
        .ok_or_else(|| ApiError::not_found("COMPANY_NOT_FOUND", format!("company {company_id} not found")))?;
    Ok(Json(company.into()))
}

/// Company admins edit their own dashboard; superusers may edit the one of
/// whichever company they belong to.
pub async fn update_dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<DashboardUpdate>,
) -> Result<Json<CompanyDashboard>, ApiError> {
    let company_id = user.company_id()?;
    if !user.0.is_admin && !user.0.is_superuser {
        return Err(ApiError::forbidden("You are not allowed to change company information"));
    }

    let company = match req.dashboard_text {
        Some(text) => state.store.update_dashboard_text(company_id, &text).await?,
        None => state
            .store
            .find_company(company_id)
            .await?
            .ok_or_else(|| ApiError::not_found("COMPANY_NOT_FOUND", format!("company {company_id} not found")))?,
    };
    tracing::info!(company_id, by = user.id(), "company dashboard updated");
    Ok(Json(company.into()))
}
