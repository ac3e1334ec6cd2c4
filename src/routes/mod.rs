use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::services::ServeDir;

use crate::{config::CONTENT_DIR, state::AppState};

mod catalog;
mod packages;
mod progress;
mod proxy;
mod team;

pub fn router(state: AppState) -> Router {
    let content_url = format!("{}/{}", state.config.media_url, CONTENT_DIR);
    let content_root = state.config.content_root();

    Router::new()
        .route("/health", get(|| async { "ok" }))
        // catalogue + package ingest
        .route("/api/coursetobuy", get(catalog::marketplace).post(catalog::create_course))
        .route(
            "/api/coursetobuy/:id",
            get(catalog::course_detail).delete(catalog::delete_course),
        )
        .route(
            "/api/coursetobuy/:id/packages",
            get(packages::list_packages).post(packages::upload_package),
        )
        .route("/api/coursetobuy/:id/packages/:language", put(packages::reupload_package))
        // launch
        .route("/api/coursetobuy/:id/scorm/launch/:language", get(catalog::launch))
        .route("/api/coursetobuy/:id/available_languages", get(catalog::available_languages))
        .route("/api/scorm-proxy", get(proxy::scorm_proxy))
        // access + purchasing
        .route("/api/company/courses", post(catalog::create_grant))
        .route("/api/user/courses", get(catalog::user_courses))
        .route("/api/languages", get(catalog::language_options))
        .route("/api/orders", post(catalog::create_order))
        // runtime progress
        .route("/api/scorm/set", post(progress::set_value))
        .route("/api/scorm/get", post(progress::get_value))
        .route("/api/scorm/progress/:course_id", get(progress::course_progress))
        // team
        .route("/api/team", get(team::list_members))
        .route("/api/team/invite", post(team::invite))
        .route("/api/team/remove/:user_id", delete(team::remove_member))
        .route("/api/accept-invite/:token", get(team::accept_invite))
        .route("/api/company/dashboard", get(team::dashboard).put(team::update_dashboard))
        // extracted course files
        .nest_service(&content_url, ServeDir::new(content_root))
        .with_state(state)
}
