use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::{
    auth::CurrentUser,
    error::ApiError,
    models::{Language, Package},
    registry::Upload,
    state::AppState,
};

#[derive(Serialize)]
pub struct PackageView {
    pub id: i64,
    pub course_id: i64,
    pub language: Language,
    pub identifier: Option<String>,
    pub extracted: bool,
}

impl From<Package> for PackageView {
    fn from(p: Package) -> Self {
        Self {
            id: p.id,
            course_id: p.course_id,
            language: p.language,
            extracted: p.is_extracted(),
            identifier: p.identifier,
        }
    }
}

/// Multipart form: `language` (code) and `file` (the .zip archive).
pub async fn upload_package(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<i64>,
    mp: Multipart,
) -> Result<(StatusCode, Json<PackageView>), ApiError> {
    user.require_superuser()?;
    let (language, upload) = read_form(mp, None).await?;
    let language = language.ok_or_else(|| ApiError::bad_request("language is required"))?;

    let package = state.registry.register(course_id, language, upload).await?;
    Ok((StatusCode::CREATED, Json(package.into())))
}

/// Replaces the archive of an existing package; the way to recover a package
/// whose extraction failed.
pub async fn reupload_package(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((course_id, language)): Path<(i64, String)>,
    mp: Multipart,
) -> Result<Json<PackageView>, ApiError> {
    user.require_superuser()?;
    let language = parse_language(&language)?;
    let (_, upload) = read_form(mp, Some(language)).await?;

    let package = state.registry.reupload(course_id, language, upload).await?;
    Ok(Json(package.into()))
}

pub async fn list_packages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(course_id): Path<i64>,
) -> Result<Json<Vec<PackageView>>, ApiError> {
    user.require_superuser()?;
    let packages = state.registry.packages(course_id).await?;
    Ok(Json(packages.into_iter().map(PackageView::from).collect()))
}

async fn read_form(
    mut mp: Multipart,
    language: Option<Language>,
) -> Result<(Option<Language>, Upload), ApiError> {
    let mut language = language;
    let mut upload = None;

    while let Some(field) = mp.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        if name == "language" {
            language = Some(parse_language(&field.text().await?)?);
        } else if name == "file" {
            let file_name = field
                .file_name()
                .map(str::to_string)
                .ok_or_else(|| ApiError::bad_request("file must be sent as a file upload"))?;
            let bytes = field.bytes().await?.to_vec();
            upload = Some(Upload { file_name, bytes });
        }
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("file is required"))?;
    Ok((language, upload))
}

fn parse_language(code: &str) -> Result<Language, ApiError> {
    code.parse().map_err(|e: crate::models::UnknownLanguage| ApiError::bad_request(e.to_string()))
}
