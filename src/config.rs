use std::{env, path::PathBuf};
use thiserror::Error;

/// Directory under `data_dir` (and `media_url`) holding extracted packages.
pub const CONTENT_DIR: &str = "scorm_unpacked";

/// Default upload ceiling for package archives (50 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Default ceiling on the total decompressed size of one package (1 GB).
pub const DEFAULT_MAX_UNPACKED_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Process configuration, built once in `main` and handed to every component.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Root for uploaded archives and extracted content.
    pub data_dir: PathBuf,
    /// Public prefix `data_dir` is served under, e.g. `/media`.
    pub media_url: String,
    pub public_base_url: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub max_unpacked_bytes: u64,
    /// File launched inside every extracted package.
    pub entry_point: String,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub default_from_email: String,
    pub player_script_url: String,
    pub invitation_ttl_days: i64,
    /// Empty means any origin.
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".into())),
            media_url: normalize_prefix(&env::var("MEDIA_URL").unwrap_or_else(|_| "/media".into())),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8081".into())
                .trim_end_matches('/')
                .to_string(),
            port: parsed("PORT", 8081)?,
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            max_unpacked_bytes: parsed("MAX_UNPACKED_BYTES", DEFAULT_MAX_UNPACKED_BYTES)?,
            entry_point: env::var("SCORM_ENTRY_POINT").unwrap_or_else(|_| "index.html".into()),
            jwt_secret: required("JWT_SECRET")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into())
                .trim_end_matches('/')
                .to_string(),
            default_from_email: env::var("DEFAULT_FROM_EMAIL")
                .unwrap_or_else(|_| "no-reply@localhost".into()),
            player_script_url: env::var("PLAYER_SCRIPT_URL")
                .unwrap_or_else(|_| "/static/scormApiWrapper.js".into()),
            invitation_ttl_days: parsed("INVITATION_TTL_DAYS", 7)?,
            cors_allowed_origins,
        })
    }

    /// Where extracted packages live.
    pub fn content_root(&self) -> PathBuf {
        self.data_dir.join(CONTENT_DIR)
    }

    /// Where uploaded archives are kept.
    pub fn archive_root(&self) -> PathBuf {
        self.data_dir.join("scorm_packages")
    }

    /// Settings for tests and local runs; everything lives under `data_dir`.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>, jwt_secret: &str) -> Self {
        Self {
            database_url: String::new(),
            data_dir: data_dir.into(),
            media_url: "/media".into(),
            public_base_url: "http://localhost:8081".into(),
            port: 8081,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_unpacked_bytes: DEFAULT_MAX_UNPACKED_BYTES,
            entry_point: "index.html".into(),
            jwt_secret: jwt_secret.into(),
            frontend_url: "http://localhost:5173".into(),
            default_from_email: "no-reply@localhost".into(),
            player_script_url: "/static/scormApiWrapper.js".into(),
            invitation_ttl_days: 7,
            cors_allowed_origins: Vec::new(),
        }
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { key, value: v }),
        Err(_) => Ok(default),
    }
}

fn normalize_prefix(p: &str) -> String {
    let trimmed = p.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_prefix_is_normalized() {
        assert_eq!(normalize_prefix("media/"), "/media");
        assert_eq!(normalize_prefix("/media"), "/media");
        assert_eq!(normalize_prefix("/"), "");
    }

    #[test]
    fn content_and_archive_roots_sit_under_data_dir() {
        let cfg = AppConfig::for_data_dir("/srv/lms", "s");
        assert_eq!(cfg.content_root(), PathBuf::from("/srv/lms/scorm_unpacked"));
        assert_eq!(cfg.archive_root(), PathBuf::from("/srv/lms/scorm_packages"));
    }
}
