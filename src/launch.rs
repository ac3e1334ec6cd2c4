//! Turns a (course, language) pair into a browsable URL for the package's
//! entry point, and works out which languages a company may launch.

use crate::{
    config::{AppConfig, CONTENT_DIR},
    models::{Language, LanguageEntry},
    store::{Store, StoreError},
};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use std::{collections::HashSet, path::Path, sync::Arc};
use thiserror::Error;

/// Characters escaped inside a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("unknown language code '{0}'")]
    InvalidLanguage(String),
    #[error("course {0} not found")]
    CourseNotFound(i64),
    #[error("no SCORM package for language {language}")]
    PackageNotFound { language: Language },
    #[error("SCORM content for language {language} is not ready")]
    ContentNotReady { language: Language },
    #[error("company {company_id} has no access to course {course_id}")]
    NoAccess { company_id: i64, course_id: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LaunchInfo {
    pub scorm_url: String,
    pub course_title: String,
}

pub struct LaunchResolver {
    store: Arc<dyn Store>,
    /// `{public_base_url}{media_url}/scorm_unpacked`
    content_base: String,
    entry_point: String,
}

impl LaunchResolver {
    pub fn new(store: Arc<dyn Store>, config: &AppConfig) -> Self {
        Self {
            store,
            content_base: format!("{}{}/{}", config.public_base_url, config.media_url, CONTENT_DIR),
            entry_point: config.entry_point.clone(),
        }
    }

    pub async fn resolve(&self, course_id: i64, language_code: &str) -> Result<LaunchInfo, LaunchError> {
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or(LaunchError::CourseNotFound(course_id))?;
        let language: Language = language_code
            .parse()
            .map_err(|_| LaunchError::InvalidLanguage(language_code.to_string()))?;
        let package = self
            .store
            .find_package(course_id, language)
            .await?
            .ok_or(LaunchError::PackageNotFound { language })?;
        let dir = package
            .unpacked_dir
            .as_deref()
            .ok_or(LaunchError::ContentNotReady { language })?;

        let dir_name = Path::new(dir)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(LaunchError::ContentNotReady { language })?;

        tracing::debug!(course_id, %language, package_id = package.id, "launch resolved");
        Ok(LaunchInfo {
            scorm_url: self.content_url(&dir_name),
            course_title: course.title,
        })
    }

    /// Languages of `course_id` the company is entitled to and that have
    /// extracted content, in the order the grant lists them.
    pub async fn entitled_languages(
        &self,
        course_id: i64,
        company_id: i64,
    ) -> Result<Vec<LanguageEntry>, LaunchError> {
        if self.store.find_course(course_id).await?.is_none() {
            return Err(LaunchError::CourseNotFound(course_id));
        }
        let grant = self
            .store
            .find_grant(company_id, course_id)
            .await?
            .ok_or(LaunchError::NoAccess { company_id, course_id })?;

        let extracted: HashSet<Language> = self
            .store
            .list_packages(course_id)
            .await?
            .into_iter()
            .filter(|p| p.is_extracted())
            .map(|p| p.language)
            .collect();

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for code in &grant.available_languages {
            let language: Language = match code.parse() {
                Ok(l) => l,
                Err(_) => {
                    tracing::warn!(grant_id = grant.id, code = %code, "skipping unknown language on grant");
                    continue;
                }
            };
            if extracted.contains(&language) && seen.insert(language) {
                out.push(LanguageEntry::from(language));
            }
        }
        Ok(out)
    }

    fn content_url(&self, dir_name: &str) -> String {
        let entry: Vec<String> = self
            .entry_point
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| utf8_percent_encode(s, PATH_SEGMENT).to_string())
            .collect();
        format!(
            "{}/{}/{}",
            self.content_base,
            utf8_percent_encode(dir_name, PATH_SEGMENT),
            entry.join("/")
        )
    }
}
