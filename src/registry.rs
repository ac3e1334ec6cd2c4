//! Package registration: validate → persist archive → insert row → extract →
//! record outcome. The database's (course, language) uniqueness constraint is
//! the only arbiter between concurrent uploads.

use crate::{
    archive::{self, ArchiveError},
    config::AppConfig,
    extract::{ExtractError, ExtractionEngine, PackageIdentity},
    manifest,
    models::{Language, NewPackage, Package},
    store::{Store, StoreError},
};
use chrono::Utc;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Invalid(#[from] ArchiveError),
    #[error("course {0} not found")]
    CourseNotFound(i64),
    #[error("no {language} package exists for course {course_id}")]
    PackageNotFound { course_id: i64, language: Language },
    #[error("course {course_id} already has a {language} package")]
    DuplicateLanguage { course_id: i64, language: Language },
    #[error("package {package_id} was stored but its content could not be extracted: {reason}")]
    ExtractionFailed { package_id: i64, reason: String },
    #[error("failed to store uploaded archive: {0}")]
    Storage(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An uploaded archive as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct PackageRegistry {
    store: Arc<dyn Store>,
    engine: ExtractionEngine,
    archive_root: PathBuf,
    max_upload_bytes: usize,
    entry_point: String,
}

impl PackageRegistry {
    pub fn new(store: Arc<dyn Store>, config: &AppConfig) -> Self {
        Self {
            store,
            engine: ExtractionEngine::new(config.content_root())
                .with_max_unpacked_bytes(config.max_unpacked_bytes),
            archive_root: config.archive_root(),
            max_upload_bytes: config.max_upload_bytes,
            entry_point: config.entry_point.clone(),
        }
    }

    /// Registers a new package. The row is created before extraction, so a
    /// failed extraction still leaves a package with a null directory.
    pub async fn register(
        &self,
        course_id: i64,
        language: Language,
        upload: Upload,
    ) -> Result<Package, RegistryError> {
        self.validate(&upload)?;
        if self.store.find_course(course_id).await?.is_none() {
            return Err(RegistryError::CourseNotFound(course_id));
        }

        let archive_path = self.persist_archive(&upload).await?;
        let new = NewPackage {
            course_id,
            language,
            archive_path: archive_path.to_string_lossy().into_owned(),
        };
        let package = match self.store.insert_package(&new).await {
            Ok(p) => p,
            Err(e) => {
                discard_file(&archive_path).await;
                return Err(match e {
                    StoreError::Duplicate(_) => RegistryError::DuplicateLanguage { course_id, language },
                    StoreError::NotFound(_) => RegistryError::CourseNotFound(course_id),
                    other => other.into(),
                });
            }
        };
        tracing::info!(package_id = package.id, course_id, %language, "package registered");

        match self.extract(&package, &archive_path).await {
            Ok((dir, identifier)) => {
                let dir = dir.to_string_lossy().into_owned();
                self.store
                    .record_extraction(package.id, Some(&dir), identifier.as_deref())
                    .await?;
                Ok(Package { unpacked_dir: Some(dir), identifier, ..package })
            }
            Err(e) => {
                tracing::warn!(package_id = package.id, course_id, %language, error = %e, "extraction failed");
                self.store.record_extraction(package.id, None, None).await?;
                Err(RegistryError::ExtractionFailed { package_id: package.id, reason: e.to_string() })
            }
        }
    }

    /// Replaces the archive of an existing package and re-extracts it into the
    /// same directory. A failed re-upload leaves the package as it was.
    pub async fn reupload(
        &self,
        course_id: i64,
        language: Language,
        upload: Upload,
    ) -> Result<Package, RegistryError> {
        self.validate(&upload)?;
        let package = self
            .store
            .find_package(course_id, language)
            .await?
            .ok_or(RegistryError::PackageNotFound { course_id, language })?;

        let archive_path = self.persist_archive(&upload).await?;
        let (dir, identifier) = match self.extract(&package, &archive_path).await {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(package_id = package.id, error = %e, "re-extraction failed, keeping previous content");
                discard_file(&archive_path).await;
                return Err(RegistryError::ExtractionFailed { package_id: package.id, reason: e.to_string() });
            }
        };

        let archive = archive_path.to_string_lossy().into_owned();
        let dir = dir.to_string_lossy().into_owned();
        self.store.replace_archive(package.id, &archive).await?;
        self.store
            .record_extraction(package.id, Some(&dir), identifier.as_deref())
            .await?;
        if package.archive_path != archive {
            discard_file(Path::new(&package.archive_path)).await;
        }
        tracing::info!(package_id = package.id, course_id, %language, "package re-uploaded");

        Ok(Package { archive_path: archive, unpacked_dir: Some(dir), identifier, ..package })
    }

    /// `Ok(None)`: nothing uploaded. `Ok(Some(p))` with `p.unpacked_dir == None`: not ready.
    pub async fn lookup(&self, course_id: i64, language: Language) -> Result<Option<Package>, RegistryError> {
        Ok(self.store.find_package(course_id, language).await?)
    }

    pub async fn packages(&self, course_id: i64) -> Result<Vec<Package>, RegistryError> {
        if self.store.find_course(course_id).await?.is_none() {
            return Err(RegistryError::CourseNotFound(course_id));
        }
        Ok(self.store.list_packages(course_id).await?)
    }

    /// Deletes a course (rows cascade) and the files its packages owned.
    pub async fn delete_course(&self, course_id: i64) -> Result<(), RegistryError> {
        let packages = self.store.list_packages(course_id).await?;
        if !self.store.delete_course(course_id).await? {
            return Err(RegistryError::CourseNotFound(course_id));
        }

        for package in packages {
            if let Some(dir) = package.unpacked_dir {
                let engine = self.engine.clone();
                let res = tokio::task::spawn_blocking(move || engine.remove(Path::new(&dir))).await;
                match res {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(package_id = package.id, error = %e, "failed to remove package directory"),
                    Err(e) => tracing::warn!(package_id = package.id, error = %e, "package directory removal task failed"),
                }
            }
            discard_file(Path::new(&package.archive_path)).await;
        }
        tracing::info!(course_id, "course deleted");
        Ok(())
    }

    fn validate(&self, upload: &Upload) -> Result<(), ArchiveError> {
        archive::check_file_name(&upload.file_name)?;
        archive::check_size(upload.bytes.len(), self.max_upload_bytes)
    }

    async fn persist_archive(&self, upload: &Upload) -> io::Result<PathBuf> {
        let dir = self.archive_root.join(Utc::now().format("%Y/%m/%d").to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}-{}", Uuid::new_v4(), sanitize_file_name(&upload.file_name)));
        tokio::fs::write(&path, &upload.bytes).await?;
        Ok(path)
    }

    async fn extract(
        &self,
        package: &Package,
        archive_path: &Path,
    ) -> Result<(PathBuf, Option<String>), ExtractError> {
        let engine = self.engine.clone();
        let entry_point = self.entry_point.clone();
        let archive_path = archive_path.to_path_buf();
        let id = PackageIdentity {
            course_id: package.course_id,
            language: package.language,
            package_id: package.id,
        };

        tokio::task::spawn_blocking(move || -> Result<_, ExtractError> {
            let dir = engine.extract(&archive_path, &id)?;
            let identifier = match manifest::read_manifest(&dir) {
                Ok(info) => {
                    if !dir.join(&entry_point).exists() {
                        tracing::warn!(
                            package_id = id.package_id,
                            entry_point = %entry_point,
                            manifest_launch = ?info.launch_href,
                            "package has no entry point file; launches will 404"
                        );
                    }
                    info.identifier
                }
                Err(e) => {
                    tracing::debug!(package_id = id.package_id, error = %e, "no usable manifest");
                    None
                }
            };
            Ok((dir, identifier))
        })
        .await
        .unwrap_or_else(|e| Err(ExtractError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))))
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "package.zip".to_string()
    } else {
        cleaned
    }
}

async fn discard_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove archive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewCourse;
    use crate::store::{memory::MemoryStore, CourseRepository, PackageRepository};
    use std::io::{Cursor, Write};

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            w.start_file(*name, zip::write::FileOptions::default()).unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap().into_inner()
    }

    fn upload(bytes: Vec<u8>) -> Upload {
        Upload { file_name: "course.zip".into(), bytes }
    }

    async fn setup() -> (tempfile::TempDir, Arc<MemoryStore>, PackageRegistry, i64) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let config = AppConfig::for_data_dir(tmp.path(), "secret");
        let registry = PackageRegistry::new(store.clone(), &config);
        let course = store
            .create_course(&NewCourse {
                title: "Forklift basics".into(),
                description: String::new(),
                price: 10.0,
                language: Language::En,
                is_marketplace: true,
                time_to_complete: 20,
                company_id: None,
            })
            .await
            .unwrap();
        (tmp, store, registry, course.id)
    }

    const MANIFEST: &[u8] = br#"<manifest identifier="forklift-101"><organizations/><resources/></manifest>"#;

    #[tokio::test]
    async fn register_extracts_and_records_identifier() {
        let (_tmp, store, registry, course_id) = setup().await;
        let bytes = zip_bytes(&[("index.html", b"<html/>"), ("imsmanifest.xml", MANIFEST)]);

        let package = registry.register(course_id, Language::En, upload(bytes)).await.unwrap();

        let dir = PathBuf::from(package.unpacked_dir.clone().unwrap());
        assert!(dir.ends_with(format!("scorm_{}_EN_{}", course_id, package.id)));
        assert!(dir.join("index.html").exists());
        assert_eq!(package.identifier.as_deref(), Some("forklift-101"));

        let stored = store.find_package(course_id, Language::En).await.unwrap().unwrap();
        assert_eq!(stored, package);
    }

    #[tokio::test]
    async fn corrupt_archive_keeps_row_with_null_directory() {
        let (_tmp, _store, registry, course_id) = setup().await;

        let err = registry
            .register(course_id, Language::Se, upload(b"not really a zip".to_vec()))
            .await
            .unwrap_err();

        let package_id = match err {
            RegistryError::ExtractionFailed { package_id, .. } => package_id,
            other => panic!("unexpected error: {other:?}"),
        };
        let stored = registry.lookup(course_id, Language::Se).await.unwrap().unwrap();
        assert_eq!(stored.id, package_id);
        assert!(stored.unpacked_dir.is_none());
        assert!(Path::new(&stored.archive_path).exists());
    }

    #[tokio::test]
    async fn duplicate_language_is_rejected_and_archive_discarded() {
        let (tmp, store, registry, course_id) = setup().await;
        let bytes = zip_bytes(&[("index.html", b"v1")]);
        let first = registry.register(course_id, Language::En, upload(bytes.clone())).await.unwrap();

        let err = registry.register(course_id, Language::En, upload(bytes)).await.unwrap_err();

        assert!(matches!(err, RegistryError::DuplicateLanguage { language: Language::En, .. }));
        assert_eq!(store.list_packages(course_id).await.unwrap(), vec![first]);
        let archives: Vec<_> = walkdir::WalkDir::new(tmp.path().join("scorm_packages"))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .collect();
        assert_eq!(archives.len(), 1);
    }

    #[tokio::test]
    async fn wrong_extension_and_unknown_course_are_rejected_up_front() {
        let (_tmp, store, registry, course_id) = setup().await;
        let bytes = zip_bytes(&[("index.html", b"x")]);

        let err = registry
            .register(course_id, Language::En, Upload { file_name: "course.rar".into(), bytes: bytes.clone() })
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(ArchiveError::UnsupportedExtension(_))));

        let err = registry.register(9999, Language::En, upload(bytes)).await.unwrap_err();
        assert!(matches!(err, RegistryError::CourseNotFound(9999)));
        assert!(store.list_packages(course_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reupload_replaces_content_in_place() {
        let (_tmp, _store, registry, course_id) = setup().await;
        let first = registry
            .register(course_id, Language::En, upload(zip_bytes(&[("index.html", b"v1"), ("stale.js", b"x")])))
            .await
            .unwrap();

        let second = registry
            .reupload(course_id, Language::En, upload(zip_bytes(&[("index.html", b"v2")])))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.unpacked_dir, second.unpacked_dir);
        let dir = PathBuf::from(second.unpacked_dir.unwrap());
        assert_eq!(std::fs::read(dir.join("index.html")).unwrap(), b"v2");
        assert!(!dir.join("stale.js").exists());
        assert!(!Path::new(&first.archive_path).exists());
    }

    #[tokio::test]
    async fn failed_reupload_keeps_previous_package() {
        let (_tmp, store, registry, course_id) = setup().await;
        let first = registry
            .register(course_id, Language::En, upload(zip_bytes(&[("index.html", b"v1")])))
            .await
            .unwrap();

        let err = registry
            .reupload(course_id, Language::En, upload(b"garbage".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::ExtractionFailed { .. }));
        let stored = store.find_package(course_id, Language::En).await.unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn concurrent_uploads_for_same_language_yield_one_package() {
        let (_tmp, store, registry, course_id) = setup().await;
        let bytes = zip_bytes(&[("index.html", b"x")]);

        let (a, b) = tokio::join!(
            registry.register(course_id, Language::En, upload(bytes.clone())),
            registry.register(course_id, Language::En, upload(bytes)),
        );

        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let loser = if a.is_err() { a.unwrap_err() } else { b.unwrap_err() };
        assert!(matches!(loser, RegistryError::DuplicateLanguage { .. }));
        assert_eq!(store.list_packages(course_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_course_removes_package_directories() {
        let (_tmp, store, registry, course_id) = setup().await;
        let package = registry
            .register(course_id, Language::En, upload(zip_bytes(&[("index.html", b"x")])))
            .await
            .unwrap();
        let dir = PathBuf::from(package.unpacked_dir.unwrap());
        assert!(dir.exists());

        registry.delete_course(course_id).await.unwrap();

        assert!(!dir.exists());
        assert!(!Path::new(&package.archive_path).exists());
        assert!(store.find_course(course_id).await.unwrap().is_none());
        assert!(matches!(
            registry.delete_course(course_id).await,
            Err(RegistryError::CourseNotFound(_))
        ));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd.zip"), "passwd.zip");
        assert_eq!(sanitize_file_name("my course (v2).zip"), "my_course__v2_.zip");
        assert_eq!(sanitize_file_name(".."), "package.zip");
    }
}
