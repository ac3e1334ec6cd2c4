//! Persistence seams. Components and handlers only see these traits; the
//! binary wires in [`postgres::PgStore`], tests use [`memory::MemoryStore`].

pub mod memory;
pub mod postgres;

use crate::models::*;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    /// A referenced row does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("stored value is invalid: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn create_course(&self, new: &NewCourse) -> StoreResult<Course>;
    async fn find_course(&self, id: i64) -> StoreResult<Option<Course>>;
    async fn list_marketplace_courses(&self) -> StoreResult<Vec<Course>>;
    /// Cascades to packages, grants, orders and progress. Returns whether a row was deleted.
    async fn delete_course(&self, id: i64) -> StoreResult<bool>;
}

#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the (course, language) pair is taken.
    async fn insert_package(&self, new: &NewPackage) -> StoreResult<Package>;
    async fn find_package(&self, course_id: i64, language: Language) -> StoreResult<Option<Package>>;
    async fn list_packages(&self, course_id: i64) -> StoreResult<Vec<Package>>;
    async fn record_extraction(
        &self,
        package_id: i64,
        unpacked_dir: Option<&str>,
        identifier: Option<&str>,
    ) -> StoreResult<()>;
    async fn replace_archive(&self, package_id: i64, archive_path: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait GrantRepository: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the company already has a grant for the course.
    async fn create_grant(&self, new: &NewGrant) -> StoreResult<CompanyCourseGrant>;
    async fn find_grant(&self, company_id: i64, course_id: i64) -> StoreResult<Option<CompanyCourseGrant>>;
    async fn granted_courses(&self, company_id: i64) -> StoreResult<Vec<Course>>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Upserts the (user, course) record and merges a single key into its data.
    /// Must not lose concurrent writes to other keys of the same record.
    async fn merge_progress(&self, write: &ProgressWrite) -> StoreResult<ProgressRecord>;
    async fn find_progress(&self, user_id: i64, course_id: i64) -> StoreResult<Option<ProgressRecord>>;
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn create_company(&self, name: &str) -> StoreResult<Company>;
    async fn find_company(&self, id: i64) -> StoreResult<Option<Company>>;
    async fn update_dashboard_text(&self, company_id: i64, text: &str) -> StoreResult<Company>;
    async fn create_user(&self, new: &NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: i64) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn company_users(&self, company_id: i64) -> StoreResult<Vec<User>>;
    async fn delete_user(&self, id: i64) -> StoreResult<bool>;
    async fn set_user_company(&self, user_id: i64, company_id: i64) -> StoreResult<()>;
    async fn create_invitation(&self, new: &NewInvitation) -> StoreResult<Invitation>;
    async fn find_invitation(&self, token: Uuid) -> StoreResult<Option<Invitation>>;
    async fn mark_invitation_accepted(&self, token: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, new: &NewOrder) -> StoreResult<Order>;
    async fn list_language_options(&self) -> StoreResult<Vec<LanguageOption>>;
}

pub trait Store:
    CourseRepository + PackageRepository + GrantRepository + ProgressRepository + TeamRepository + OrderRepository
{
}

impl<T> Store for T where
    T: CourseRepository
        + PackageRepository
        + GrantRepository
        + ProgressRepository
        + TeamRepository
        + OrderRepository
{
}
