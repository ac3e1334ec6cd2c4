use super::*;
use crate::db::Db;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

/// PostgreSQL-backed store. Uniqueness and cascades are enforced by the schema
/// in `migrations/`; this type only maps rows and constraint violations.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

/// Maps constraint violations to store errors. A foreign-key miss is reported
/// as whatever row the violated constraint references, falling back to `what`.
fn map_db_err(e: sqlx::Error, what: &'static str) -> StoreError {
    if let Some(db_err) = e.as_database_error() {
        match db_err.code().as_deref() {
            Some("23505") => return StoreError::Duplicate(what),
            Some("23503") => {
                return StoreError::NotFound(db_err.constraint().and_then(referenced_row).unwrap_or(what))
            }
            _ => {}
        }
    }
    tracing::error!(error = %e, what, "database error");
    StoreError::Database(e)
}

/// Postgres names inline foreign keys `{table}_{column}_fkey`.
fn referenced_row(constraint: &str) -> Option<&'static str> {
    let column = constraint.strip_suffix("_fkey")?;
    if column.ends_with("_user_id") || column.ends_with("_invited_by") {
        Some("user")
    } else if column.ends_with("_course_id") {
        Some("course")
    } else if column.ends_with("_company_id") {
        Some("company")
    } else {
        None
    }
}

fn parse_language(code: &str) -> StoreResult<Language> {
    code.parse()
        .map_err(|e: crate::models::UnknownLanguage| StoreError::Corrupt(e.to_string()))
}

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: i64,
    title: String,
    description: String,
    price: f64,
    language: String,
    is_marketplace: bool,
    time_to_complete: i32,
    company_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CourseRow> for Course {
    type Error = StoreError;

    fn try_from(r: CourseRow) -> StoreResult<Self> {
        Ok(Course {
            id: r.id,
            title: r.title,
            description: r.description,
            price: r.price,
            language: parse_language(&r.language)?,
            is_marketplace: r.is_marketplace,
            time_to_complete: r.time_to_complete,
            company_id: r.company_id,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PackageRow {
    id: i64,
    course_id: i64,
    language: String,
    archive_path: String,
    unpacked_dir: Option<String>,
    identifier: Option<String>,
}

impl TryFrom<PackageRow> for Package {
    type Error = StoreError;

    fn try_from(r: PackageRow) -> StoreResult<Self> {
        Ok(Package {
            id: r.id,
            course_id: r.course_id,
            language: parse_language(&r.language)?,
            archive_path: r.archive_path,
            unpacked_dir: r.unpacked_dir,
            identifier: r.identifier,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GrantRow {
    id: i64,
    company_id: i64,
    course_id: i64,
    is_ordered: bool,
    available_languages: Vec<String>,
}

impl From<GrantRow> for CompanyCourseGrant {
    fn from(r: GrantRow) -> Self {
        CompanyCourseGrant {
            id: r.id,
            company_id: r.company_id,
            course_id: r.course_id,
            is_ordered: r.is_ordered,
            available_languages: r.available_languages,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProgressRow {
    user_id: i64,
    course_id: i64,
    completion_status: String,
    score: Option<f64>,
    progress_data: Json<serde_json::Map<String, serde_json::Value>>,
    last_accessed: DateTime<Utc>,
}

impl From<ProgressRow> for ProgressRecord {
    fn from(r: ProgressRow) -> Self {
        ProgressRecord {
            user_id: r.user_id,
            course_id: r.course_id,
            completion_status: CompletionStatus::parse(&r.completion_status).unwrap_or_default(),
            score: r.score,
            progress_data: r.progress_data.0,
            last_accessed: r.last_accessed,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    company_id: Option<i64>,
    is_admin: bool,
    is_superuser: bool,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            company_id: r.company_id,
            is_admin: r.is_admin,
            is_superuser: r.is_superuser,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CompanyRow {
    id: i64,
    name: String,
    dashboard_text: Option<String>,
}

#[derive(sqlx::FromRow)]
struct InvitationRow {
    token: Uuid,
    email: Option<String>,
    company_id: i64,
    invited_by: i64,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    accepted: bool,
}

impl From<InvitationRow> for Invitation {
    fn from(r: InvitationRow) -> Self {
        Invitation {
            token: r.token,
            email: r.email,
            company_id: r.company_id,
            invited_by: r.invited_by,
            created_at: r.created_at,
            expires_at: r.expires_at,
            accepted: r.accepted,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    course_id: i64,
    company_id: i64,
    languages: Vec<String>,
    note: Option<String>,
    order_date: DateTime<Utc>,
    is_paid: bool,
    invoice_sent: bool,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(r: OrderRow) -> StoreResult<Self> {
        Ok(Order {
            id: r.id,
            course_id: r.course_id,
            company_id: r.company_id,
            languages: r
                .languages
                .iter()
                .map(|c| parse_language(c))
                .collect::<StoreResult<_>>()?,
            note: r.note,
            order_date: r.order_date,
            is_paid: r.is_paid,
            invoice_sent: r.invoice_sent,
        })
    }
}

const COURSE_COLUMNS: &str =
    "id, title, description, price, language, is_marketplace, time_to_complete, company_id, created_at";
const PACKAGE_COLUMNS: &str = "id, course_id, language, archive_path, unpacked_dir, identifier";
const USER_COLUMNS: &str = "id, email, first_name, last_name, company_id, is_admin, is_superuser";
const INVITATION_COLUMNS: &str = "token, email, company_id, invited_by, created_at, expires_at, accepted";

#[async_trait]
impl CourseRepository for PgStore {
    async fn create_course(&self, new: &NewCourse) -> StoreResult<Course> {
        let row = sqlx::query_as::<_, CourseRow>(&format!(
            "INSERT INTO courses (title, description, price, language, is_marketplace, time_to_complete, company_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COURSE_COLUMNS}"
        ))
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.language.code())
        .bind(new.is_marketplace)
        .bind(new.time_to_complete)
        .bind(new.company_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err(e, "company"))?;
        row.try_into()
    }

    async fn find_course(&self, id: i64) -> StoreResult<Option<Course>> {
        sqlx::query_as::<_, CourseRow>(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_db_err(e, "course"))?
            .map(Course::try_from)
            .transpose()
    }

    async fn list_marketplace_courses(&self) -> StoreResult<Vec<Course>> {
        sqlx::query_as::<_, CourseRow>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE is_marketplace ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_db_err(e, "course"))?
        .into_iter()
        .map(Course::try_from)
        .collect()
    }

    async fn delete_course(&self, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| map_db_err(e, "course"))?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl PackageRepository for PgStore {
    async fn insert_package(&self, new: &NewPackage) -> StoreResult<Package> {
        let row = sqlx::query_as::<_, PackageRow>(&format!(
            "INSERT INTO scorm_packages (course_id, language, archive_path)
             VALUES ($1, $2, $3)
             RETURNING {PACKAGE_COLUMNS}"
        ))
        .bind(new.course_id)
        .bind(new.language.code())
        .bind(&new.archive_path)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err(e, "package"))?;
        row.try_into()
    }

    async fn find_package(&self, course_id: i64, language: Language) -> StoreResult<Option<Package>> {
        sqlx::query_as::<_, PackageRow>(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM scorm_packages WHERE course_id = $1 AND language = $2"
        ))
        .bind(course_id)
        .bind(language.code())
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_db_err(e, "package"))?
        .map(Package::try_from)
        .transpose()
    }

    async fn list_packages(&self, course_id: i64) -> StoreResult<Vec<Package>> {
        sqlx::query_as::<_, PackageRow>(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM scorm_packages WHERE course_id = $1 ORDER BY id"
        ))
        .bind(course_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_db_err(e, "package"))?
        .into_iter()
        .map(Package::try_from)
        .collect()
    }

    async fn record_extraction(
        &self,
        package_id: i64,
        unpacked_dir: Option<&str>,
        identifier: Option<&str>,
    ) -> StoreResult<()> {
        let res = sqlx::query("UPDATE scorm_packages SET unpacked_dir = $2, identifier = $3 WHERE id = $1")
            .bind(package_id)
            .bind(unpacked_dir)
            .bind(identifier)
            .execute(&self.db)
            .await
            .map_err(|e| map_db_err(e, "package"))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("package"));
        }
        Ok(())
    }

    async fn replace_archive(&self, package_id: i64, archive_path: &str) -> StoreResult<()> {
        let res = sqlx::query("UPDATE scorm_packages SET archive_path = $2 WHERE id = $1")
            .bind(package_id)
            .bind(archive_path)
            .execute(&self.db)
            .await
            .map_err(|e| map_db_err(e, "package"))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("package"));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantRepository for PgStore {
    async fn create_grant(&self, new: &NewGrant) -> StoreResult<CompanyCourseGrant> {
        let row = sqlx::query_as::<_, GrantRow>(
            "INSERT INTO company_courses (company_id, course_id, is_ordered, available_languages)
             VALUES ($1, $2, $3, $4)
             RETURNING id, company_id, course_id, is_ordered, available_languages",
        )
        .bind(new.company_id)
        .bind(new.course_id)
        .bind(new.is_ordered)
        .bind(&new.available_languages)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err(e, "grant"))?;
        Ok(row.into())
    }

    async fn find_grant(&self, company_id: i64, course_id: i64) -> StoreResult<Option<CompanyCourseGrant>> {
        let row = sqlx::query_as::<_, GrantRow>(
            "SELECT id, company_id, course_id, is_ordered, available_languages
             FROM company_courses WHERE company_id = $1 AND course_id = $2",
        )
        .bind(company_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_db_err(e, "grant"))?;
        Ok(row.map(Into::into))
    }

    async fn granted_courses(&self, company_id: i64) -> StoreResult<Vec<Course>> {
        sqlx::query_as::<_, CourseRow>(
            "SELECT c.id, c.title, c.description, c.price, c.language, c.is_marketplace,
                    c.time_to_complete, c.company_id, c.created_at
             FROM company_courses cc JOIN courses c ON c.id = cc.course_id
             WHERE cc.company_id = $1
             ORDER BY cc.id",
        )
        .bind(company_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_db_err(e, "course"))?
        .into_iter()
        .map(Course::try_from)
        .collect()
    }
}

#[async_trait]
impl ProgressRepository for PgStore {
    async fn merge_progress(&self, write: &ProgressWrite) -> StoreResult<ProgressRecord> {
        // `||` on jsonb merges the single key server-side, so concurrent writers
        // to different keys of the same row never clobber each other.
        let row = sqlx::query_as::<_, ProgressRow>(
            r#"
            INSERT INTO scorm_progress (user_id, course_id, completion_status, score, progress_data, last_accessed)
            VALUES ($1, $2, COALESCE($5::text, 'not attempted'), $6::float8,
                    jsonb_build_object($3::text, $4::jsonb), now())
            ON CONFLICT (user_id, course_id) DO UPDATE SET
                progress_data = scorm_progress.progress_data || EXCLUDED.progress_data,
                completion_status = COALESCE($5::text, scorm_progress.completion_status),
                score = COALESCE($6::float8, scorm_progress.score),
                last_accessed = now()
            RETURNING user_id, course_id, completion_status, score, progress_data, last_accessed
            "#,
        )
        .bind(write.user_id)
        .bind(write.course_id)
        .bind(&write.key)
        .bind(Json(&write.value))
        .bind(write.status.map(CompletionStatus::as_str))
        .bind(write.score)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err(e, "progress"))?;
        Ok(row.into())
    }

    async fn find_progress(&self, user_id: i64, course_id: i64) -> StoreResult<Option<ProgressRecord>> {
        let row = sqlx::query_as::<_, ProgressRow>(
            "SELECT user_id, course_id, completion_status, score, progress_data, last_accessed
             FROM scorm_progress WHERE user_id = $1 AND course_id = $2",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_db_err(e, "progress"))?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl TeamRepository for PgStore {
    async fn create_company(&self, name: &str) -> StoreResult<Company> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "INSERT INTO companies (name) VALUES ($1) RETURNING id, name, dashboard_text",
        )
        .bind(name)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err(e, "company"))?;
        Ok(Company { id: row.id, name: row.name, dashboard_text: row.dashboard_text })
    }

    async fn find_company(&self, id: i64) -> StoreResult<Option<Company>> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "SELECT id, name, dashboard_text FROM companies WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_db_err(e, "company"))?;
        Ok(row.map(|r| Company { id: r.id, name: r.name, dashboard_text: r.dashboard_text }))
    }

    async fn update_dashboard_text(&self, company_id: i64, text: &str) -> StoreResult<Company> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "UPDATE companies SET dashboard_text = $2, updated_at = now()
             WHERE id = $1
             RETURNING id, name, dashboard_text",
        )
        .bind(company_id)
        .bind(text)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_db_err(e, "company"))?
        .ok_or(StoreError::NotFound("company"))?;
        Ok(Company { id: row.id, name: row.name, dashboard_text: row.dashboard_text })
    }

    async fn create_user(&self, new: &NewUser) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, first_name, last_name, company_id, is_admin, is_superuser)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.company_id)
        .bind(new.is_admin)
        .bind(new.is_superuser)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err(e, "user"))?;
        Ok(row.into())
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| map_db_err(e, "user"))?;
        Ok(row.map(Into::into))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_db_err(e, "user"))?;
        Ok(row.map(Into::into))
    }

    async fn company_users(&self, company_id: i64) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE company_id = $1 ORDER BY id"
        ))
        .bind(company_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_db_err(e, "user"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| map_db_err(e, "user"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_user_company(&self, user_id: i64, company_id: i64) -> StoreResult<()> {
        let res = sqlx::query("UPDATE users SET company_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(company_id)
            .execute(&self.db)
            .await
            .map_err(|e| map_db_err(e, "company"))?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    async fn create_invitation(&self, new: &NewInvitation) -> StoreResult<Invitation> {
        let row = sqlx::query_as::<_, InvitationRow>(&format!(
            "INSERT INTO invitations (token, email, company_id, invited_by, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {INVITATION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(new.company_id)
        .bind(new.invited_by)
        .bind(new.expires_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err(e, "invitation"))?;
        Ok(row.into())
    }

    async fn find_invitation(&self, token: Uuid) -> StoreResult<Option<Invitation>> {
        let row = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {INVITATION_COLUMNS} FROM invitations WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_db_err(e, "invitation"))?;
        Ok(row.map(Into::into))
    }

    async fn mark_invitation_accepted(&self, token: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE invitations SET accepted = TRUE WHERE token = $1")
            .bind(token)
            .execute(&self.db)
            .await
            .map_err(|e| map_db_err(e, "invitation"))?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn create_order(&self, new: &NewOrder) -> StoreResult<Order> {
        let codes: Vec<String> = new.languages.iter().map(|l| l.code().to_string()).collect();
        let row = sqlx::query_as::<_, OrderRow>(
            "INSERT INTO orders (course_id, company_id, languages, note)
             VALUES ($1, $2, $3, $4)
             RETURNING id, course_id, company_id, languages, note, order_date, is_paid, invoice_sent",
        )
        .bind(new.course_id)
        .bind(new.company_id)
        .bind(&codes)
        .bind(&new.note)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_db_err(e, "course"))?;
        row.try_into()
    }

    async fn list_language_options(&self) -> StoreResult<Vec<LanguageOption>> {
        let rows: Vec<(String, String, f64)> = sqlx::query_as(
            "SELECT value, label, price::float8 FROM language_options ORDER BY label",
        )
        .fetch_all(&self.db)
        .await
        .map_err(|e| map_db_err(e, "language option"))?;
        Ok(rows
            .into_iter()
            .map(|(value, label, price)| LanguageOption { value, label, price })
            .collect())
    }
}
