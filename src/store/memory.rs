use super::*;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// In-process store with the same constraint semantics as the Postgres schema:
/// unique (course, language) packages, unique (company, course) grants,
/// one progress record per (user, course), cascading course deletes.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    companies: BTreeMap<i64, Company>,
    users: BTreeMap<i64, User>,
    courses: BTreeMap<i64, Course>,
    packages: BTreeMap<i64, Package>,
    grants: BTreeMap<i64, CompanyCourseGrant>,
    progress: HashMap<(i64, i64), ProgressRecord>,
    orders: BTreeMap<i64, Order>,
    invitations: HashMap<Uuid, Invitation>,
    language_options: Vec<LanguageOption>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.inner.lock().language_options = Language::ALL
            .iter()
            .map(|l| LanguageOption { value: l.code().into(), label: l.name().into(), price: 0.0 })
            .collect();
        store
    }
}

#[async_trait]
impl CourseRepository for MemoryStore {
    async fn create_course(&self, new: &NewCourse) -> StoreResult<Course> {
        let mut inner = self.inner.lock();
        if let Some(company_id) = new.company_id {
            if !inner.companies.contains_key(&company_id) {
                return Err(StoreError::NotFound("company"));
            }
        }
        let id = inner.next_id();
        let course = Course {
            id,
            title: new.title.clone(),
            description: new.description.clone(),
            price: new.price,
            language: new.language,
            is_marketplace: new.is_marketplace,
            time_to_complete: new.time_to_complete,
            company_id: new.company_id,
            created_at: Utc::now(),
        };
        inner.courses.insert(id, course.clone());
        Ok(course)
    }

    async fn find_course(&self, id: i64) -> StoreResult<Option<Course>> {
        Ok(self.inner.lock().courses.get(&id).cloned())
    }

    async fn list_marketplace_courses(&self) -> StoreResult<Vec<Course>> {
        let inner = self.inner.lock();
        Ok(inner.courses.values().rev().filter(|c| c.is_marketplace).cloned().collect())
    }

    async fn delete_course(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        if inner.courses.remove(&id).is_none() {
            return Ok(false);
        }
        inner.packages.retain(|_, p| p.course_id != id);
        inner.grants.retain(|_, g| g.course_id != id);
        inner.progress.retain(|(_, course_id), _| *course_id != id);
        inner.orders.retain(|_, o| o.course_id != id);
        Ok(true)
    }
}

#[async_trait]
impl PackageRepository for MemoryStore {
    async fn insert_package(&self, new: &NewPackage) -> StoreResult<Package> {
        let mut inner = self.inner.lock();
        if !inner.courses.contains_key(&new.course_id) {
            return Err(StoreError::NotFound("course"));
        }
        if inner
            .packages
            .values()
            .any(|p| p.course_id == new.course_id && p.language == new.language)
        {
            return Err(StoreError::Duplicate("package"));
        }
        let id = inner.next_id();
        let package = Package {
            id,
            course_id: new.course_id,
            language: new.language,
            archive_path: new.archive_path.clone(),
            unpacked_dir: None,
            identifier: None,
        };
        inner.packages.insert(id, package.clone());
        Ok(package)
    }

    async fn find_package(&self, course_id: i64, language: Language) -> StoreResult<Option<Package>> {
        let inner = self.inner.lock();
        Ok(inner
            .packages
            .values()
            .find(|p| p.course_id == course_id && p.language == language)
            .cloned())
    }

    async fn list_packages(&self, course_id: i64) -> StoreResult<Vec<Package>> {
        let inner = self.inner.lock();
        Ok(inner.packages.values().filter(|p| p.course_id == course_id).cloned().collect())
    }

    async fn record_extraction(
        &self,
        package_id: i64,
        unpacked_dir: Option<&str>,
        identifier: Option<&str>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let package = inner.packages.get_mut(&package_id).ok_or(StoreError::NotFound("package"))?;
        package.unpacked_dir = unpacked_dir.map(String::from);
        package.identifier = identifier.map(String::from);
        Ok(())
    }

    async fn replace_archive(&self, package_id: i64, archive_path: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let package = inner.packages.get_mut(&package_id).ok_or(StoreError::NotFound("package"))?;
        package.archive_path = archive_path.to_string();
        Ok(())
    }
}

#[async_trait]
impl GrantRepository for MemoryStore {
    async fn create_grant(&self, new: &NewGrant) -> StoreResult<CompanyCourseGrant> {
        let mut inner = self.inner.lock();
        if !inner.companies.contains_key(&new.company_id) {
            return Err(StoreError::NotFound("company"));
        }
        if !inner.courses.contains_key(&new.course_id) {
            return Err(StoreError::NotFound("course"));
        }
        if inner
            .grants
            .values()
            .any(|g| g.company_id == new.company_id && g.course_id == new.course_id)
        {
            return Err(StoreError::Duplicate("grant"));
        }
        let id = inner.next_id();
        let grant = CompanyCourseGrant {
            id,
            company_id: new.company_id,
            course_id: new.course_id,
            is_ordered: new.is_ordered,
            available_languages: new.available_languages.clone(),
        };
        inner.grants.insert(id, grant.clone());
        Ok(grant)
    }

    async fn find_grant(&self, company_id: i64, course_id: i64) -> StoreResult<Option<CompanyCourseGrant>> {
        let inner = self.inner.lock();
        Ok(inner
            .grants
            .values()
            .find(|g| g.company_id == company_id && g.course_id == course_id)
            .cloned())
    }

    async fn granted_courses(&self, company_id: i64) -> StoreResult<Vec<Course>> {
        let inner = self.inner.lock();
        Ok(inner
            .grants
            .values()
            .filter(|g| g.company_id == company_id)
            .filter_map(|g| inner.courses.get(&g.course_id).cloned())
            .collect())
    }
}

#[async_trait]
impl ProgressRepository for MemoryStore {
    async fn merge_progress(&self, write: &ProgressWrite) -> StoreResult<ProgressRecord> {
        // read-merge-write happens entirely under the store lock
        let mut inner = self.inner.lock();
        if !inner.courses.contains_key(&write.course_id) {
            return Err(StoreError::NotFound("course"));
        }
        if !inner.users.contains_key(&write.user_id) {
            return Err(StoreError::NotFound("user"));
        }
        let record = inner
            .progress
            .entry((write.user_id, write.course_id))
            .or_insert_with(|| ProgressRecord {
                user_id: write.user_id,
                course_id: write.course_id,
                completion_status: CompletionStatus::NotAttempted,
                score: None,
                progress_data: serde_json::Map::new(),
                last_accessed: Utc::now(),
            });
        record.progress_data.insert(write.key.clone(), write.value.clone());
        if let Some(status) = write.status {
            record.completion_status = status;
        }
        if let Some(score) = write.score {
            record.score = Some(score);
        }
        record.last_accessed = Utc::now();
        Ok(record.clone())
    }

    async fn find_progress(&self, user_id: i64, course_id: i64) -> StoreResult<Option<ProgressRecord>> {
        Ok(self.inner.lock().progress.get(&(user_id, course_id)).cloned())
    }
}

#[async_trait]
impl TeamRepository for MemoryStore {
    async fn create_company(&self, name: &str) -> StoreResult<Company> {
        let mut inner = self.inner.lock();
        let id = inner.next_id();
        let company = Company { id, name: name.to_string(), dashboard_text: None };
        inner.companies.insert(id, company.clone());
        Ok(company)
    }

    async fn find_company(&self, id: i64) -> StoreResult<Option<Company>> {
        Ok(self.inner.lock().companies.get(&id).cloned())
    }

    async fn update_dashboard_text(&self, company_id: i64, text: &str) -> StoreResult<Company> {
        let mut inner = self.inner.lock();
        let company = inner.companies.get_mut(&company_id).ok_or(StoreError::NotFound("company"))?;
        company.dashboard_text = Some(text.to_string());
        Ok(company.clone())
    }

    async fn create_user(&self, new: &NewUser) -> StoreResult<User> {
        let mut inner = self.inner.lock();
        if inner.users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(StoreError::Duplicate("user"));
        }
        if let Some(company_id) = new.company_id {
            if !inner.companies.contains_key(&company_id) {
                return Err(StoreError::NotFound("company"));
            }
        }
        let id = inner.next_id();
        let user = User {
            id,
            email: new.email.clone(),
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            company_id: new.company_id,
            is_admin: new.is_admin,
            is_superuser: new.is_superuser,
        };
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.lock();
        Ok(inner.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn company_users(&self, company_id: i64) -> StoreResult<Vec<User>> {
        let inner = self.inner.lock();
        Ok(inner.users.values().filter(|u| u.company_id == Some(company_id)).cloned().collect())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        if inner.users.remove(&id).is_none() {
            return Ok(false);
        }
        inner.progress.retain(|(user_id, _), _| *user_id != id);
        inner.invitations.retain(|_, i| i.invited_by != id);
        Ok(true)
    }

    async fn set_user_company(&self, user_id: i64, company_id: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.companies.contains_key(&company_id) {
            return Err(StoreError::NotFound("company"));
        }
        let user = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound("user"))?;
        user.company_id = Some(company_id);
        Ok(())
    }

    async fn create_invitation(&self, new: &NewInvitation) -> StoreResult<Invitation> {
        let mut inner = self.inner.lock();
        if !inner.companies.contains_key(&new.company_id) {
            return Err(StoreError::NotFound("company"));
        }
        let invitation = Invitation {
            token: Uuid::new_v4(),
            email: Some(new.email.clone()),
            company_id: new.company_id,
            invited_by: new.invited_by,
            created_at: Utc::now(),
            expires_at: new.expires_at,
            accepted: false,
        };
        inner.invitations.insert(invitation.token, invitation.clone());
        Ok(invitation)
    }

    async fn find_invitation(&self, token: Uuid) -> StoreResult<Option<Invitation>> {
        Ok(self.inner.lock().invitations.get(&token).cloned())
    }

    async fn mark_invitation_accepted(&self, token: Uuid) -> StoreResult<()> {
        if let Some(inv) = self.inner.lock().invitations.get_mut(&token) {
            inv.accepted = true;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn create_order(&self, new: &NewOrder) -> StoreResult<Order> {
        let mut inner = self.inner.lock();
        if !inner.courses.contains_key(&new.course_id) {
            return Err(StoreError::NotFound("course"));
        }
        let id = inner.next_id();
        let order = Order {
            id,
            course_id: new.course_id,
            company_id: new.company_id,
            languages: new.languages.clone(),
            note: new.note.clone(),
            order_date: Utc::now(),
            is_paid: false,
            invoice_sent: false,
        };
        inner.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn list_language_options(&self) -> StoreResult<Vec<LanguageOption>> {
        let mut options = self.inner.lock().language_options.clone();
        options.sort_by(|a, b| a.label.cmp(&b.label));
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn course(store: &MemoryStore) -> Course {
        store
            .create_course(&NewCourse {
                title: "Fire safety".into(),
                description: String::new(),
                price: 100.0,
                language: Language::En,
                is_marketplace: true,
                time_to_complete: 30,
                company_id: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn second_package_for_same_language_is_a_duplicate() {
        let store = MemoryStore::new();
        let c = course(&store).await;
        let new = NewPackage { course_id: c.id, language: Language::En, archive_path: "a.zip".into() };

        store.insert_package(&new).await.unwrap();
        let err = store.insert_package(&new).await.unwrap_err();

        assert!(matches!(err, StoreError::Duplicate("package")));
        assert_eq!(store.list_packages(c.id).await.unwrap().len(), 1);
        // a different language is fine
        store
            .insert_package(&NewPackage { language: Language::Se, ..new })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deleting_a_course_cascades() {
        let store = MemoryStore::new();
        let c = course(&store).await;
        let company = store.create_company("Acme").await.unwrap();
        let user = store
            .create_user(&NewUser { email: "a@acme.test".into(), company_id: Some(company.id), ..Default::default() })
            .await
            .unwrap();
        store
            .insert_package(&NewPackage { course_id: c.id, language: Language::En, archive_path: "a.zip".into() })
            .await
            .unwrap();
        store
            .create_grant(&NewGrant { company_id: company.id, course_id: c.id, is_ordered: true, available_languages: vec![] })
            .await
            .unwrap();
        store
            .merge_progress(&ProgressWrite {
                user_id: user.id,
                course_id: c.id,
                key: "k".into(),
                value: serde_json::json!(1),
                status: None,
                score: None,
            })
            .await
            .unwrap();

        assert!(store.delete_course(c.id).await.unwrap());

        assert!(store.list_packages(c.id).await.unwrap().is_empty());
        assert!(store.find_grant(company.id, c.id).await.unwrap().is_none());
        assert!(store.find_progress(user.id, c.id).await.unwrap().is_none());
        assert!(!store.delete_course(c.id).await.unwrap());
    }

    #[tokio::test]
    async fn user_emails_are_unique_case_insensitively() {
        let store = MemoryStore::new();
        store.create_user(&NewUser { email: "A@x.test".into(), ..Default::default() }).await.unwrap();
        let err = store.create_user(&NewUser { email: "a@X.test".into(), ..Default::default() }).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("user")));
    }
}
