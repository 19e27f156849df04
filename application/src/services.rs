use domain::{Application, Job, Record, RecordId, Sector, User, UserProfile};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::query::{self, ApplicationQuery, JobQuery, UserQuery};
use crate::{ApplicationError, PersistenceGateway, now_timestamp, patch_fields};

// --- Jobs ---

/// Job postings: listing, lookup, CRUD and the derived views.
pub struct JobService {
    gateway: Arc<PersistenceGateway>,
}

impl JobService {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self))]
    pub async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<Job>, ApplicationError> {
        let store = self.gateway.load().await?;
        let jobs = query::filter_jobs(&store.jobs, query);
        info!(returned = jobs.len(), "Jobs listed");
        Ok(jobs)
    }

    /// Single-record lookup; `None` when the id does not resolve.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_job(&self, id: &RecordId) -> Result<Option<Job>, ApplicationError> {
        self.gateway.find(id).await
    }

    #[instrument(skip(self, payload))]
    pub async fn create_job(&self, payload: Value) -> Result<Job, ApplicationError> {
        let mut job = Job::from_payload(payload)?;
        job.mark_as_new_posting();
        self.gateway.append(job).await
    }

    #[instrument(skip(self, patch), fields(id = %id))]
    pub async fn update_job(&self, id: &RecordId, patch: Value) -> Result<Job, ApplicationError> {
        let fields = patch_fields(patch)?;
        self.gateway.patch(id, &fields).await
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_job(&self, id: &RecordId) -> Result<Job, ApplicationError> {
        self.gateway.remove(id).await
    }

    pub async fn featured_jobs(&self) -> Result<Vec<Job>, ApplicationError> {
        let store = self.gateway.load().await?;
        Ok(query::featured_jobs(&store.jobs))
    }

    pub async fn locations(&self) -> Result<Vec<String>, ApplicationError> {
        let store = self.gateway.load().await?;
        Ok(query::distinct_locations(&store.jobs))
    }

    pub async fn experience_levels(&self) -> Result<Vec<String>, ApplicationError> {
        let store = self.gateway.load().await?;
        Ok(query::distinct_experience_levels(&store.jobs))
    }

    /// Jobs sharing a category with job `id` (or with `category`, when given).
    ///
    /// Never fails: an unknown job, a job without category or a storage error
    /// all yield an empty list.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn similar_jobs(&self, id: &RecordId, category: Option<String>) -> Vec<Job> {
        let store = match self.gateway.load().await {
            Ok(store) => store,
            Err(e) => {
                warn!("Similar jobs unavailable: {}", e);
                return Vec::new();
            }
        };

        let category = category.filter(|c| !c.trim().is_empty()).or_else(|| {
            store
                .jobs
                .iter()
                .find(|job| &job.id == id)
                .and_then(|job| job.category.value().cloned())
        });
        match category {
            Some(category) => query::similar_jobs(&store.jobs, &category, id),
            None => {
                warn!("Similar jobs unavailable: no category for job");
                Vec::new()
            }
        }
    }
}

// --- Sectors ---

pub struct SectorService {
    gateway: Arc<PersistenceGateway>,
}

impl SectorService {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self { gateway }
    }

    pub async fn list_sectors(&self) -> Result<Vec<Sector>, ApplicationError> {
        Ok(self.gateway.load().await?.sectors)
    }

    #[instrument(skip(self, payload))]
    pub async fn create_sector(&self, payload: Value) -> Result<Sector, ApplicationError> {
        let sector = Sector::from_payload(payload)?;
        self.gateway.append(sector).await
    }

    #[instrument(skip(self, patch), fields(id = %id))]
    pub async fn update_sector(
        &self,
        id: &RecordId,
        patch: Value,
    ) -> Result<Sector, ApplicationError> {
        let fields = patch_fields(patch)?;
        self.gateway.patch(id, &fields).await
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_sector(&self, id: &RecordId) -> Result<Sector, ApplicationError> {
        self.gateway.remove(id).await
    }
}

// --- Users ---

/// User accounts. Every value returned from here is redacted.
pub struct UserService {
    gateway: Arc<PersistenceGateway>,
}

impl UserService {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self { gateway }
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, ApplicationError> {
        let store = self.gateway.load().await?;
        Ok(store.users.iter().map(User::redacted).collect())
    }

    /// Lookup by exact email; `None` when no user has it.
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>, ApplicationError> {
        let store = self.gateway.load().await?;
        let query = UserQuery {
            email: Some(email.to_string()),
        };
        Ok(query::filter_users(&store.users, &query)
            .first()
            .map(User::redacted))
    }

    #[instrument(skip(self, payload))]
    pub async fn create_user(&self, payload: Value) -> Result<UserProfile, ApplicationError> {
        let user = User::from_payload(payload)?;
        let created = self.gateway.append(user).await?;
        Ok(created.redacted())
    }

    #[instrument(skip(self, patch), fields(id = %id))]
    pub async fn update_user(
        &self,
        id: &RecordId,
        patch: Value,
    ) -> Result<UserProfile, ApplicationError> {
        let fields = patch_fields(patch)?;
        let updated: User = self.gateway.patch(id, &fields).await?;
        Ok(updated.redacted())
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_user(&self, id: &RecordId) -> Result<UserProfile, ApplicationError> {
        let removed: User = self.gateway.remove(id).await?;
        Ok(removed.redacted())
    }
}

// --- Applications ---

/// Job applications. One per applicant email per job.
pub struct ApplicationService {
    gateway: Arc<PersistenceGateway>,
}

impl ApplicationService {
    pub fn new(gateway: Arc<PersistenceGateway>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self))]
    pub async fn list_applications(
        &self,
        query: &ApplicationQuery,
    ) -> Result<Vec<Application>, ApplicationError> {
        let store = self.gateway.load().await?;
        Ok(query::filter_applications(&store.applications, query))
    }

    #[instrument(skip(self, payload))]
    pub async fn submit_application(
        &self,
        payload: Value,
    ) -> Result<Application, ApplicationError> {
        let application = Application::from_payload(payload)?.submit(now_timestamp())?;
        info!(job_id = ?application.job_id_str(), "Submitting application");
        self.gateway.append(application).await
    }

    /// Merge-patch that also stamps `updatedAt`. Status values are free-form.
    #[instrument(skip(self, patch), fields(id = %id))]
    pub async fn update_application(
        &self,
        id: &RecordId,
        patch: Value,
    ) -> Result<Application, ApplicationError> {
        let mut fields = patch_fields(patch)?;
        fields.insert("updatedAt".to_string(), Value::String(now_timestamp()));
        self.gateway.patch(id, &fields).await
    }

    #[instrument(skip(self), fields(id = %id))]
    pub async fn withdraw_application(
        &self,
        id: &RecordId,
    ) -> Result<Application, ApplicationError> {
        self.gateway.remove(id).await
    }
}
