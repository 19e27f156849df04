use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("Invalid field value for field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },
    #[error("Invalid {record} payload: {reason}")]
    InvalidRecord { record: String, reason: String },
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),
}

// --- Record ID ---

/// Identifier of a record within its collection.
///
/// Older documents may carry numeric ids; both forms are read and kept as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(serde_json::Number),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

// --- Collections & Store ---

/// The four named collections of the store document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Jobs,
    Sectors,
    Users,
    Applications,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Jobs,
        Collection::Sectors,
        Collection::Users,
        Collection::Applications,
    ];

    /// Top-level key of the collection in the store document.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Jobs => "jobs",
            Collection::Sectors => "sectors",
            Collection::Users => "users",
            Collection::Applications => "applications",
        }
    }

    /// Singular, human-readable record name used in messages.
    pub fn record_label(&self) -> &'static str {
        match self {
            Collection::Jobs => "Job",
            Collection::Sectors => "Sector",
            Collection::Users => "User",
            Collection::Applications => "Application",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The whole record store. Each collection keeps insertion order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Store {
    pub jobs: Vec<Job>,
    pub sectors: Vec<Sector>,
    pub users: Vec<User>,
    pub applications: Vec<Application>,
}

// --- Record Fields ---

/// A record field as found in the store document.
///
/// A missing key and an explicit `null` are different states, and a value of
/// the wrong JSON type is kept verbatim, so every field is written back exactly
/// as it was read.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Missing,
    Null,
    Value(T),
    /// Present, but not of the expected type.
    Mistyped(Value),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Missing
    }
}

impl<T> Field<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }

    pub fn is_mistyped(&self) -> bool {
        matches!(self, Field::Mistyped(_))
    }

    /// True when the field is missing, null or mistyped.
    pub fn is_unset(&self) -> bool {
        self.value().is_none()
    }

    pub fn as_deref(&self) -> Option<&T::Target>
    where
        T: Deref,
    {
        self.value().map(Deref::deref)
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Field::Missing | Field::Null => serializer.serialize_unit(),
            Field::Value(value) => value.serialize(serializer),
            Field::Mistyped(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        if raw.is_null() {
            return Ok(Field::Null);
        }
        Ok(match T::deserialize(&raw) {
            Ok(value) => Field::Value(value),
            Err(_) => Field::Mistyped(raw),
        })
    }
}

/// Names (as written in the document) of the mistyped fields among `fields`.
fn mistyped(fields: &[(&'static str, bool)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, mistyped)| *mistyped)
        .map(|(name, _)| *name)
        .collect()
}

fn mistyped_field_error(field: &str) -> DomainError {
    DomainError::InvalidFieldValue {
        field: field.to_string(),
        reason: "unexpected JSON type".to_string(),
    }
}

fn is_blank_text(field: &Field<String>) -> bool {
    field.as_deref().is_none_or(|text| text.trim().is_empty())
}

fn same_value<T: PartialEq>(a: &Field<T>, b: &Field<T>) -> bool {
    matches!((a.value(), b.value()), (Some(a), Some(b)) if a == b)
}

// --- Record Trait ---

/// Behaviour shared by every kind of stored record.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &RecordId;

    fn assign_id(&mut self, id: RecordId);

    fn collection(store: &Store) -> &Vec<Self>;

    fn collection_mut(store: &mut Store) -> &mut Vec<Self>;

    /// Checks fields that must be present for the record to be stored.
    fn validate(&self) -> Result<(), DomainError> {
        Ok(())
    }

    /// Known fields holding a value of the wrong JSON type, by document name.
    ///
    /// Such values load and save untouched, but a client may not write them.
    fn mistyped_fields(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// True when both records claim the same unique key (other than the id).
    fn conflicts_with(&self, _other: &Self) -> bool {
        false
    }

    fn conflict_message(&self) -> String {
        format!("{} already exists", Self::COLLECTION.record_label())
    }

    /// Builds a record from a client payload. Any `id` in the payload is discarded.
    fn from_payload(payload: Value) -> Result<Self, DomainError> {
        if !payload.is_object() {
            return Err(DomainError::InvalidRecord {
                record: Self::COLLECTION.record_label().to_string(),
                reason: "expected a JSON object".to_string(),
            });
        }
        let mut record: Self =
            serde_json::from_value(payload).map_err(|e| DomainError::InvalidRecord {
                record: Self::COLLECTION.record_label().to_string(),
                reason: e.to_string(),
            })?;
        if let Some(field) = record.mistyped_fields().first() {
            return Err(mistyped_field_error(field));
        }
        record.assign_id(RecordId::default());
        Ok(record)
    }

    /// Shallow merge: fields in `patch` overwrite, everything else is kept.
    /// The identifier never changes.
    fn merge_patch(&self, patch: &Map<String, Value>) -> Result<Self, DomainError> {
        let mut object = match serde_json::to_value(self) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                return Err(DomainError::InvalidPatch(format!(
                    "{} does not serialize to an object",
                    Self::COLLECTION.record_label()
                )));
            }
            Err(e) => return Err(DomainError::InvalidPatch(e.to_string())),
        };
        for (field, value) in patch {
            if field == "id" {
                continue;
            }
            object.insert(field.clone(), value.clone());
        }

        let mut merged: Self = serde_json::from_value(Value::Object(object))
            .map_err(|e| DomainError::InvalidPatch(e.to_string()))?;
        if let Some(field) = merged
            .mistyped_fields()
            .into_iter()
            .find(|field| patch.contains_key(*field))
        {
            return Err(mistyped_field_error(field));
        }
        merged.assign_id(self.id().clone());
        merged.validate()?;
        Ok(merged)
    }
}

// --- Job ---

pub const NEW_POSTING_LABEL: &str = "Just now";

/// A job posting.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub company: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub logo: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub new: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub featured: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub position: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub role: Field<String>,
    /// Experience level.
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub level: Field<String>,
    /// Display string ("Just now", "1d ago") or an ISO timestamp.
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub posted_at: Field<String>,
    /// Employment contract type.
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub contract: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub location: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub languages: Field<Vec<String>>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub tools: Field<Vec<String>>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub description: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub salary: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub category: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub category_link: Field<String>,
    /// Number of open positions.
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub slots: Field<u32>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub requirements: Field<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    pub fn is_featured(&self) -> bool {
        matches!(self.featured, Field::Value(true))
    }

    /// Resets the flags every freshly posted job starts with.
    pub fn mark_as_new_posting(&mut self) {
        self.new = Field::Value(true);
        self.featured = Field::Value(false);
        self.posted_at = Field::Value(NEW_POSTING_LABEL.to_string());
    }
}

impl Record for Job {
    const COLLECTION: Collection = Collection::Jobs;

    fn id(&self) -> &RecordId {
        &self.id
    }
    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }
    fn collection(store: &Store) -> &Vec<Self> {
        &store.jobs
    }
    fn collection_mut(store: &mut Store) -> &mut Vec<Self> {
        &mut store.jobs
    }

    fn mistyped_fields(&self) -> Vec<&'static str> {
        mistyped(&[
            ("company", self.company.is_mistyped()),
            ("logo", self.logo.is_mistyped()),
            ("new", self.new.is_mistyped()),
            ("featured", self.featured.is_mistyped()),
            ("position", self.position.is_mistyped()),
            ("role", self.role.is_mistyped()),
            ("level", self.level.is_mistyped()),
            ("postedAt", self.posted_at.is_mistyped()),
            ("contract", self.contract.is_mistyped()),
            ("location", self.location.is_mistyped()),
            ("languages", self.languages.is_mistyped()),
            ("tools", self.tools.is_mistyped()),
            ("description", self.description.is_mistyped()),
            ("salary", self.salary.is_mistyped()),
            ("category", self.category.is_mistyped()),
            ("categoryLink", self.category_link.is_mistyped()),
            ("slots", self.slots.is_mistyped()),
            ("requirements", self.requirements.is_mistyped()),
        ])
    }
}

// --- Sector ---

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sector {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub title: Field<String>,
    /// Icon reference understood by the presentation layer.
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub icon: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub link: Field<String>,
    /// Number of jobs in the sector.
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub count: Field<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Sector {
    const COLLECTION: Collection = Collection::Sectors;

    fn id(&self) -> &RecordId {
        &self.id
    }
    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }
    fn collection(store: &Store) -> &Vec<Self> {
        &store.sectors
    }
    fn collection_mut(store: &mut Store) -> &mut Vec<Self> {
        &mut store.sectors
    }

    fn mistyped_fields(&self) -> Vec<&'static str> {
        mistyped(&[
            ("title", self.title.is_mistyped()),
            ("icon", self.icon.is_mistyped()),
            ("link", self.link.is_mistyped()),
            ("count", self.count.is_mistyped()),
        ])
    }
}

// --- User ---

/// A registered user. `password` is stored but never leaves the service.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub email: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub password: Field<String>,
    /// Free-form profile fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Public view of a [`User`], without the credential.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: RecordId,
    #[serde(skip_serializing_if = "Field::is_missing")]
    pub email: Field<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn redacted(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            extra: self.extra.clone(),
        }
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &RecordId {
        &self.id
    }
    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }
    fn collection(store: &Store) -> &Vec<Self> {
        &store.users
    }
    fn collection_mut(store: &mut Store) -> &mut Vec<Self> {
        &mut store.users
    }

    fn validate(&self) -> Result<(), DomainError> {
        if is_blank_text(&self.email) {
            return Err(DomainError::MissingFields(vec!["email".to_string()]));
        }
        Ok(())
    }

    fn mistyped_fields(&self) -> Vec<&'static str> {
        mistyped(&[
            ("email", self.email.is_mistyped()),
            ("password", self.password.is_mistyped()),
        ])
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        same_value(&self.email, &other.email)
    }

    fn conflict_message(&self) -> String {
        "User already exists".to_string()
    }
}

// --- Application ---

pub const APPLICATION_STATUS_PENDING: &str = "pending";

/// A candidate's application to a job.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub job_id: Field<RecordId>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub email: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub first_name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub last_name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub cover_letter: Field<String>,
    /// Resume reference, any JSON value.
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub resume: Field<Value>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub applied_at: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub status: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub updated_at: Field<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Application {
    /// Prepares a new submission: stamps the submission time and resets the status.
    pub fn submit(mut self, applied_at: String) -> Result<Self, DomainError> {
        self.validate()?;
        self.applied_at = Field::Value(applied_at);
        self.status = Field::Value(APPLICATION_STATUS_PENDING.to_string());
        self.updated_at = Field::Missing;
        if self.cover_letter.is_unset() {
            self.cover_letter = Field::Value(String::new());
        }
        let blank_resume = match &self.resume {
            Field::Value(Value::String(text)) => text.trim().is_empty(),
            other => other.is_unset(),
        };
        if blank_resume {
            self.resume = Field::Null;
        }
        Ok(self)
    }

    pub fn job_id_str(&self) -> Option<&str> {
        self.job_id.value().map(RecordId::as_str)
    }
}

impl Record for Application {
    const COLLECTION: Collection = Collection::Applications;

    fn id(&self) -> &RecordId {
        &self.id
    }
    fn assign_id(&mut self, id: RecordId) {
        self.id = id;
    }
    fn collection(store: &Store) -> &Vec<Self> {
        &store.applications
    }
    fn collection_mut(store: &mut Store) -> &mut Vec<Self> {
        &mut store.applications
    }

    fn validate(&self) -> Result<(), DomainError> {
        let missing: Vec<String> = [
            (
                "jobId",
                self.job_id.value().is_none_or(RecordId::is_blank),
            ),
            ("firstName", is_blank_text(&self.first_name)),
            ("lastName", is_blank_text(&self.last_name)),
            ("email", is_blank_text(&self.email)),
        ]
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(field, _)| field.to_string())
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::MissingFields(missing))
        }
    }

    fn mistyped_fields(&self) -> Vec<&'static str> {
        mistyped(&[
            ("jobId", self.job_id.is_mistyped()),
            ("email", self.email.is_mistyped()),
            ("firstName", self.first_name.is_mistyped()),
            ("lastName", self.last_name.is_mistyped()),
            ("coverLetter", self.cover_letter.is_mistyped()),
            ("appliedAt", self.applied_at.is_mistyped()),
            ("status", self.status.is_mistyped()),
            ("updatedAt", self.updated_at.is_mistyped()),
        ])
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        same_value(&self.job_id, &other.job_id) && same_value(&self.email, &other.email)
    }

    fn conflict_message(&self) -> String {
        "You have already applied for this job".to_string()
    }
}
