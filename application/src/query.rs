//! Query/filter engine over in-memory collections.
//!
//! Job filters compose as a logical AND. Free-text search is a separate
//! dimension, also ANDed, applied after the filters; `limit` truncates last.
//! Source order is always preserved.

use domain::{Application, Field, Job, RecordId, User};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::trace;

use crate::ApplicationError;

/// Number of entries in the "featured" and "similar jobs" views.
pub const DERIVED_VIEW_SIZE: usize = 4;

const SEARCH_PARAM_PREFIX: &str = "search.";

// --- Request DTOs ---

/// Raw query-string parameters of a job listing request.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobListParams {
    /// Single-record lookup; bypasses every filter.
    pub id: Option<String>,
    pub category: Option<String>,
    pub featured: Option<String>,
    pub location: Option<String>,
    pub experience_level: Option<String>,
    pub limit: Option<String>,
    /// Keyword searched across every text field.
    pub q: Option<String>,
    /// Everything else; `search.<field>` entries become field searches.
    #[serde(flatten)]
    pub rest: HashMap<String, String>,
}

/// Job fields that free-text search can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Any,
    Position,
    Company,
    Role,
    Level,
    Contract,
    Location,
    Category,
    Description,
    Salary,
    Languages,
    Tools,
    Requirements,
}

impl SearchField {
    const TEXT_FIELDS: [SearchField; 12] = [
        SearchField::Position,
        SearchField::Company,
        SearchField::Role,
        SearchField::Level,
        SearchField::Contract,
        SearchField::Location,
        SearchField::Category,
        SearchField::Description,
        SearchField::Salary,
        SearchField::Languages,
        SearchField::Tools,
        SearchField::Requirements,
    ];

    /// Parses a field-name hint such as `position` or `experienceLevel`.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let field = match hint.trim().to_ascii_lowercase().as_str() {
            "any" | "q" | "keyword" => SearchField::Any,
            "position" | "title" => SearchField::Position,
            "company" => SearchField::Company,
            "role" => SearchField::Role,
            "level" | "experiencelevel" => SearchField::Level,
            "contract" => SearchField::Contract,
            "location" => SearchField::Location,
            "category" => SearchField::Category,
            "description" => SearchField::Description,
            "salary" => SearchField::Salary,
            "languages" => SearchField::Languages,
            "tools" => SearchField::Tools,
            "requirements" => SearchField::Requirements,
            _ => return None,
        };
        Some(field)
    }

    fn texts<'a>(&self, job: &'a Job) -> Vec<&'a str> {
        fn one(value: &Field<String>) -> Vec<&str> {
            value.as_deref().into_iter().collect()
        }
        fn many(values: &Field<Vec<String>>) -> Vec<&str> {
            values.value().into_iter().flatten().map(String::as_str).collect()
        }

        match self {
            SearchField::Any => Self::TEXT_FIELDS
                .iter()
                .flat_map(|field| field.texts(job))
                .collect(),
            SearchField::Position => one(&job.position),
            SearchField::Company => one(&job.company),
            SearchField::Role => one(&job.role),
            SearchField::Level => one(&job.level),
            SearchField::Contract => one(&job.contract),
            SearchField::Location => one(&job.location),
            SearchField::Category => one(&job.category),
            SearchField::Description => one(&job.description),
            SearchField::Salary => one(&job.salary),
            SearchField::Languages => many(&job.languages),
            SearchField::Tools => many(&job.tools),
            SearchField::Requirements => many(&job.requirements),
        }
    }
}

/// One free-text condition: `field` must contain `needle`, ignoring case.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTerm {
    pub field: SearchField,
    pub needle: String,
}

impl SearchTerm {
    pub fn new(field: SearchField, needle: impl Into<String>) -> Self {
        Self {
            field,
            needle: needle.into(),
        }
    }

    fn matches(&self, job: &Job) -> bool {
        let needle = self.needle.to_lowercase();
        self.field
            .texts(job)
            .iter()
            .any(|text| text.to_lowercase().contains(&needle))
    }
}

/// Validated job listing query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobQuery {
    pub category: Option<String>,
    pub featured: Option<bool>,
    pub location: Option<String>,
    pub experience_level: Option<String>,
    /// `None` means unlimited.
    pub limit: Option<usize>,
    pub search: Vec<SearchTerm>,
}

impl TryFrom<JobListParams> for JobQuery {
    type Error = ApplicationError;

    fn try_from(params: JobListParams) -> Result<Self, Self::Error> {
        let featured = match non_blank(params.featured) {
            None => None,
            Some(value) => Some(parse_bool("featured", &value)?),
        };
        let limit = match non_blank(params.limit) {
            None => None,
            Some(value) => parse_limit(&value)?,
        };

        let mut search = Vec::new();
        if let Some(keyword) = non_blank(params.q) {
            search.push(SearchTerm::new(SearchField::Any, keyword));
        }
        for (key, needle) in params.rest {
            let Some(hint) = key.strip_prefix(SEARCH_PARAM_PREFIX) else {
                continue;
            };
            let field = SearchField::from_hint(hint).ok_or_else(|| {
                ApplicationError::InvalidInput(format!("Unknown search field '{hint}'"))
            })?;
            if let Some(needle) = non_blank(Some(needle)) {
                search.push(SearchTerm::new(field, needle));
            }
        }

        Ok(JobQuery {
            category: non_blank(params.category),
            featured,
            location: non_blank(params.location),
            experience_level: non_blank(params.experience_level),
            limit,
            search,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(param: &str, value: &str) -> Result<bool, ApplicationError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ApplicationError::InvalidInput(format!(
            "Invalid value for '{param}': expected true or false, got '{value}'"
        ))),
    }
}

fn parse_limit(value: &str) -> Result<Option<usize>, ApplicationError> {
    let limit: i64 = value.parse().map_err(|_| {
        ApplicationError::InvalidInput(format!(
            "Invalid value for 'limit': expected an integer, got '{value}'"
        ))
    })?;
    if limit <= 0 {
        Ok(None)
    } else {
        Ok(Some(usize::try_from(limit).unwrap_or(usize::MAX)))
    }
}

fn same_text(stored: Option<&str>, wanted: &str) -> bool {
    stored.is_some_and(|s| s.to_lowercase() == wanted.to_lowercase())
}

impl JobQuery {
    fn matches_filters(&self, job: &Job) -> bool {
        if let Some(category) = &self.category {
            if !same_text(job.category.as_deref(), category) {
                return false;
            }
        }
        if let Some(featured) = self.featured {
            if job.is_featured() != featured {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if !same_text(job.location.as_deref(), location) {
                return false;
            }
        }
        if let Some(level) = &self.experience_level {
            if !same_text(job.level.as_deref(), level) {
                return false;
            }
        }
        true
    }

    fn matches_search(&self, job: &Job) -> bool {
        self.search.iter().all(|term| term.matches(job))
    }
}

// --- Job queries ---

/// Narrows `jobs` by every dimension of `query`.
pub fn filter_jobs(jobs: &[Job], query: &JobQuery) -> Vec<Job> {
    let matching = jobs
        .iter()
        .filter(|job| query.matches_filters(job))
        .filter(|job| query.matches_search(job))
        .take(query.limit.unwrap_or(usize::MAX))
        .cloned()
        .collect::<Vec<_>>();
    trace!(
        total = jobs.len(),
        returned = matching.len(),
        "Job filter applied"
    );
    matching
}

/// Featured jobs, first few in collection order.
pub fn featured_jobs(jobs: &[Job]) -> Vec<Job> {
    jobs.iter()
        .filter(|job| job.is_featured())
        .take(DERIVED_VIEW_SIZE)
        .cloned()
        .collect()
}

/// Distinct non-empty locations, in first-seen order.
pub fn distinct_locations(jobs: &[Job]) -> Vec<String> {
    distinct_values(jobs, |job| job.location.as_deref())
}

/// Distinct non-empty experience levels, in first-seen order.
pub fn distinct_experience_levels(jobs: &[Job]) -> Vec<String> {
    distinct_values(jobs, |job| job.level.as_deref())
}

fn distinct_values<'a, F>(jobs: &'a [Job], value_of: F) -> Vec<String>
where
    F: Fn(&'a Job) -> Option<&'a str>,
{
    let mut seen = HashSet::new();
    jobs.iter()
        .filter_map(value_of)
        .filter(|value| !value.trim().is_empty())
        .filter(|value| seen.insert(*value))
        .map(str::to_string)
        .collect()
}

/// Jobs in `category` other than `exclude`, first few in collection order.
pub fn similar_jobs(jobs: &[Job], category: &str, exclude: &RecordId) -> Vec<Job> {
    jobs.iter()
        .filter(|job| &job.id != exclude)
        .filter(|job| same_text(job.category.as_deref(), category))
        .take(DERIVED_VIEW_SIZE)
        .cloned()
        .collect()
}

// --- User & application queries ---

#[derive(Deserialize, Debug, Default, Clone)]
pub struct UserQuery {
    pub email: Option<String>,
}

pub fn filter_users(users: &[User], query: &UserQuery) -> Vec<User> {
    let email = non_blank(query.email.clone());
    users
        .iter()
        .filter(|user| {
            email
                .as_deref()
                .is_none_or(|email| user.email.as_deref() == Some(email))
        })
        .cloned()
        .collect()
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationQuery {
    pub job_id: Option<String>,
    pub email: Option<String>,
}

pub fn filter_applications(
    applications: &[Application],
    query: &ApplicationQuery,
) -> Vec<Application> {
    let job_id = non_blank(query.job_id.clone());
    let email = non_blank(query.email.clone());
    applications
        .iter()
        .filter(|app| {
            job_id
                .as_deref()
                .is_none_or(|job_id| app.job_id_str() == Some(job_id))
        })
        .filter(|app| {
            email
                .as_deref()
                .is_none_or(|email| app.email.as_deref() == Some(email))
        })
        .cloned()
        .collect()
}
