use application::{
    ApplicationQuery, ApplicationService, JobListParams, JobQuery, JobService,
    PersistenceGateway, SectorService, StoreBackend, UserQuery, UserService,
};
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json as JsonResponse, Response},
    routing::{get, put},
};
use domain::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::error::{error_response, map_application_error_to_response};

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    job_service: Arc<JobService>,
    sector_service: Arc<SectorService>,
    user_service: Arc<UserService>,
    application_service: Arc<ApplicationService>,
}

impl AppState {
    /// Wires every service onto a single gateway over `backend`.
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        let gateway = Arc::new(PersistenceGateway::new(backend));
        Self {
            job_service: Arc::new(JobService::new(gateway.clone())),
            sector_service: Arc::new(SectorService::new(gateway.clone())),
            user_service: Arc::new(UserService::new(gateway.clone())),
            application_service: Arc::new(ApplicationService::new(gateway)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Jobs
        .route("/jobs", get(list_jobs_handler).post(create_job_handler))
        .route("/jobs/featured", get(featured_jobs_handler))
        .route("/jobs/locations", get(job_locations_handler))
        .route("/jobs/experience-levels", get(experience_levels_handler))
        .route(
            "/jobs/:id",
            get(get_job_handler)
                .put(update_job_handler)
                .patch(update_job_handler)
                .delete(delete_job_handler),
        )
        .route("/jobs/:id/similar", get(similar_jobs_handler))
        // Sectors
        .route(
            "/sectors",
            get(list_sectors_handler).post(create_sector_handler),
        )
        .route(
            "/sectors/:id",
            put(update_sector_handler)
                .patch(update_sector_handler)
                .delete(delete_sector_handler),
        )
        // Users
        .route("/users", get(list_users_handler).post(create_user_handler))
        .route(
            "/users/:id",
            put(update_user_handler)
                .patch(update_user_handler)
                .delete(delete_user_handler),
        )
        // Applications
        .route(
            "/applications",
            get(list_applications_handler).post(submit_application_handler),
        )
        .route(
            "/applications/:id",
            put(update_application_handler)
                .patch(update_application_handler)
                .delete(withdraw_application_handler),
        )
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// --- Extraction helpers ---

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, Response> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", rejection.body_text()),
            ))
        }
    }
}

fn query_params<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    match params {
        Ok(Query(value)) => Ok(value),
        Err(rejection) => {
            warn!("Rejected query string: {}", rejection.body_text());
            Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid query string: {}", rejection.body_text()),
            ))
        }
    }
}

fn ok_json<T: Serialize>(status: StatusCode, value: T) -> Response {
    (status, JsonResponse(value)).into_response()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// --- API Handlers ---

async fn health_check() -> impl IntoResponse {
    info!("Health check endpoint called");
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        "OK",
    )
}

// --- Job Handlers ---

/// GET /jobs. With `?id=` this is a single-record lookup answering the record or `null`.
async fn list_jobs_handler(
    State(state): State<AppState>,
    params: Result<Query<JobListParams>, QueryRejection>,
) -> Response {
    let mut params = match query_params(params) {
        Ok(params) => params,
        Err(response) => return response,
    };

    if let Some(id) = non_blank(params.id.take()) {
        info!(job_id = %id, "Received job lookup by id");
        return match state.job_service.get_job(&RecordId::new(id)).await {
            Ok(job) => ok_json(StatusCode::OK, job),
            Err(e) => {
                error!("Failed to look up job via handler: {}", e);
                map_application_error_to_response(e)
            }
        };
    }

    let query = match JobQuery::try_from(params) {
        Ok(query) => query,
        Err(e) => {
            warn!("Rejected job query: {}", e);
            return map_application_error_to_response(e);
        }
    };
    info!(
        category = ?query.category,
        featured = ?query.featured,
        location = ?query.location,
        experience_level = ?query.experience_level,
        limit = ?query.limit,
        search_terms = query.search.len(),
        "Received request to list jobs"
    );
    match state.job_service.list_jobs(&query).await {
        Ok(jobs) => {
            info!("Job listing returned {} jobs", jobs.len());
            ok_json(StatusCode::OK, jobs)
        }
        Err(e) => {
            error!("Failed to list jobs via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// GET /jobs/:id. A missing job is `200 null`, unlike update and delete.
async fn get_job_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    info!(job_id = %id, "Received request to get job");
    match state.job_service.get_job(&RecordId::new(id)).await {
        Ok(job) => ok_json(StatusCode::OK, job),
        Err(e) => {
            error!("Failed to get job via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn create_job_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let payload = match json_body(body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    info!("Received request to create job");
    match state.job_service.create_job(payload).await {
        Ok(job) => {
            info!(job_id = %job.id, "Job created successfully via handler");
            ok_json(StatusCode::CREATED, job)
        }
        Err(e) => {
            error!("Failed to create job via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn update_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let patch = match json_body(body) {
        Ok(patch) => patch,
        Err(response) => return response,
    };
    info!(job_id = %id, "Received request to update job");
    match state.job_service.update_job(&RecordId::new(id), patch).await {
        Ok(job) => ok_json(StatusCode::OK, job),
        Err(e) => {
            error!("Failed to update job via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn delete_job_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    info!(job_id = %id, "Received request to delete job");
    match state.job_service.delete_job(&RecordId::new(id)).await {
        Ok(job) => {
            info!(job_id = %job.id, "Job deleted successfully via handler");
            ok_json(StatusCode::OK, job)
        }
        Err(e) => {
            error!("Failed to delete job via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn featured_jobs_handler(State(state): State<AppState>) -> Response {
    match state.job_service.featured_jobs().await {
        Ok(jobs) => ok_json(StatusCode::OK, jobs),
        Err(e) => {
            error!("Failed to load featured jobs via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn job_locations_handler(State(state): State<AppState>) -> Response {
    match state.job_service.locations().await {
        Ok(locations) => ok_json(StatusCode::OK, locations),
        Err(e) => {
            error!("Failed to load job locations via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn experience_levels_handler(State(state): State<AppState>) -> Response {
    match state.job_service.experience_levels().await {
        Ok(levels) => ok_json(StatusCode::OK, levels),
        Err(e) => {
            error!("Failed to load experience levels via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

#[derive(Deserialize, Debug, Default)]
struct SimilarJobsParams {
    category: Option<String>,
}

/// GET /jobs/:id/similar. Always 200; degrades to an empty list.
async fn similar_jobs_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Option<Query<SimilarJobsParams>>,
) -> Response {
    let category = params.and_then(|Query(params)| params.category);
    let jobs = state
        .job_service
        .similar_jobs(&RecordId::new(id), category)
        .await;
    ok_json(StatusCode::OK, jobs)
}

// --- Sector Handlers ---

async fn list_sectors_handler(State(state): State<AppState>) -> Response {
    match state.sector_service.list_sectors().await {
        Ok(sectors) => ok_json(StatusCode::OK, sectors),
        Err(e) => {
            error!("Failed to list sectors via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn create_sector_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let payload = match json_body(body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    match state.sector_service.create_sector(payload).await {
        Ok(sector) => {
            info!(sector_id = %sector.id, "Sector created successfully via handler");
            ok_json(StatusCode::CREATED, sector)
        }
        Err(e) => {
            error!("Failed to create sector via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn update_sector_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let patch = match json_body(body) {
        Ok(patch) => patch,
        Err(response) => return response,
    };
    match state
        .sector_service
        .update_sector(&RecordId::new(id), patch)
        .await
    {
        Ok(sector) => ok_json(StatusCode::OK, sector),
        Err(e) => {
            error!("Failed to update sector via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn delete_sector_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.sector_service.delete_sector(&RecordId::new(id)).await {
        Ok(sector) => ok_json(StatusCode::OK, sector),
        Err(e) => {
            error!("Failed to delete sector via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

// --- User Handlers ---

/// GET /users. With `?email=` answers the single matching profile or `null`.
async fn list_users_handler(
    State(state): State<AppState>,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> Response {
    let params = match query_params(params) {
        Ok(params) => params,
        Err(response) => return response,
    };

    let result = match non_blank(params.email) {
        Some(email) => {
            info!("Received user lookup by email");
            state
                .user_service
                .find_by_email(&email)
                .await
                .map(|user| ok_json(StatusCode::OK, user))
        }
        None => state
            .user_service
            .list_users()
            .await
            .map(|users| ok_json(StatusCode::OK, users)),
    };
    result.unwrap_or_else(|e| {
        error!("Failed to list users via handler: {}", e);
        map_application_error_to_response(e)
    })
}

async fn create_user_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let payload = match json_body(body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    match state.user_service.create_user(payload).await {
        Ok(user) => {
            info!(user_id = %user.id, "User created successfully via handler");
            ok_json(StatusCode::CREATED, user)
        }
        Err(e) => {
            warn!("Failed to create user via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn update_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let patch = match json_body(body) {
        Ok(patch) => patch,
        Err(response) => return response,
    };
    match state.user_service.update_user(&RecordId::new(id), patch).await {
        Ok(user) => ok_json(StatusCode::OK, user),
        Err(e) => {
            warn!("Failed to update user via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn delete_user_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.user_service.delete_user(&RecordId::new(id)).await {
        Ok(user) => ok_json(StatusCode::OK, user),
        Err(e) => {
            error!("Failed to delete user via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

// --- Application Handlers ---

async fn list_applications_handler(
    State(state): State<AppState>,
    params: Result<Query<ApplicationQuery>, QueryRejection>,
) -> Response {
    let query = match query_params(params) {
        Ok(query) => query,
        Err(response) => return response,
    };
    info!(job_id = ?query.job_id, "Received request to list applications");
    match state.application_service.list_applications(&query).await {
        Ok(applications) => ok_json(StatusCode::OK, applications),
        Err(e) => {
            error!("Failed to list applications via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn submit_application_handler(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let payload = match json_body(body) {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    match state.application_service.submit_application(payload).await {
        Ok(application) => {
            info!(application_id = %application.id, "Application submitted via handler");
            ok_json(StatusCode::CREATED, application)
        }
        Err(e) => {
            warn!("Failed to submit application via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn update_application_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let patch = match json_body(body) {
        Ok(patch) => patch,
        Err(response) => return response,
    };
    match state
        .application_service
        .update_application(&RecordId::new(id), patch)
        .await
    {
        Ok(application) => ok_json(StatusCode::OK, application),
        Err(e) => {
            warn!("Failed to update application via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn withdraw_application_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state
        .application_service
        .withdraw_application(&RecordId::new(id))
        .await
    {
        Ok(application) => ok_json(StatusCode::OK, application),
        Err(e) => {
            error!("Failed to withdraw application via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}
