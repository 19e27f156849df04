use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as JsonResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

/// Body of every error response.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub message: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        JsonResponse(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

/// Maps an ApplicationError to an HTTP status code and a `{"message"}` body.
pub fn map_application_error_to_response(err: ApplicationError) -> Response {
    let (status, message) = match err {
        ApplicationError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
        ApplicationError::DomainError(domain_err) => {
            warn!("Domain validation failed: {}", domain_err);
            (StatusCode::BAD_REQUEST, domain_err.to_string())
        }
        ApplicationError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        ApplicationError::NotFound { collection, .. } => (
            StatusCode::NOT_FOUND,
            format!("{} not found", collection.record_label()),
        ),
        ApplicationError::StorageUnavailable(msg) => {
            error!("Store unavailable: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    };
    error_response(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Collection, DomainError};

    #[test]
    fn status_codes_follow_the_error_taxonomy() {
        let cases = [
            (
                ApplicationError::InvalidInput("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApplicationError::DomainError(DomainError::MissingFields(vec!["email".into()])),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApplicationError::Conflict("dup".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                ApplicationError::NotFound {
                    collection: Collection::Users,
                    id: "u1".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ApplicationError::StorageUnavailable("disk on fire".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(map_application_error_to_response(err).status(), expected);
        }
    }
}
