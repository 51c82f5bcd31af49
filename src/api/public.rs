//! Public API types

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;

use crate::google::CalendarError;

// Errors

/// An error response with a JSON body like `{"error": "Not authenticated"}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Not authenticated")
    }

    /// Maps a failed calendar operation to a response. `fallback` is
    /// used when there is no message worth showing to the user.
    pub fn calendar(err: CalendarError, fallback: &str) -> Self {
        let status = match &err {
            CalendarError::Unauthenticated | CalendarError::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            CalendarError::NotFound { .. } => StatusCode::NOT_FOUND,
            CalendarError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CalendarError::Upstream { .. } | CalendarError::Http(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = err.user_message().unwrap_or_else(|| fallback.to_string());
        tracing::debug!("Calendar operation failed: {:?}", err);
        Self { status, message }
    }
}

/// Convert `ApiError` into an Axum compatible response.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}", self.message);
        } else {
            tracing::warn!("{} {}", self.status, self.message);
        }

        (self.status, Json(json!({"error": self.message}))).into_response()
    }
}

/// Enables using `?` on functions that return `Result<_,
/// anyhow::Error>` to turn them into `Result<_, ApiError>`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err: anyhow::Error = err.into();
        match err.downcast::<CalendarError>() {
            Ok(err) => Self::calendar(err, "Something went wrong"),
            Err(err) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Something went wrong: {}", err),
            ),
        }
    }
}

// Re-export public types from each route

pub mod calendar {
    pub use crate::api::routes::calendar::public::*;
}

pub mod ai {
    pub use crate::api::routes::ai::public::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_error_status() {
        let err = ApiError::calendar(
            CalendarError::NotFound {
                event_id: "evt1".to_string(),
            },
            "Failed to delete event",
        );
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Event evt1 not found");

        let err = ApiError::calendar(CalendarError::Unauthenticated, "Failed to fetch events");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "Not authenticated");
    }

    #[test]
    fn test_calendar_error_fallback_message() {
        let err = ApiError::calendar(
            CalendarError::Upstream {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: None,
            },
            "Failed to create event",
        );
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Failed to create event");

        let err = ApiError::calendar(
            CalendarError::Upstream {
                status: StatusCode::FORBIDDEN,
                message: Some("Insufficient Permission".to_string()),
            },
            "Failed to create event",
        );
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Insufficient Permission");
    }

    #[test]
    fn test_from_anyhow_keeps_calendar_errors() {
        let err: ApiError = anyhow::Error::from(CalendarError::InvalidRequest(
            "Event title is required".to_string(),
        ))
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = anyhow::anyhow!("boom").into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Something went wrong: boom");
    }
}
