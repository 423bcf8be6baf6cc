use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use turnstile_core::CoreError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    Anyhow(anyhow::Error),
}

fn core_response(err: CoreError) -> Response {
    let (status, body) = match &err {
        CoreError::ValidationError(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
        CoreError::NotFoundError { entity, .. } => {
            (StatusCode::NOT_FOUND, json!({ "error": format!("{} not found", entity) }))
        }
        CoreError::CapacityExceeded { requested, remaining } => (
            StatusCode::CONFLICT,
            json!({
                "error": err.to_string(),
                "requested": requested,
                "remaining": remaining,
            }),
        ),
        CoreError::AlreadyPaid(_) => (StatusCode::CONFLICT, json!({ "error": "Payment already completed" })),
        CoreError::InvalidState { .. } => (StatusCode::CONFLICT, json!({ "error": err.to_string() })),
        CoreError::PaymentDeclined(_) => (StatusCode::PAYMENT_REQUIRED, json!({ "error": err.to_string() })),
        CoreError::TransactionFailure(msg) => {
            tracing::error!("Transaction failed: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
        }
    };

    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Anyhow(err) => match err.downcast::<CoreError>() {
                Ok(core) => return core_response(core),
                Err(err) => {
                    tracing::error!("Internal Server Error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                }
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: CoreError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_core_errors_map_to_status() {
        assert_eq!(status_of(CoreError::ValidationError("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::not_found("Booking", "b")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(CoreError::CapacityExceeded { requested: 3, remaining: 2 }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(CoreError::AlreadyPaid(uuid::Uuid::nil())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(CoreError::InvalidState { from: "a".into(), to: "b".into() }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(CoreError::PaymentDeclined("no".into())), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            status_of(CoreError::TransactionFailure("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_foreign_errors_are_internal() {
        let err = AppError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
