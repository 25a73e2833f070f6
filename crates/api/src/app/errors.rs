use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use staydesk_infra::GuestError;

pub fn guest_error_to_response(err: GuestError) -> axum::response::Response {
    match err {
        GuestError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "guest not found"),
        GuestError::InvalidState(msg) => json_error(StatusCode::CONFLICT, "invalid_state", msg),
        GuestError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        GuestError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        GuestError::StoreUnavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", msg)
        }
        GuestError::Internal(msg) => {
            error!(error = %msg, "internal error while handling guest request");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
