use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use catalog::CatalogError;

use crate::state::{ErrorResponse, HealthResponse};

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn json_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_error(status, message).into_response()
}

pub fn json_ok_response() -> Response {
    Json(HealthResponse { status: "ok" }).into_response()
}

/// Maps catalog failures onto the API's status codes. Anything without a
/// dedicated status is an internal error.
pub fn catalog_error(err: CatalogError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        CatalogError::NotFound => StatusCode::NOT_FOUND,
        CatalogError::Conflict | CatalogError::ScanInProgress => StatusCode::CONFLICT,
        CatalogError::Forbidden => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.to_string())
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}
