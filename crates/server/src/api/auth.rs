use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    Extension, Json,
};

use catalog::CatalogError;
use common::User;

use crate::state::{
    AppState, AuthContext, JsonResult, LoginRequest, LoginResponse, RegisterRequest,
};
use crate::utils::{catalog_error, extract_token, json_error, json_error_response, json_ok_response};

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> JsonResult<LoginResponse> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "username and password are required",
        ));
    }
    let display_name = if payload.display_name.trim().is_empty() {
        payload.username.trim()
    } else {
        payload.display_name.trim()
    };

    let user = state
        .catalog
        .create_user(display_name, &payload.username, &payload.password)
        .map_err(|err| match err {
            CatalogError::Conflict => json_error(StatusCode::CONFLICT, "username already taken"),
            other => catalog_error(other),
        })?;

    let session = state
        .sessions
        .create_session(&user.id)
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        token_type: "Bearer",
        user,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> JsonResult<LoginResponse> {
    let user = match state
        .catalog
        .verify_credentials(&payload.username, &payload.password)
    {
        Ok(user) => user,
        Err(CatalogError::NotFound) => {
            return Err(json_error(StatusCode::UNAUTHORIZED, "invalid credentials"))
        }
        Err(err) => return Err(catalog_error(err)),
    };

    let session = state
        .sessions
        .create_session(&user.id)
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        token_type: "Bearer",
        user,
    }))
}

pub async fn me(Extension(auth): Extension<AuthContext>) -> Json<User> {
    Json(auth.user)
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = match extract_token(&headers) {
        Some(token) => token,
        None => return json_error_response(StatusCode::BAD_REQUEST, "missing token"),
    };

    if let Err(err) = state.sessions.revoke_session(&token) {
        return json_error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
    }
    json_ok_response()
}
