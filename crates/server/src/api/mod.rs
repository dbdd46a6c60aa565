pub mod albums;
pub mod auth;
pub mod library;
pub mod player;
pub mod playlists;
pub mod tracks;

use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};

use crate::state::{AppState, AuthContext, HealthResponse};
use crate::utils::{extract_token, json_error_response};

pub fn api_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/albums", get(albums::list_albums))
        .route("/albums/:album_id", get(albums::get_album))
        .route("/tracks", get(tracks::list_tracks))
        .route("/playlists", get(playlists::list_playlists))
        .route("/playlists", post(playlists::create_playlist))
        .route("/playlists/:playlist_id", get(playlists::get_playlist))
        .route("/playlists/:playlist_id", delete(playlists::delete_playlist))
        .route("/playlists/:playlist_id/tracks", post(playlists::add_track))
        .route(
            "/playlists/:playlist_id/tracks/:track_id",
            delete(playlists::remove_track),
        )
        .route("/playlists/:playlist_id/order", post(playlists::reorder))
        .route("/library/scan", post(library::start_scan))
        .route("/player/state", get(player::get_state))
        .route("/player/state", post(player::update_state))
        .route("/player/next", post(player::next))
        .route("/player/previous", post(player::previous))
        .route("/player/shuffle", post(player::toggle_shuffle))
        .route("/player/repeat", post(player::cycle_repeat))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/library/updates", get(library::updates))
        .merge(auth_routes)
        .merge(protected)
        .with_state(state)
}

async fn require_auth(
    State(state): State<AppState>,
    mut req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_token(req.headers()) {
        Some(token) => token,
        None => return json_error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
    };

    let user_id = match state.sessions.user_id_from_token(&token) {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return json_error_response(StatusCode::UNAUTHORIZED, "unauthorized"),
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("auth error: {}", err),
            )
        }
    };

    match state.catalog.get_user(&user_id) {
        Ok(user) => {
            req.extensions_mut().insert(AuthContext { user });
            next.run(req).await
        }
        Err(catalog::CatalogError::NotFound) => {
            json_error_response(StatusCode::UNAUTHORIZED, "unauthorized")
        }
        Err(err) => json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("auth error: {}", err),
        ),
    }
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
