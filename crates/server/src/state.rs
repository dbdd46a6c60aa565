use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use catalog::{Catalog, CoverStore, ScanCoordinator, ScanEvent};
use common::User;

use crate::auth::SessionStore;
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub covers: CoverStore,
    pub sessions: SessionStore,
    pub scans: Arc<ScanCoordinator>,
    pub scan_events: broadcast::Sender<ScanEvent>,
    pub config_path: PathBuf,
    pub config: Arc<RwLock<ServerConfig>>,
}

/// Authenticated user attached to the request by the auth middleware.
#[derive(Clone)]
pub struct AuthContext {
    pub user: User,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AlbumsQuery {
    pub limit: Option<usize>,
    pub page: Option<usize>,
    pub with_tracks: Option<bool>,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub display_name: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: u64,
    pub token_type: &'static str,
    pub user: User,
}

#[derive(Deserialize)]
pub struct CreatePlaylistRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AddTrackRequest {
    pub track_id: String,
}

#[derive(Deserialize)]
pub struct ReorderRequest {
    pub track_ids: Vec<String>,
}

/// Body for the skip-forward transition. A natural track end is not a
/// user-initiated skip and keeps `repeat=one` pinned in place.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ForwardRequest {
    pub user_initiated: Option<bool>,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
