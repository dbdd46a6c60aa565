use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use common::{PlaylistSummary, PlaylistView};

use crate::state::{
    AddTrackRequest, AppState, AuthContext, CreatePlaylistRequest, JsonResult, PageQuery,
    ReorderRequest,
};
use crate::utils::{catalog_error, json_error, json_ok_response};

pub async fn list_playlists(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> JsonResult<Vec<PlaylistSummary>> {
    let playlists = state
        .catalog
        .list_playlists(query.limit.unwrap_or(0), query.page.unwrap_or(1))
        .map_err(catalog_error)?;
    Ok(Json(playlists))
}

pub async fn get_playlist(
    State(state): State<AppState>,
    Path(playlist_id): Path<String>,
) -> JsonResult<PlaylistView> {
    let playlist = state
        .catalog
        .playlist_view(&playlist_id)
        .map_err(catalog_error)?;
    Ok(Json(playlist))
}

pub async fn create_playlist(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreatePlaylistRequest>,
) -> JsonResult<PlaylistSummary> {
    if payload.name.trim().is_empty() {
        return Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "playlist name is required",
        ));
    }
    let playlist = state
        .catalog
        .create_playlist(&state.covers, &auth.user.id, &payload.name)
        .map_err(catalog_error)?;
    Ok(Json(playlist))
}

pub async fn add_track(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(playlist_id): Path<String>,
    Json(payload): Json<AddTrackRequest>,
) -> JsonResult<PlaylistView> {
    state
        .catalog
        .add_playlist_track(&state.covers, &playlist_id, &auth.user.id, &payload.track_id)
        .map_err(catalog_error)?;
    let playlist = state
        .catalog
        .playlist_view(&playlist_id)
        .map_err(catalog_error)?;
    Ok(Json(playlist))
}

pub async fn remove_track(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((playlist_id, track_id)): Path<(String, String)>,
) -> JsonResult<PlaylistView> {
    state
        .catalog
        .remove_playlist_track(&state.covers, &playlist_id, &auth.user.id, &track_id)
        .map_err(catalog_error)?;
    let playlist = state
        .catalog
        .playlist_view(&playlist_id)
        .map_err(catalog_error)?;
    Ok(Json(playlist))
}

pub async fn reorder(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(playlist_id): Path<String>,
    Json(payload): Json<ReorderRequest>,
) -> JsonResult<PlaylistView> {
    state
        .catalog
        .reorder_playlist(&state.covers, &playlist_id, &auth.user.id, &payload.track_ids)
        .map_err(catalog_error)?;
    let playlist = state
        .catalog
        .playlist_view(&playlist_id)
        .map_err(catalog_error)?;
    Ok(Json(playlist))
}

pub async fn delete_playlist(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(playlist_id): Path<String>,
) -> Response {
    match state
        .catalog
        .delete_playlist(&state.covers, &playlist_id, &auth.user.id)
    {
        Ok(()) => json_ok_response(),
        Err(err) => catalog_error(err).into_response(),
    }
}
