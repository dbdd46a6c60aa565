use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use common::AlbumView;

use crate::state::{AlbumsQuery, AppState, JsonResult};
use crate::utils::catalog_error;

/// Album listing. `with_tracks=true` switches from summary rows to full
/// album views with their track lists inlined.
pub async fn list_albums(
    State(state): State<AppState>,
    Query(query): Query<AlbumsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(0);
    let page = query.page.unwrap_or(1);
    let result = if query.with_tracks.unwrap_or(false) {
        state
            .catalog
            .list_album_views(limit, page)
            .map(|albums| Json(albums).into_response())
    } else {
        state
            .catalog
            .list_albums(limit, page)
            .map(|albums| Json(albums).into_response())
    };
    result.unwrap_or_else(|err| catalog_error(err).into_response())
}

pub async fn get_album(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
) -> JsonResult<AlbumView> {
    let album = state.catalog.album_view(&album_id).map_err(catalog_error)?;
    Ok(Json(album))
}
