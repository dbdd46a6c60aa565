use axum::extract::{Query, State};
use axum::Json;

use common::TrackRecord;

use crate::state::{AppState, JsonResult, PageQuery};
use crate::utils::catalog_error;

pub async fn list_tracks(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> JsonResult<Vec<TrackRecord>> {
    let tracks = state
        .catalog
        .list_tracks(query.limit.unwrap_or(0), query.page.unwrap_or(1))
        .map_err(catalog_error)?;
    Ok(Json(tracks))
}
