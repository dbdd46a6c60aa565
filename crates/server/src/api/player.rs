use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};
use rand::thread_rng;

use catalog::player::{
    build_shuffle_map, format_shuffle_map, forward, previous as previous_index, unshuffled_index,
};
use catalog::{PlayerState, StateUpdate};

use crate::state::{AppState, AuthContext, ErrorResponse, ForwardRequest, JsonResult};
use crate::utils::{catalog_error, json_error, json_ok_response};

pub async fn get_state(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> JsonResult<Option<PlayerState>> {
    let player = state
        .catalog
        .restore_player_state(&auth.user.id)
        .map_err(catalog_error)?;
    Ok(Json(player))
}

pub async fn update_state(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<StateUpdate>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    state
        .catalog
        .update_player_state(&auth.user.id, &payload)
        .map_err(catalog_error)?;
    Ok(json_ok_response())
}

/// Skip forward. A natural track end (`user_initiated: false`) keeps
/// `repeat=one` pinned to the same track; an explicit skip advances.
pub async fn next(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<ForwardRequest>,
) -> JsonResult<PlayerState> {
    let mut player = active_state(&state, &auth.user.id)?;
    let user_initiated = payload.user_initiated.unwrap_or(true);
    let idx = forward(
        player.idx,
        player.tracks.len(),
        player.repeat,
        user_initiated,
    );
    persist_position(&state, &auth.user.id, idx)?;
    player.idx = idx;
    player.elapsed = 0.0;
    Ok(Json(player))
}

pub async fn previous(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> JsonResult<PlayerState> {
    let mut player = active_state(&state, &auth.user.id)?;
    let idx = previous_index(player.idx, player.tracks.len(), player.repeat);
    persist_position(&state, &auth.user.id, idx)?;
    player.idx = idx;
    player.elapsed = 0.0;
    Ok(Json(player))
}

/// Turning shuffle on pins the playing track at position 0 of a fresh
/// random map; turning it off lands back on the same track's real index.
pub async fn toggle_shuffle(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> JsonResult<PlayerState> {
    let mut player = active_state(&state, &auth.user.id)?;

    if player.shuffle_active {
        let idx = unshuffled_index(&player.shuffle_map, player.idx);
        state
            .catalog
            .update_player_state(
                &auth.user.id,
                &StateUpdate {
                    idx: Some(idx as i64),
                    shuffle_active: Some(false),
                    shuffle_map: Some(String::new()),
                    ..Default::default()
                },
            )
            .map_err(catalog_error)?;
        player.idx = idx;
        player.shuffle_active = false;
        player.shuffle_map = Vec::new();
    } else {
        let map = build_shuffle_map(player.tracks.len(), player.idx, &mut thread_rng());
        state
            .catalog
            .update_player_state(
                &auth.user.id,
                &StateUpdate {
                    idx: Some(0),
                    shuffle_active: Some(true),
                    shuffle_map: Some(format_shuffle_map(&map)),
                    ..Default::default()
                },
            )
            .map_err(catalog_error)?;
        player.idx = 0;
        player.shuffle_active = true;
        player.shuffle_map = map;
    }

    Ok(Json(player))
}

pub async fn cycle_repeat(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> JsonResult<PlayerState> {
    let mut player = active_state(&state, &auth.user.id)?;
    let repeat = player.repeat.cycled();
    state
        .catalog
        .update_player_state(
            &auth.user.id,
            &StateUpdate {
                repeat: Some(repeat),
                ..Default::default()
            },
        )
        .map_err(catalog_error)?;
    player.repeat = repeat;
    Ok(Json(player))
}

fn active_state(
    state: &AppState,
    user_id: &str,
) -> Result<PlayerState, (StatusCode, Json<ErrorResponse>)> {
    match state.catalog.restore_player_state(user_id) {
        Ok(Some(player)) => Ok(player),
        Ok(None) => Err(json_error(
            StatusCode::NOT_FOUND,
            "no active playback session",
        )),
        Err(err) => Err(catalog_error(err)),
    }
}

fn persist_position(
    state: &AppState,
    user_id: &str,
    idx: usize,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    state
        .catalog
        .update_player_state(
            user_id,
            &StateUpdate {
                idx: Some(idx as i64),
                elapsed: Some(0.0),
                ..Default::default()
            },
        )
        .map_err(catalog_error)
}
