use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{ListRef, RepeatMode, TrackRecord};

use crate::player::{is_permutation_map, parse_shuffle_map};
use crate::store::{
    decode_value, encode_value, Catalog, CatalogError, PlaybackRow, ResolvedList, UserRow,
    USERS_TABLE,
};

pub const MAX_VOLUME: u32 = 100;

/// Partial playback-state write. Only fields that are present overwrite
/// the stored value; everything else is left as it was.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StateUpdate {
    pub list_id: Option<String>,
    pub idx: Option<i64>,
    pub shuffle_active: Option<bool>,
    pub shuffle_map: Option<String>,
    pub elapsed: Option<f64>,
    pub duration: Option<f64>,
    pub repeat: Option<RepeatMode>,
    pub volume: Option<u32>,
}

/// Fully resolved playback session as handed back to a client on login.
#[derive(Clone, Debug, Serialize)]
pub struct PlayerState {
    pub list: ListRef,
    pub tracks: Vec<TrackRecord>,
    pub idx: usize,
    pub shuffle_active: bool,
    pub shuffle_map: Vec<usize>,
    pub elapsed: f64,
    pub repeat: RepeatMode,
    pub volume: u32,
}

impl Catalog {
    /// Merges a partial update into the user's stored playback state.
    pub fn update_player_state(
        &self,
        user_id: &str,
        update: &StateUpdate,
    ) -> Result<(), CatalogError> {
        self.mutate_state(user_id, |state| {
            if let Some(list_id) = &update.list_id {
                state.list_id = Some(list_id.clone());
            }
            if let Some(idx) = update.idx {
                state.idx = Some(idx.max(0));
            }
            if let Some(active) = update.shuffle_active {
                state.shuffle_active = Some(active);
            }
            if let Some(map) = &update.shuffle_map {
                state.shuffle_map = Some(map.clone());
            }
            if let Some(elapsed) = update.elapsed {
                state.elapsed = Some(elapsed.max(0.0));
            }
            if let Some(duration) = update.duration {
                state.duration = Some(duration.max(0.0));
            }
            if let Some(repeat) = update.repeat {
                state.repeat = Some(repeat);
            }
            if let Some(volume) = update.volume {
                state.volume = Some(volume.min(MAX_VOLUME));
            }
        })
    }

    /// Resolves a bare list id as an album first, then a playlist.
    pub fn resolve_list(&self, list_id: &str) -> Result<Option<ResolvedList>, CatalogError> {
        match self.album_view(list_id) {
            Ok(album) => return Ok(Some(ResolvedList::Album(album))),
            Err(CatalogError::NotFound) => {}
            Err(err) => return Err(err),
        }
        match self.playlist_view(list_id) {
            Ok(playlist) => Ok(Some(ResolvedList::Playlist(playlist))),
            Err(CatalogError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Rebuilds the user's playback session from persisted state. When the
    /// saved list no longer resolves, the list id and its dependent index/
    /// shuffle fields are dropped while volume and repeat survive, and the
    /// session starts empty. A saved index outside the list is clamped,
    /// elapsed time is clamped to the current track, and a shuffle map
    /// that is not a permutation of the list is discarded.
    pub fn restore_player_state(
        &self,
        user_id: &str,
    ) -> Result<Option<PlayerState>, CatalogError> {
        let row = self.user_row(user_id)?;
        let state = row.state;

        let list_id = match state.list_id.as_deref() {
            Some(list_id) if !list_id.is_empty() => list_id.to_string(),
            _ => return Ok(None),
        };

        let resolved = match self.resolve_list(&list_id)? {
            Some(resolved) => resolved,
            None => {
                debug!("Dropping stale playback list {} for {}", list_id, user_id);
                self.drop_stale_list(user_id)?;
                return Ok(None);
            }
        };

        let list = resolved.list_ref();
        let tracks = resolved.into_tracks();
        if tracks.is_empty() {
            return Ok(None);
        }

        let idx = state
            .idx
            .unwrap_or(0)
            .clamp(0, tracks.len() as i64 - 1) as usize;

        let mut shuffle_active = state.shuffle_active.unwrap_or(false);
        let mut shuffle_map = state
            .shuffle_map
            .as_deref()
            .map(parse_shuffle_map)
            .unwrap_or_default();
        if shuffle_active && !is_permutation_map(&shuffle_map, tracks.len()) {
            debug!("Dropping invalid shuffle map for {}", user_id);
            shuffle_active = false;
            shuffle_map = Vec::new();
        }

        let duration = tracks[idx].duration_secs;
        let elapsed = state.elapsed.unwrap_or(0.0).clamp(0.0, duration);

        Ok(Some(PlayerState {
            list,
            tracks,
            idx,
            shuffle_active,
            shuffle_map,
            elapsed,
            repeat: state.repeat.unwrap_or_default(),
            volume: state.volume.unwrap_or(MAX_VOLUME).min(MAX_VOLUME),
        }))
    }

    /// Forgets the saved list and everything that only makes sense
    /// relative to it. Volume and repeat are user preferences, not list
    /// state, and are kept.
    fn drop_stale_list(&self, user_id: &str) -> Result<(), CatalogError> {
        self.mutate_state(user_id, |state| {
            state.list_id = None;
            state.idx = None;
            state.shuffle_active = None;
            state.shuffle_map = None;
            state.elapsed = None;
            state.duration = None;
        })
    }

    fn mutate_state(
        &self,
        user_id: &str,
        apply: impl FnOnce(&mut PlaybackRow),
    ) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut users = write_txn.open_table(USERS_TABLE)?;
            let mut row = match users.get(user_id)? {
                Some(guard) => decode_value::<UserRow>(guard.value())?,
                None => return Err(CatalogError::NotFound),
            };
            apply(&mut row.state);
            users.insert(user_id, encode_value(&row)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
