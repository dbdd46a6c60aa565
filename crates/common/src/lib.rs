use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of one track-id token inside a playlist's `track_order` string.
/// Tokens are hyphenated UUIDs concatenated without a separator, so the
/// sequence is recovered by re-splitting at fixed width.
pub const TRACK_TOKEN_LEN: usize = 36;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub artist_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub track_number: u16,
    pub disc_number: u16,
    pub year: i32,
    pub duration_secs: f64,
    pub cover_file: String,
    pub file_path: String,
    pub album_id: String,
}

/// Denormalized track row as surfaced to clients: the track's own fields
/// plus display fields joined from the album and artist tables. `artists`
/// is the ';'-delimited credit string in tag order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackRecord {
    pub track_id: String,
    pub title: String,
    pub track_number: u16,
    pub disc_number: u16,
    pub year: i32,
    pub duration_secs: f64,
    pub cover_file: String,
    pub file_path: String,
    pub album_id: String,
    pub album: String,
    pub album_artist: String,
    pub artists: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub year: i32,
    pub cover_file: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlbumView {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub year: i32,
    pub cover_file: String,
    pub tracks: Vec<TrackRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    pub owner: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistView {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub tracks: Vec<TrackRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub username: String,
}

/// Explicit reference to the list a playback session is bound to. The id
/// alone does not say which table it lives in; restore tries albums first,
/// then playlists, and carries the resolved variant from there on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum ListRef {
    Album(String),
    Playlist(String),
}

impl ListRef {
    pub fn id(&self) -> &str {
        match self {
            ListRef::Album(id) => id,
            ListRef::Playlist(id) => id,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "all" => Some(Self::All),
            "one" => Some(Self::One),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::One => "one",
        }
    }

    /// off -> all -> one -> off
    pub fn cycled(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_track_token(chunk: &str) -> bool {
    if chunk.len() != TRACK_TOKEN_LEN {
        return false;
    }
    chunk.char_indices().all(|(i, ch)| match i {
        8 | 13 | 18 | 23 => ch == '-',
        _ => ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase(),
    })
}

/// Splits a `track_order` string into its fixed-width track-id tokens.
/// Malformed chunks are dropped rather than resynced; the writer only ever
/// appends whole tokens.
pub fn parse_track_order(order: &str) -> Vec<String> {
    order
        .as_bytes()
        .chunks(TRACK_TOKEN_LEN)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .filter(|chunk| is_track_token(chunk))
        .map(|chunk| chunk.to_string())
        .collect()
}

/// Removes every occurrence of `token` from the order string.
pub fn strip_token(order: &str, token: &str) -> String {
    parse_track_order(order)
        .into_iter()
        .filter(|t| t != token)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{new_id, parse_track_order, strip_token, RepeatMode};

    #[test]
    fn track_order_round_trips_tokens() {
        let a = new_id();
        let b = new_id();
        let c = new_id();
        let order = format!("{}{}{}", a, b, c);
        assert_eq!(parse_track_order(&order), vec![a, b, c]);
    }

    #[test]
    fn empty_order_yields_no_tokens() {
        assert!(parse_track_order("").is_empty());
    }

    #[test]
    fn malformed_tail_is_dropped() {
        let a = new_id();
        let order = format!("{}garbage", a);
        assert_eq!(parse_track_order(&order), vec![a]);
    }

    #[test]
    fn strip_removes_all_occurrences() {
        let a = new_id();
        let b = new_id();
        let order = format!("{}{}{}", a, b, a);
        assert_eq!(strip_token(&order, &a), b);
    }

    #[test]
    fn repeat_mode_cycles_through_all_modes() {
        let mut mode = RepeatMode::Off;
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::All);
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::One);
        mode = mode.cycled();
        assert_eq!(mode, RepeatMode::Off);
    }
}
