use std::fs;
use std::path::Path;
use std::sync::Arc;

use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError,
};
use serde::{Deserialize, Serialize};

use common::{ListRef, RepeatMode};
use metadata::MetadataError;

pub(crate) const KEY_SEP: char = '\x1f';

pub(crate) const ARTISTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("artists");
pub(crate) const ARTISTS_BY_NAME_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("artists_by_name");
pub(crate) const ALBUMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("albums");
pub(crate) const ALBUMS_BY_KEY_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("albums_by_key");
pub(crate) const ALBUMS_BY_SORT_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("albums_by_sort");
pub(crate) const TRACKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tracks");
pub(crate) const TRACKS_BY_PATH_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("tracks_by_path");
pub(crate) const TRACKS_BY_TITLE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("tracks_by_title");
pub(crate) const TRACKS_BY_SLOT_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("tracks_by_slot");
pub(crate) const TRACK_ARTISTS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("track_artists");
pub(crate) const USERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
pub(crate) const USERS_BY_NAME_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("users_by_name");
pub(crate) const PLAYLISTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("playlists");
pub(crate) const PLAYLIST_TRACKS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("playlist_tracks");

/// Persisted playlist row. The track sequence lives entirely in
/// `track_order`; `playlist_tracks` rows only answer membership queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlaylistRow {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub track_order: String,
}

/// Persisted user row, with the last playback session embedded as
/// nullable fields (no saved session until the player first persists).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub display_name: String,
    pub username: String,
    pub password_digest: String,
    #[serde(default)]
    pub state: PlaybackRow,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlaybackRow {
    pub list_id: Option<String>,
    pub idx: Option<i64>,
    pub shuffle_active: Option<bool>,
    pub shuffle_map: Option<String>,
    pub elapsed: Option<f64>,
    pub duration: Option<f64>,
    pub repeat: Option<RepeatMode>,
    pub volume: Option<u32>,
}

#[derive(Clone)]
pub struct Catalog {
    pub(crate) db: Arc<Database>,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        let catalog = Self { db: Arc::new(db) };
        catalog.init_tables()?;
        Ok(catalog)
    }

    pub fn with_db(db: Arc<Database>) -> Result<Self, CatalogError> {
        let catalog = Self { db };
        catalog.init_tables()?;
        Ok(catalog)
    }

    pub fn db(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    fn init_tables(&self) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(ARTISTS_TABLE)?;
            let _ = write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_BY_KEY_TABLE)?;
            let _ = write_txn.open_table(ALBUMS_BY_SORT_TABLE)?;
            let _ = write_txn.open_table(TRACKS_TABLE)?;
            let _ = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            let _ = write_txn.open_table(TRACKS_BY_TITLE_TABLE)?;
            let _ = write_txn.open_table(TRACKS_BY_SLOT_TABLE)?;
            let _ = write_txn.open_table(TRACK_ARTISTS_TABLE)?;
            let _ = write_txn.open_table(USERS_TABLE)?;
            let _ = write_txn.open_table(USERS_BY_NAME_TABLE)?;
            let _ = write_txn.open_table(PLAYLISTS_TABLE)?;
            let _ = write_txn.open_table(PLAYLIST_TRACKS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

/// Resolution outcome for a playback list id.
#[derive(Clone, Debug)]
pub enum ResolvedList {
    Album(common::AlbumView),
    Playlist(common::PlaylistView),
}

impl ResolvedList {
    pub fn list_ref(&self) -> ListRef {
        match self {
            ResolvedList::Album(album) => ListRef::Album(album.id.clone()),
            ResolvedList::Playlist(playlist) => ListRef::Playlist(playlist.id.clone()),
        }
    }

    pub fn into_tracks(self) -> Vec<common::TrackRecord> {
        match self {
            ResolvedList::Album(album) => album.tracks,
            ResolvedList::Playlist(playlist) => playlist.tracks,
        }
    }
}

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Metadata(MetadataError),
    Db(redb::Error),
    Encode(Box<bincode::ErrorKind>),
    Image(image::ImageError),
    Password(argon2::password_hash::Error),
    KeyParse(String),
    NotFound,
    Conflict,
    Forbidden,
    ScanInProgress,
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Metadata(err) => write!(f, "metadata error: {}", err),
            CatalogError::Db(err) => write!(f, "db error: {}", err),
            CatalogError::Encode(err) => write!(f, "encode error: {}", err),
            CatalogError::Image(err) => write!(f, "image error: {}", err),
            CatalogError::Password(err) => write!(f, "password error: {}", err),
            CatalogError::KeyParse(value) => write!(f, "key parse error: {}", value),
            CatalogError::NotFound => write!(f, "not found"),
            CatalogError::Conflict => write!(f, "conflict"),
            CatalogError::Forbidden => write!(f, "forbidden"),
            CatalogError::ScanInProgress => write!(f, "a scan is already running"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<MetadataError> for CatalogError {
    fn from(err: MetadataError) -> Self {
        CatalogError::Metadata(err)
    }
}

impl From<redb::Error> for CatalogError {
    fn from(err: redb::Error) -> Self {
        CatalogError::Db(err)
    }
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        CatalogError::Db(err.into())
    }
}

impl From<TableError> for CatalogError {
    fn from(err: TableError) -> Self {
        CatalogError::Db(err.into())
    }
}

impl From<TransactionError> for CatalogError {
    fn from(err: TransactionError) -> Self {
        CatalogError::Db(err.into())
    }
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        CatalogError::Db(err.into())
    }
}

impl From<CommitError> for CatalogError {
    fn from(err: CommitError) -> Self {
        CatalogError::Db(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for CatalogError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CatalogError::Encode(err)
    }
}

impl From<image::ImageError> for CatalogError {
    fn from(err: image::ImageError) -> Self {
        CatalogError::Image(err)
    }
}

impl From<argon2::password_hash::Error> for CatalogError {
    fn from(err: argon2::password_hash::Error) -> Self {
        CatalogError::Password(err)
    }
}

pub(crate) fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, CatalogError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(bincode::deserialize(bytes)?)
}

pub(crate) fn pair_key(a: &str, b: &str) -> String {
    let mut out = String::with_capacity(a.len() + b.len() + 1);
    out.push_str(a);
    out.push(KEY_SEP);
    out.push_str(b);
    out
}

/// Key under which an album's tracks sort by disc then track number; a
/// prefix range over `album_id` yields the album's tracks in play order.
pub(crate) fn slot_key(album_id: &str, disc_number: u16, track_number: u16) -> String {
    format!(
        "{}{}{:05}{}{:05}",
        album_id, KEY_SEP, disc_number, KEY_SEP, track_number
    )
}

pub(crate) fn album_sort_key(artist_name: &str, album_name: &str, album_id: &str) -> String {
    let mut out = String::new();
    out.push_str(artist_name.trim().to_lowercase().as_str());
    out.push(KEY_SEP);
    out.push_str(album_name.trim().to_lowercase().as_str());
    out.push(KEY_SEP);
    out.push_str(album_id);
    out
}

pub(crate) fn prefix_key(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 1);
    out.push_str(id);
    out.push(KEY_SEP);
    out
}

pub(crate) fn prefix_end(prefix: &str) -> String {
    let mut end = prefix.to_string();
    end.push('\u{10ffff}');
    end
}

pub(crate) fn split_key_last(key: &str) -> Result<(&str, &str), CatalogError> {
    key.rsplit_once(KEY_SEP)
        .ok_or_else(|| CatalogError::KeyParse(key.to_string()))
}

/// 1-based pagination over an already-ordered listing. A zero limit means
/// no paging: the whole listing comes back regardless of `page`.
pub(crate) fn paginate<T>(items: Vec<T>, limit: usize, page: usize) -> Vec<T> {
    if limit == 0 {
        return items;
    }
    let start = page.max(1).saturating_sub(1).saturating_mul(limit);
    items.into_iter().skip(start).take(limit).collect()
}

/// Collects the values of every index entry under `prefix`, in key order.
pub(crate) fn range_values<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
    prefix: &str,
) -> Result<Vec<String>, CatalogError> {
    let end = prefix_end(prefix);
    let mut out = Vec::new();
    for entry in table.range(prefix..end.as_str())? {
        let entry = entry?;
        out.push(String::from_utf8_lossy(entry.1.value()).to_string());
    }
    Ok(out)
}
