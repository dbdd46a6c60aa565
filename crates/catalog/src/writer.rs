use std::path::Path;

use redb::{ReadableTable, Table};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use common::{new_id, Album, Artist, Track, TrackRecord};
use metadata::{read_cover, read_duration, read_tags, required_tags, CoverArt, TrackTags};

use crate::covers::CoverStore;
use crate::store::{
    album_sort_key, encode_value, pair_key, slot_key, Catalog, CatalogError, ALBUMS_BY_KEY_TABLE,
    ALBUMS_BY_SORT_TABLE, ALBUMS_TABLE, ARTISTS_BY_NAME_TABLE, ARTISTS_TABLE,
    TRACKS_BY_PATH_TABLE, TRACKS_BY_SLOT_TABLE, TRACKS_BY_TITLE_TABLE, TRACKS_TABLE,
    TRACK_ARTISTS_TABLE,
};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a"];

/// Event stream emitted while a scan runs. Serialized as the wire frames
/// pushed to live clients, hence the `type`/`payload` envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type", content = "payload")]
pub enum ScanEvent {
    Progress { file: String, progress: f64 },
    Operation(TrackRecord),
    Finished,
    Error(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: usize,
    pub created: usize,
}

type StrTable<'db, 'txn> = Table<'db, 'txn, &'static str, &'static [u8]>;

impl Catalog {
    /// Walks `root` for audio files and ingests each one. Files with
    /// incomplete tags are skipped, already-cataloged tracks are left
    /// alone, and per-file failures are reported without aborting the
    /// scan. A directory walk failure is terminal: it emits an error
    /// event and the scan stops without a finished event. Emits progress
    /// and per-track events through `emit`.
    pub fn scan(
        &self,
        covers: &CoverStore,
        root: &Path,
        emit: &mut dyn FnMut(ScanEvent),
    ) -> Result<ScanStats, CatalogError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Scan walk failed under {}: {}", root.display(), err);
                    emit(ScanEvent::Error(err.to_string()));
                    return Ok(ScanStats::default());
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let is_audio = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_audio {
                paths.push(entry.into_path());
            }
        }

        let total = paths.len();
        let mut stats = ScanStats {
            files: total,
            created: 0,
        };

        for (index, path) in paths.iter().enumerate() {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(path.as_path())
                .to_string_lossy()
                .to_string();
            emit(ScanEvent::Progress {
                file: rel.clone(),
                progress: (index + 1) as f64 / total as f64 * 100.0,
            });

            let info = match read_tags(path) {
                Ok(info) => info,
                Err(err) => {
                    warn!("Unreadable tags in {}: {}", rel, err);
                    emit(ScanEvent::Error(format!("{}: {}", rel, err)));
                    continue;
                }
            };
            let tags = match required_tags(info) {
                Some(tags) => tags,
                None => {
                    debug!("Skipping {}: incomplete tags", rel);
                    continue;
                }
            };
            let duration_secs = match read_duration(path) {
                Ok(duration) => duration,
                Err(err) => {
                    warn!("Unreadable stream properties in {}: {}", rel, err);
                    emit(ScanEvent::Error(format!("{}: {}", rel, err)));
                    continue;
                }
            };
            let cover = match read_cover(path) {
                Ok(cover) => cover,
                Err(err) => {
                    warn!("Unreadable cover in {}: {}", rel, err);
                    None
                }
            };

            match self.ingest_tagged(covers, &tags, duration_secs, cover.as_ref(), &rel) {
                Ok(Some(record)) => {
                    stats.created += 1;
                    emit(ScanEvent::Operation(record));
                }
                Ok(None) => debug!("Already cataloged: {}", rel),
                Err(err) => {
                    warn!("Failed to ingest {}: {}", rel, err);
                    emit(ScanEvent::Error(format!("{}: {}", rel, err)));
                }
            }
        }

        emit(ScanEvent::Finished);
        Ok(stats)
    }

    /// Ingests one already-parsed file in a single write transaction, so a
    /// track either lands with all of its rows and indexes or not at all.
    /// Returns `None` when the album already holds a track with this title.
    pub fn ingest_tagged(
        &self,
        covers: &CoverStore,
        tags: &TrackTags,
        duration_secs: f64,
        cover: Option<&CoverArt>,
        rel_path: &str,
    ) -> Result<Option<TrackRecord>, CatalogError> {
        let write_txn = self.db.begin_write()?;
        let record;
        {
            let mut artists = write_txn.open_table(ARTISTS_TABLE)?;
            let mut artists_by_name = write_txn.open_table(ARTISTS_BY_NAME_TABLE)?;
            let mut albums = write_txn.open_table(ALBUMS_TABLE)?;
            let mut albums_by_key = write_txn.open_table(ALBUMS_BY_KEY_TABLE)?;
            let mut albums_by_sort = write_txn.open_table(ALBUMS_BY_SORT_TABLE)?;
            let mut tracks = write_txn.open_table(TRACKS_TABLE)?;
            let mut tracks_by_path = write_txn.open_table(TRACKS_BY_PATH_TABLE)?;
            let mut tracks_by_title = write_txn.open_table(TRACKS_BY_TITLE_TABLE)?;
            let mut tracks_by_slot = write_txn.open_table(TRACKS_BY_SLOT_TABLE)?;
            let mut track_artists = write_txn.open_table(TRACK_ARTISTS_TABLE)?;

            let album_artist_name = tags.album_artist.trim().to_string();
            let album_artist_id =
                lookup_or_create_artist(&mut artists, &mut artists_by_name, &album_artist_name)?;

            let album_name = tags.album.trim().to_string();
            let album_key = pair_key(&album_artist_id, &album_name.to_lowercase());
            let album_id = match get_string(&albums_by_key, &album_key)? {
                Some(id) => id,
                None => {
                    let id = new_id();
                    let album = Album {
                        id: id.clone(),
                        name: album_name.clone(),
                        artist_id: album_artist_id.clone(),
                    };
                    albums.insert(id.as_str(), encode_value(&album)?.as_slice())?;
                    albums_by_key.insert(album_key.as_str(), id.as_bytes())?;
                    let sort = album_sort_key(&album_artist_name, &album_name, &id);
                    albums_by_sort.insert(sort.as_str(), id.as_bytes())?;
                    id
                }
            };

            let title = tags.title.trim().to_string();
            let title_key = pair_key(&album_id, &title.to_lowercase());
            if tracks_by_title.get(title_key.as_str())?.is_some() {
                return Ok(None);
            }

            let slot = slot_key(&album_id, tags.disc_no, tags.track_no);
            if tracks_by_slot.get(slot.as_str())?.is_some() {
                return Err(CatalogError::Conflict);
            }
            if tracks_by_path.get(rel_path)?.is_some() {
                return Err(CatalogError::Conflict);
            }

            let mut credit_names: Vec<String> = Vec::new();
            for name in tags.artists.split(';') {
                let name = name.trim();
                if name.is_empty() || credit_names.iter().any(|seen| seen == name) {
                    continue;
                }
                credit_names.push(name.to_string());
            }

            let cover_file = covers.save(cover)?;
            let track_id = new_id();

            for (position, name) in credit_names.iter().enumerate() {
                let artist_id =
                    lookup_or_create_artist(&mut artists, &mut artists_by_name, name)?;
                let link_key = pair_key(&track_id, &artist_id);
                track_artists
                    .insert(link_key.as_str(), encode_value(&(position as u32))?.as_slice())?;
            }

            let track = Track {
                id: track_id.clone(),
                title: title.clone(),
                track_number: tags.track_no,
                disc_number: tags.disc_no,
                year: tags.year,
                duration_secs,
                cover_file: cover_file.clone(),
                file_path: rel_path.to_string(),
                album_id: album_id.clone(),
            };
            tracks.insert(track_id.as_str(), encode_value(&track)?.as_slice())?;
            tracks_by_path.insert(rel_path, track_id.as_bytes())?;
            tracks_by_title.insert(title_key.as_str(), track_id.as_bytes())?;
            tracks_by_slot.insert(slot.as_str(), track_id.as_bytes())?;

            record = TrackRecord {
                track_id,
                title,
                track_number: tags.track_no,
                disc_number: tags.disc_no,
                year: tags.year,
                duration_secs,
                cover_file,
                file_path: rel_path.to_string(),
                album_id,
                album: album_name,
                album_artist: album_artist_name,
                artists: credit_names.join(";"),
            };
        }
        write_txn.commit()?;
        Ok(Some(record))
    }
}

fn lookup_or_create_artist(
    artists: &mut StrTable<'_, '_>,
    artists_by_name: &mut StrTable<'_, '_>,
    name: &str,
) -> Result<String, CatalogError> {
    let key = name.trim().to_lowercase();
    if let Some(existing) = artists_by_name.get(key.as_str())? {
        return Ok(String::from_utf8_lossy(existing.value()).to_string());
    }
    let id = new_id();
    let artist = Artist {
        id: id.clone(),
        name: name.trim().to_string(),
    };
    artists.insert(id.as_str(), encode_value(&artist)?.as_slice())?;
    artists_by_name.insert(key.as_str(), id.as_bytes())?;
    Ok(id)
}

fn get_string(table: &StrTable<'_, '_>, key: &str) -> Result<Option<String>, CatalogError> {
    Ok(table
        .get(key)?
        .map(|guard| String::from_utf8_lossy(guard.value()).to_string()))
}
