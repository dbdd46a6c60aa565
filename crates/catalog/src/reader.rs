use redb::ReadableTable;
use serde::Deserialize;

use common::{Album, AlbumSummary, AlbumView, Artist, Track, TrackRecord};

use crate::store::{
    decode_value, paginate, prefix_end, prefix_key, range_values, split_key_last, Catalog,
    CatalogError, ALBUMS_BY_SORT_TABLE, ALBUMS_TABLE, ARTISTS_TABLE, TRACKS_BY_SLOT_TABLE,
    TRACKS_TABLE, TRACK_ARTISTS_TABLE,
};

impl Catalog {
    /// Albums sorted by artist then album name, case-insensitively, in
    /// 1-based pages (`limit` 0 disables paging). Year and cover are
    /// aggregated from the album's tracks: the earliest year and the first
    /// non-empty cover in disc/track order.
    pub fn list_albums(&self, limit: usize, page: usize) -> Result<Vec<AlbumSummary>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let albums = read_txn.open_table(ALBUMS_TABLE)?;
        let by_sort = read_txn.open_table(ALBUMS_BY_SORT_TABLE)?;
        let artists = read_txn.open_table(ARTISTS_TABLE)?;
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        let by_slot = read_txn.open_table(TRACKS_BY_SLOT_TABLE)?;

        let mut out = Vec::new();
        for album_id in paginate(sorted_album_ids(&by_sort)?, limit, page) {
            let album: Album = load_required(&albums, &album_id)?;
            let artist: Artist = load_required(&artists, &album.artist_id)?;
            let (year, cover_file) = album_aggregates(&tracks, &by_slot, &album_id)?;
            out.push(AlbumSummary {
                id: album.id,
                name: album.name,
                artist: artist.name,
                year,
                cover_file,
            });
        }
        Ok(out)
    }

    /// Album pages with their full track listings, for clients that want
    /// the library shape in one request instead of a summary-then-detail
    /// round trip per album.
    pub fn list_album_views(
        &self,
        limit: usize,
        page: usize,
    ) -> Result<Vec<AlbumView>, CatalogError> {
        let album_ids = {
            let read_txn = self.db.begin_read()?;
            let by_sort = read_txn.open_table(ALBUMS_BY_SORT_TABLE)?;
            sorted_album_ids(&by_sort)?
        };

        let mut out = Vec::new();
        for album_id in paginate(album_ids, limit, page) {
            out.push(self.album_view(&album_id)?);
        }
        Ok(out)
    }

    pub fn album_view(&self, album_id: &str) -> Result<AlbumView, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let albums = read_txn.open_table(ALBUMS_TABLE)?;
        let artists = read_txn.open_table(ARTISTS_TABLE)?;
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        let by_slot = read_txn.open_table(TRACKS_BY_SLOT_TABLE)?;
        let credits = read_txn.open_table(TRACK_ARTISTS_TABLE)?;

        let album: Album = load_required(&albums, album_id)?;
        let artist: Artist = load_required(&artists, &album.artist_id)?;
        let (year, cover_file) = album_aggregates(&tracks, &by_slot, album_id)?;

        let mut records = Vec::new();
        for track_id in range_values(&by_slot, &prefix_key(album_id))? {
            let track: Track = load_required(&tracks, &track_id)?;
            records.push(build_record(&albums, &artists, &credits, track)?);
        }

        Ok(AlbumView {
            id: album.id,
            name: album.name,
            artist: artist.name,
            year,
            cover_file,
            tracks: records,
        })
    }

    /// Every track in the catalog as denormalized records, walking albums
    /// in artist→album order and tracks in disc/track order within each,
    /// in 1-based pages (`limit` 0 disables paging).
    pub fn list_tracks(&self, limit: usize, page: usize) -> Result<Vec<TrackRecord>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let albums = read_txn.open_table(ALBUMS_TABLE)?;
        let by_sort = read_txn.open_table(ALBUMS_BY_SORT_TABLE)?;
        let artists = read_txn.open_table(ARTISTS_TABLE)?;
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        let by_slot = read_txn.open_table(TRACKS_BY_SLOT_TABLE)?;
        let credits = read_txn.open_table(TRACK_ARTISTS_TABLE)?;

        let mut track_ids = Vec::new();
        for album_id in sorted_album_ids(&by_sort)? {
            track_ids.extend(range_values(&by_slot, &prefix_key(&album_id))?);
        }

        let mut out = Vec::new();
        for track_id in paginate(track_ids, limit, page) {
            let track: Track = load_required(&tracks, &track_id)?;
            out.push(build_record(&albums, &artists, &credits, track)?);
        }
        Ok(out)
    }

    pub fn track(&self, track_id: &str) -> Result<Track, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        load_required(&tracks, track_id)
    }

    pub fn track_record(&self, track_id: &str) -> Result<TrackRecord, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let albums = read_txn.open_table(ALBUMS_TABLE)?;
        let artists = read_txn.open_table(ARTISTS_TABLE)?;
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        let credits = read_txn.open_table(TRACK_ARTISTS_TABLE)?;

        let track: Track = load_required(&tracks, track_id)?;
        build_record(&albums, &artists, &credits, track)
    }

    /// Resolves an ordered list of track ids to records, silently dropping
    /// ids that no longer exist. Playlist order strings can outlive their
    /// tracks, so a stale token must not poison the whole list.
    pub fn track_records(&self, track_ids: &[String]) -> Result<Vec<TrackRecord>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let albums = read_txn.open_table(ALBUMS_TABLE)?;
        let artists = read_txn.open_table(ARTISTS_TABLE)?;
        let tracks = read_txn.open_table(TRACKS_TABLE)?;
        let credits = read_txn.open_table(TRACK_ARTISTS_TABLE)?;

        let mut out = Vec::new();
        for track_id in track_ids {
            let track: Track = match load(&tracks, track_id)? {
                Some(track) => track,
                None => continue,
            };
            out.push(build_record(&albums, &artists, &credits, track)?);
        }
        Ok(out)
    }
}

fn sorted_album_ids(
    by_sort: &impl ReadableTable<&'static str, &'static [u8]>,
) -> Result<Vec<String>, CatalogError> {
    let mut ids = Vec::new();
    let end = prefix_end("");
    for entry in by_sort.range(""..end.as_str())? {
        let entry = entry?;
        ids.push(String::from_utf8_lossy(entry.1.value()).to_string());
    }
    Ok(ids)
}

fn load<T: for<'de> Deserialize<'de>>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> Result<Option<T>, CatalogError> {
    match table.get(key)? {
        Some(guard) => Ok(Some(decode_value(guard.value())?)),
        None => Ok(None),
    }
}

fn load_required<T: for<'de> Deserialize<'de>>(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    key: &str,
) -> Result<T, CatalogError> {
    load(table, key)?.ok_or(CatalogError::NotFound)
}

/// Earliest year and first non-empty cover over an album's tracks in
/// disc/track order.
fn album_aggregates(
    tracks: &impl ReadableTable<&'static str, &'static [u8]>,
    by_slot: &impl ReadableTable<&'static str, &'static [u8]>,
    album_id: &str,
) -> Result<(i32, String), CatalogError> {
    let mut year: Option<i32> = None;
    let mut cover_file = String::new();
    for track_id in range_values(by_slot, &prefix_key(album_id))? {
        let track: Track = load_required(tracks, &track_id)?;
        year = Some(match year {
            Some(current) => current.min(track.year),
            None => track.year,
        });
        if cover_file.is_empty() && !track.cover_file.is_empty() {
            cover_file = track.cover_file;
        }
    }
    Ok((year.unwrap_or(0), cover_file))
}

fn build_record(
    albums: &impl ReadableTable<&'static str, &'static [u8]>,
    artists: &impl ReadableTable<&'static str, &'static [u8]>,
    credits: &impl ReadableTable<&'static str, &'static [u8]>,
    track: Track,
) -> Result<TrackRecord, CatalogError> {
    let album: Album = load_required(albums, &track.album_id)?;
    let album_artist: Artist = load_required(artists, &album.artist_id)?;

    let prefix = prefix_key(&track.id);
    let end = prefix_end(&prefix);
    let mut credited: Vec<(u32, String)> = Vec::new();
    for entry in credits.range(prefix.as_str()..end.as_str())? {
        let entry = entry?;
        let key = entry.0.value().to_string();
        let (_, artist_id) = split_key_last(&key)?;
        let position: u32 = decode_value(entry.1.value())?;
        let artist: Artist = load_required(artists, artist_id)?;
        credited.push((position, artist.name));
    }
    credited.sort_by_key(|(position, _)| *position);
    let names: Vec<String> = credited.into_iter().map(|(_, name)| name).collect();

    Ok(TrackRecord {
        track_id: track.id,
        title: track.title,
        track_number: track.track_number,
        disc_number: track.disc_number,
        year: track.year,
        duration_secs: track.duration_secs,
        cover_file: track.cover_file,
        file_path: track.file_path,
        album_id: track.album_id,
        album: album.name,
        album_artist: album_artist.name,
        artists: names.join(";"),
    })
}

#[cfg(test)]
mod tests {
    use metadata::{CoverArt, TrackTags};
    use tempfile::TempDir;

    use crate::covers::CoverStore;
    use crate::store::{Catalog, CatalogError};

    fn fixtures(dir: &TempDir) -> (Catalog, CoverStore) {
        let catalog = Catalog::open(&dir.path().join("catalog.redb")).unwrap();
        let placeholder = dir.path().join("placeholder.png");
        std::fs::write(&placeholder, b"placeholder").unwrap();
        let covers = CoverStore::new(dir.path().join("images"), placeholder).unwrap();
        (catalog, covers)
    }

    fn tags(album_artist: &str, album: &str, title: &str, disc: u16, no: u16) -> TrackTags {
        TrackTags {
            title: title.to_string(),
            artists: album_artist.to_string(),
            album: album.to_string(),
            album_artist: album_artist.to_string(),
            track_no: no,
            disc_no: disc,
            year: 2020,
        }
    }

    #[test]
    fn albums_sort_by_artist_then_name() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        catalog
            .ingest_tagged(&covers, &tags("zeta", "Alpha", "T1", 1, 1), 10.0, None, "z/1.mp3")
            .unwrap();
        catalog
            .ingest_tagged(&covers, &tags("Alef", "Beta", "T2", 1, 1), 10.0, None, "a/1.mp3")
            .unwrap();
        catalog
            .ingest_tagged(&covers, &tags("Alef", "Apex", "T3", 1, 1), 10.0, None, "a/2.mp3")
            .unwrap();

        let names: Vec<(String, String)> = catalog
            .list_albums(0, 1)
            .unwrap()
            .into_iter()
            .map(|album| (album.artist, album.name))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Alef".to_string(), "Apex".to_string()),
                ("Alef".to_string(), "Beta".to_string()),
                ("zeta".to_string(), "Alpha".to_string()),
            ]
        );
    }

    #[test]
    fn album_tracks_order_by_disc_then_number() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        catalog
            .ingest_tagged(&covers, &tags("A", "M", "D2T1", 2, 1), 10.0, None, "m/3.mp3")
            .unwrap();
        catalog
            .ingest_tagged(&covers, &tags("A", "M", "D1T2", 1, 2), 10.0, None, "m/2.mp3")
            .unwrap();
        let first = catalog
            .ingest_tagged(&covers, &tags("A", "M", "D1T1", 1, 1), 10.0, None, "m/1.mp3")
            .unwrap()
            .unwrap();

        let view = catalog.album_view(&first.album_id).unwrap();
        let titles: Vec<&str> = view.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["D1T1", "D1T2", "D2T1"]);
    }

    #[test]
    fn album_year_is_the_earliest_track_year() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        let mut early = tags("A", "M", "Old", 1, 1);
        early.year = 1999;
        let mut late = tags("A", "M", "New", 1, 2);
        late.year = 2005;
        let record = catalog
            .ingest_tagged(&covers, &late, 10.0, None, "m/2.mp3")
            .unwrap()
            .unwrap();
        catalog
            .ingest_tagged(&covers, &early, 10.0, None, "m/1.mp3")
            .unwrap();

        let view = catalog.album_view(&record.album_id).unwrap();
        assert_eq!(view.year, 1999);
    }

    #[test]
    fn album_cover_is_the_first_in_track_order() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        let art = CoverArt {
            data: vec![0xFF, 0xD8, 0xFF, 0x42],
            mime: Some("image/jpeg".to_string()),
        };
        catalog
            .ingest_tagged(&covers, &tags("A", "M", "Bare", 1, 1), 10.0, None, "m/1.mp3")
            .unwrap();
        let with_art = catalog
            .ingest_tagged(&covers, &tags("A", "M", "Art", 1, 2), 10.0, Some(&art), "m/2.mp3")
            .unwrap()
            .unwrap();

        let listed = catalog.list_albums(0, 1).unwrap();
        assert_eq!(listed[0].cover_file, with_art.cover_file);
    }

    #[test]
    fn album_pages_are_one_based() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        for (i, name) in ["Aa", "Bb", "Cc"].iter().enumerate() {
            let path = format!("x/{}.mp3", i);
            catalog
                .ingest_tagged(&covers, &tags("A", name, "T", 1, 1), 10.0, None, &path)
                .unwrap();
        }

        let page1 = catalog.list_albums(2, 1).unwrap();
        let page2 = catalog.list_albums(2, 2).unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page2.len(), 1);
        assert_eq!(page1[0].name, "Aa");
        assert_eq!(page2[0].name, "Cc");
    }

    #[test]
    fn track_listing_walks_albums_in_sort_order() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        catalog
            .ingest_tagged(&covers, &tags("zeta", "Alpha", "Z1", 1, 1), 10.0, None, "z/1.mp3")
            .unwrap();
        catalog
            .ingest_tagged(&covers, &tags("Alef", "Beta", "B2", 1, 2), 10.0, None, "b/2.mp3")
            .unwrap();
        catalog
            .ingest_tagged(&covers, &tags("Alef", "Beta", "B1", 1, 1), 10.0, None, "b/1.mp3")
            .unwrap();

        let titles: Vec<String> = catalog
            .list_tracks(0, 1)
            .unwrap()
            .into_iter()
            .map(|record| record.title)
            .collect();
        assert_eq!(titles, vec!["B1", "B2", "Z1"]);

        let page2 = catalog.list_tracks(2, 2).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].title, "Z1");
    }

    #[test]
    fn album_listing_can_carry_full_track_lists() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        catalog
            .ingest_tagged(&covers, &tags("A", "M", "T2", 1, 2), 10.0, None, "m/2.mp3")
            .unwrap();
        catalog
            .ingest_tagged(&covers, &tags("A", "M", "T1", 1, 1), 10.0, None, "m/1.mp3")
            .unwrap();
        catalog
            .ingest_tagged(&covers, &tags("B", "N", "U1", 1, 1), 10.0, None, "n/1.mp3")
            .unwrap();

        let views = catalog.list_album_views(0, 1).unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].name, "M");
        let titles: Vec<&str> = views[0].tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["T1", "T2"]);
        assert_eq!(views[1].tracks.len(), 1);
    }

    #[test]
    fn track_record_joins_ordered_credits() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        let mut multi = tags("Lead", "M", "Duet", 1, 1);
        multi.artists = "Lead;Guest;Third".to_string();
        let record = catalog
            .ingest_tagged(&covers, &multi, 10.0, None, "m/1.mp3")
            .unwrap()
            .unwrap();

        let loaded = catalog.track_record(&record.track_id).unwrap();
        assert_eq!(loaded.artists, "Lead;Guest;Third");
        assert_eq!(loaded.album_artist, "Lead");
    }

    #[test]
    fn stale_ids_are_dropped_from_record_lists() {
        let dir = TempDir::new().unwrap();
        let (catalog, covers) = fixtures(&dir);
        let record = catalog
            .ingest_tagged(&covers, &tags("A", "M", "T", 1, 1), 10.0, None, "m/1.mp3")
            .unwrap()
            .unwrap();

        let ids = vec![common::new_id(), record.track_id.clone()];
        let records = catalog.track_records(&ids).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].track_id, record.track_id);

        assert!(matches!(
            catalog.track_record(&common::new_id()),
            Err(CatalogError::NotFound)
        ));
    }
}
