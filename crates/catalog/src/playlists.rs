use redb::ReadableTable;

use common::{new_id, parse_track_order, strip_token, PlaylistSummary, PlaylistView};

use crate::covers::CoverStore;
use crate::store::{
    decode_value, encode_value, paginate, pair_key, prefix_end, prefix_key, range_values, Catalog,
    CatalogError, PlaylistRow, UserRow, PLAYLISTS_TABLE, PLAYLIST_TRACKS_TABLE, TRACKS_TABLE,
    USERS_TABLE,
};

impl Catalog {
    /// Creates an empty playlist owned by `owner_id`, with the placeholder
    /// as its initial cover.
    pub fn create_playlist(
        &self,
        covers: &CoverStore,
        owner_id: &str,
        name: &str,
    ) -> Result<PlaylistSummary, CatalogError> {
        let owner = self.user_row(owner_id)?;

        let row = PlaylistRow {
            id: new_id(),
            name: name.trim().to_string(),
            owner_id: owner.id.clone(),
            track_order: String::new(),
        };

        let write_txn = self.db.begin_write()?;
        {
            let mut playlists = write_txn.open_table(PLAYLISTS_TABLE)?;
            playlists.insert(row.id.as_str(), encode_value(&row)?.as_slice())?;
        }
        write_txn.commit()?;

        covers.init_playlist_cover(&row.id)?;
        Ok(PlaylistSummary {
            id: row.id,
            name: row.name,
            owner: owner.display_name,
        })
    }

    /// Playlist headers sorted by owner display name then playlist name,
    /// case-insensitively, in 1-based pages (`limit` 0 disables paging).
    pub fn list_playlists(
        &self,
        limit: usize,
        page: usize,
    ) -> Result<Vec<PlaylistSummary>, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let playlists = read_txn.open_table(PLAYLISTS_TABLE)?;
        let users = read_txn.open_table(USERS_TABLE)?;

        let mut out = Vec::new();
        for entry in playlists.iter()? {
            let entry = entry?;
            let row: PlaylistRow = decode_value(entry.1.value())?;
            let owner = match users.get(row.owner_id.as_str())? {
                Some(guard) => {
                    let owner: UserRow = decode_value(guard.value())?;
                    owner.display_name
                }
                None => String::new(),
            };
            out.push(PlaylistSummary {
                id: row.id,
                name: row.name,
                owner,
            });
        }

        out.sort_by(|a, b| {
            (a.owner.to_lowercase(), a.name.to_lowercase(), &a.id)
                .cmp(&(b.owner.to_lowercase(), b.name.to_lowercase(), &b.id))
        });
        Ok(paginate(out, limit, page))
    }

    /// Playlist header plus its tracks in order-string sequence. Tokens
    /// whose tracks have vanished are dropped from the listing.
    pub fn playlist_view(&self, playlist_id: &str) -> Result<PlaylistView, CatalogError> {
        let row = self.playlist_row(playlist_id)?;
        let owner = self.user_row(&row.owner_id)?;
        let tokens = parse_track_order(&row.track_order);
        let tracks = self.track_records(&tokens)?;
        Ok(PlaylistView {
            id: row.id,
            name: row.name,
            owner: owner.display_name,
            tracks,
        })
    }

    /// Appends a track to the playlist. Only the owner may mutate a
    /// playlist; inserting a track that is already a member is a conflict.
    pub fn add_playlist_track(
        &self,
        covers: &CoverStore,
        playlist_id: &str,
        requester_id: &str,
        track_id: &str,
    ) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut playlists = write_txn.open_table(PLAYLISTS_TABLE)?;
            let mut members = write_txn.open_table(PLAYLIST_TRACKS_TABLE)?;
            let tracks = write_txn.open_table(TRACKS_TABLE)?;

            let mut row = required_row(&playlists, playlist_id)?;
            if row.owner_id != requester_id {
                return Err(CatalogError::Forbidden);
            }
            if tracks.get(track_id)?.is_none() {
                return Err(CatalogError::NotFound);
            }

            let member_key = pair_key(playlist_id, track_id);
            if members.get(member_key.as_str())?.is_some() {
                return Err(CatalogError::Conflict);
            }
            members.insert(member_key.as_str(), track_id.as_bytes())?;

            row.track_order.push_str(track_id);
            playlists.insert(playlist_id, encode_value(&row)?.as_slice())?;
        }
        write_txn.commit()?;

        self.refresh_playlist_cover(covers, playlist_id)
    }

    pub fn remove_playlist_track(
        &self,
        covers: &CoverStore,
        playlist_id: &str,
        requester_id: &str,
        track_id: &str,
    ) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut playlists = write_txn.open_table(PLAYLISTS_TABLE)?;
            let mut members = write_txn.open_table(PLAYLIST_TRACKS_TABLE)?;

            let mut row = required_row(&playlists, playlist_id)?;
            if row.owner_id != requester_id {
                return Err(CatalogError::Forbidden);
            }

            let member_key = pair_key(playlist_id, track_id);
            if members.remove(member_key.as_str())?.is_none() {
                return Err(CatalogError::NotFound);
            }

            row.track_order = strip_token(&row.track_order, track_id);
            playlists.insert(playlist_id, encode_value(&row)?.as_slice())?;
        }
        write_txn.commit()?;

        self.refresh_playlist_cover(covers, playlist_id)
    }

    /// Replaces the playlist's play order. The new order must be a
    /// permutation of the current membership; anything else is a conflict.
    /// Cover regeneration is skipped when the order is unchanged.
    pub fn reorder_playlist(
        &self,
        covers: &CoverStore,
        playlist_id: &str,
        requester_id: &str,
        order: &[String],
    ) -> Result<(), CatalogError> {
        let changed;
        let write_txn = self.db.begin_write()?;
        {
            let mut playlists = write_txn.open_table(PLAYLISTS_TABLE)?;
            let members = write_txn.open_table(PLAYLIST_TRACKS_TABLE)?;

            let mut row = required_row(&playlists, playlist_id)?;
            if row.owner_id != requester_id {
                return Err(CatalogError::Forbidden);
            }

            let membership = range_values(&members, &prefix_key(playlist_id))?;
            if !is_permutation(order, &membership) {
                return Err(CatalogError::Conflict);
            }

            let new_order = order.concat();
            changed = new_order != row.track_order;
            if changed {
                row.track_order = new_order;
                playlists.insert(playlist_id, encode_value(&row)?.as_slice())?;
            }
        }
        write_txn.commit()?;

        if changed {
            self.refresh_playlist_cover(covers, playlist_id)?;
        }
        Ok(())
    }

    pub fn delete_playlist(
        &self,
        covers: &CoverStore,
        playlist_id: &str,
        requester_id: &str,
    ) -> Result<(), CatalogError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut playlists = write_txn.open_table(PLAYLISTS_TABLE)?;
            let mut members = write_txn.open_table(PLAYLIST_TRACKS_TABLE)?;

            let row = required_row(&playlists, playlist_id)?;
            if row.owner_id != requester_id {
                return Err(CatalogError::Forbidden);
            }
            playlists.remove(playlist_id)?;

            let prefix = prefix_key(playlist_id);
            let end = prefix_end(&prefix);
            let mut member_keys = Vec::new();
            for entry in members.range(prefix.as_str()..end.as_str())? {
                let entry = entry?;
                member_keys.push(entry.0.value().to_string());
            }
            for key in member_keys {
                members.remove(key.as_str())?;
            }
        }
        write_txn.commit()?;

        covers.remove_playlist_cover(playlist_id)
    }

    pub(crate) fn playlist_row(&self, playlist_id: &str) -> Result<PlaylistRow, CatalogError> {
        let read_txn = self.db.begin_read()?;
        let playlists = read_txn.open_table(PLAYLISTS_TABLE)?;
        required_row(&playlists, playlist_id)
    }

    fn refresh_playlist_cover(
        &self,
        covers: &CoverStore,
        playlist_id: &str,
    ) -> Result<(), CatalogError> {
        let row = self.playlist_row(playlist_id)?;
        let tokens = parse_track_order(&row.track_order);
        let member_covers: Vec<String> = self
            .track_records(&tokens)?
            .into_iter()
            .map(|record| record.cover_file)
            .collect();
        covers.apply_playlist_cover(playlist_id, &member_covers)
    }
}

fn required_row(
    playlists: &impl ReadableTable<&'static str, &'static [u8]>,
    playlist_id: &str,
) -> Result<PlaylistRow, CatalogError> {
    match playlists.get(playlist_id)? {
        Some(guard) => decode_value(guard.value()),
        None => Err(CatalogError::NotFound),
    }
}

/// True when `order` lists exactly the ids in `membership`, each once.
fn is_permutation(order: &[String], membership: &[String]) -> bool {
    if order.len() != membership.len() {
        return false;
    }
    let mut seen: Vec<&String> = Vec::with_capacity(order.len());
    for id in order {
        if seen.contains(&id) || !membership.contains(id) {
            return false;
        }
        seen.push(id);
    }
    true
}

#[cfg(test)]
mod tests {
    use metadata::TrackTags;
    use tempfile::TempDir;

    use crate::covers::CoverStore;
    use crate::store::{Catalog, CatalogError};

    struct Fixture {
        catalog: Catalog,
        covers: CoverStore,
        owner: String,
        tracks: Vec<String>,
    }

    fn fixture(dir: &TempDir, track_count: u16) -> Fixture {
        let catalog = Catalog::open(&dir.path().join("catalog.redb")).unwrap();
        let placeholder = dir.path().join("placeholder.png");
        std::fs::write(&placeholder, b"placeholder").unwrap();
        let covers = CoverStore::new(dir.path().join("images"), placeholder).unwrap();

        let owner = catalog.create_user("Ada", "ada", "hunter2").unwrap().id;

        let mut tracks = Vec::new();
        for no in 1..=track_count {
            let tags = TrackTags {
                title: format!("Track {}", no),
                artists: "Band".to_string(),
                album: "Album".to_string(),
                album_artist: "Band".to_string(),
                track_no: no,
                disc_no: 1,
                year: 2020,
            };
            let path = format!("album/{:02}.mp3", no);
            let record = catalog
                .ingest_tagged(&covers, &tags, 100.0, None, &path)
                .unwrap()
                .unwrap();
            tracks.push(record.track_id);
        }

        Fixture {
            catalog,
            covers,
            owner,
            tracks,
        }
    }

    #[test]
    fn create_starts_empty_with_a_cover() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 0);
        let summary = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Morning")
            .unwrap();
        assert_eq!(summary.owner, "Ada");

        let view = f.catalog.playlist_view(&summary.id).unwrap();
        assert!(view.tracks.is_empty());
        assert!(f.covers.playlist_cover_path(&summary.id).exists());
    }

    #[test]
    fn only_the_owner_may_mutate() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 1);
        let other = f.catalog.create_user("Eve", "eve", "pw").unwrap().id;
        let playlist = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Mine")
            .unwrap();

        let denied =
            f.catalog
                .add_playlist_track(&f.covers, &playlist.id, &other, &f.tracks[0]);
        assert!(matches!(denied, Err(CatalogError::Forbidden)));
    }

    #[test]
    fn duplicate_membership_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 1);
        let playlist = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Mine")
            .unwrap();

        f.catalog
            .add_playlist_track(&f.covers, &playlist.id, &f.owner, &f.tracks[0])
            .unwrap();
        let again =
            f.catalog
                .add_playlist_track(&f.covers, &playlist.id, &f.owner, &f.tracks[0]);
        assert!(matches!(again, Err(CatalogError::Conflict)));
    }

    #[test]
    fn unknown_track_cannot_be_added() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 0);
        let playlist = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Mine")
            .unwrap();

        let missing = f.catalog.add_playlist_track(
            &f.covers,
            &playlist.id,
            &f.owner,
            &common::new_id(),
        );
        assert!(matches!(missing, Err(CatalogError::NotFound)));
    }

    #[test]
    fn view_order_follows_insertion_not_album_order() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 3);
        let playlist = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Mine")
            .unwrap();

        for track_id in [&f.tracks[2], &f.tracks[0], &f.tracks[1]] {
            f.catalog
                .add_playlist_track(&f.covers, &playlist.id, &f.owner, track_id)
                .unwrap();
        }

        let view = f.catalog.playlist_view(&playlist.id).unwrap();
        let ids: Vec<&str> = view.tracks.iter().map(|t| t.track_id.as_str()).collect();
        assert_eq!(ids, vec![&f.tracks[2], &f.tracks[0], &f.tracks[1]]);
    }

    #[test]
    fn reorder_replaces_the_sequence() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 3);
        let playlist = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Mine")
            .unwrap();
        for track_id in &f.tracks {
            f.catalog
                .add_playlist_track(&f.covers, &playlist.id, &f.owner, track_id)
                .unwrap();
        }

        let order = vec![f.tracks[1].clone(), f.tracks[2].clone(), f.tracks[0].clone()];
        f.catalog
            .reorder_playlist(&f.covers, &playlist.id, &f.owner, &order)
            .unwrap();

        let view = f.catalog.playlist_view(&playlist.id).unwrap();
        let ids: Vec<String> = view.tracks.iter().map(|t| t.track_id.clone()).collect();
        assert_eq!(ids, order);
    }

    #[test]
    fn reorder_must_be_a_permutation_of_membership() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 2);
        let playlist = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Mine")
            .unwrap();
        f.catalog
            .add_playlist_track(&f.covers, &playlist.id, &f.owner, &f.tracks[0])
            .unwrap();

        let too_many = vec![f.tracks[0].clone(), f.tracks[1].clone()];
        assert!(matches!(
            f.catalog
                .reorder_playlist(&f.covers, &playlist.id, &f.owner, &too_many),
            Err(CatalogError::Conflict)
        ));

        let doubled = vec![f.tracks[0].clone(), f.tracks[0].clone()];
        assert!(matches!(
            f.catalog
                .reorder_playlist(&f.covers, &playlist.id, &f.owner, &doubled),
            Err(CatalogError::Conflict)
        ));
    }

    #[test]
    fn remove_shrinks_the_order_string() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 2);
        let playlist = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Mine")
            .unwrap();
        for track_id in &f.tracks {
            f.catalog
                .add_playlist_track(&f.covers, &playlist.id, &f.owner, track_id)
                .unwrap();
        }

        f.catalog
            .remove_playlist_track(&f.covers, &playlist.id, &f.owner, &f.tracks[0])
            .unwrap();
        let view = f.catalog.playlist_view(&playlist.id).unwrap();
        assert_eq!(view.tracks.len(), 1);
        assert_eq!(view.tracks[0].track_id, f.tracks[1]);

        let gone =
            f.catalog
                .remove_playlist_track(&f.covers, &playlist.id, &f.owner, &f.tracks[0]);
        assert!(matches!(gone, Err(CatalogError::NotFound)));
    }

    #[test]
    fn delete_removes_playlist_and_cover() {
        let dir = TempDir::new().unwrap();
        let f = fixture(&dir, 1);
        let playlist = f
            .catalog
            .create_playlist(&f.covers, &f.owner, "Mine")
            .unwrap();
        f.catalog
            .add_playlist_track(&f.covers, &playlist.id, &f.owner, &f.tracks[0])
            .unwrap();

        f.catalog
            .delete_playlist(&f.covers, &playlist.id, &f.owner)
            .unwrap();
        assert!(matches!(
            f.catalog.playlist_view(&playlist.id),
            Err(CatalogError::NotFound)
        ));
        assert!(!f.covers.playlist_cover_path(&playlist.id).exists());
        assert!(f.catalog.list_playlists(0, 1).unwrap().is_empty());
    }
}
