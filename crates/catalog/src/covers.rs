use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::warn;

use metadata::CoverArt;

use crate::store::CatalogError;

const TILE_SIZE: u32 = 500;
const CANVAS_SIZE: u32 = 1000;

/// Content-addressed cover image persistence. Filenames are the blake3
/// hash of the image bytes, so identical art shared across tracks and
/// albums is stored exactly once and rewrites are no-ops.
#[derive(Clone)]
pub struct CoverStore {
    images_dir: PathBuf,
    placeholder: PathBuf,
}

/// What a playlist's derived cover should be, given its member covers in
/// track order. A collage only reads well with enough distinct art;
/// below four sources a single cover is clearer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoverPlan {
    Placeholder,
    Single(String),
    Collage([String; 4]),
}

impl CoverPlan {
    /// Tiering over the distinct, non-empty covers in first-seen order.
    pub fn from_covers(covers: &[String]) -> Self {
        let mut distinct: Vec<&String> = Vec::new();
        for cover in covers {
            if cover.is_empty() {
                continue;
            }
            if !distinct.iter().any(|seen| *seen == cover) {
                distinct.push(cover);
            }
        }
        match distinct.len() {
            0 => CoverPlan::Placeholder,
            1..=3 => CoverPlan::Single(distinct[0].clone()),
            _ => CoverPlan::Collage([
                distinct[0].clone(),
                distinct[1].clone(),
                distinct[2].clone(),
                distinct[3].clone(),
            ]),
        }
    }
}

impl CoverStore {
    pub fn new(images_dir: PathBuf, placeholder: PathBuf) -> Result<Self, CatalogError> {
        fs::create_dir_all(&images_dir)?;
        Ok(Self {
            images_dir,
            placeholder,
        })
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Persists embedded cover bytes, returning the stable filename. No
    /// cover means an empty filename and no write. An existing file with
    /// the same hash already holds identical content, so the write is
    /// skipped.
    pub fn save(&self, cover: Option<&CoverArt>) -> Result<String, CatalogError> {
        let cover = match cover {
            Some(cover) if !cover.data.is_empty() => cover,
            _ => return Ok(String::new()),
        };

        let hash = blake3::hash(&cover.data).to_hex().to_string();
        let ext = match cover.mime.as_deref() {
            Some("image/png") => "png",
            _ => "jpg",
        };
        let filename = format!("{}.{}", hash, ext);
        let path = self.images_dir.join(&filename);
        if !path.exists() {
            fs::write(&path, &cover.data)?;
        }

        Ok(filename)
    }

    pub fn playlist_cover_path(&self, playlist_id: &str) -> PathBuf {
        self.images_dir.join(format!("{}.png", playlist_id))
    }

    /// Points a fresh playlist at the placeholder image.
    pub fn init_playlist_cover(&self, playlist_id: &str) -> Result<(), CatalogError> {
        let target = self.playlist_cover_path(playlist_id);
        remove_if_exists(&target)?;
        link_or_copy(&self.placeholder, &target)?;
        Ok(())
    }

    pub fn remove_playlist_cover(&self, playlist_id: &str) -> Result<(), CatalogError> {
        remove_if_exists(&self.playlist_cover_path(playlist_id))?;
        Ok(())
    }

    /// Rebuilds a playlist's derived cover from its member covers in
    /// track order: placeholder when empty, the first cover when fewer
    /// than four are distinct, otherwise a 2x2 collage of the first four.
    pub fn apply_playlist_cover(
        &self,
        playlist_id: &str,
        covers: &[String],
    ) -> Result<(), CatalogError> {
        let target = self.playlist_cover_path(playlist_id);
        remove_if_exists(&target)?;

        match CoverPlan::from_covers(covers) {
            CoverPlan::Placeholder => link_or_copy(&self.placeholder, &target)?,
            CoverPlan::Single(cover) => link_or_copy(&self.images_dir.join(cover), &target)?,
            CoverPlan::Collage(tiles) => self.render_collage(&tiles, &target)?,
        }
        Ok(())
    }

    fn render_collage(&self, tiles: &[String; 4], target: &Path) -> Result<(), CatalogError> {
        let mut canvas = RgbaImage::new(CANVAS_SIZE, CANVAS_SIZE);
        let offsets: [(i64, i64); 4] = [
            (0, 0),
            (i64::from(TILE_SIZE), 0),
            (0, i64::from(TILE_SIZE)),
            (i64::from(TILE_SIZE), i64::from(TILE_SIZE)),
        ];

        for (tile, (left, top)) in tiles.iter().zip(offsets) {
            let source = match image::open(self.images_dir.join(tile)) {
                Ok(source) => source,
                Err(err) => {
                    warn!("Skipping unreadable cover {} in collage: {}", tile, err);
                    continue;
                }
            };
            let scaled = source.resize_to_fill(TILE_SIZE, TILE_SIZE, FilterType::Lanczos3);
            imageops::overlay(&mut canvas, &scaled.to_rgba8(), left, top);
        }

        canvas.save(target)?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn link_or_copy(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(not(unix))]
fn link_or_copy(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::copy(source, target).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::{CoverPlan, CoverStore};
    use metadata::CoverArt;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CoverStore {
        let placeholder = dir.path().join("placeholder.png");
        std::fs::write(&placeholder, b"placeholder").unwrap();
        CoverStore::new(dir.path().join("images"), placeholder).unwrap()
    }

    #[test]
    fn no_cover_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.save(None).unwrap(), "");
        let entries = std::fs::read_dir(store.images_dir()).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn identical_bytes_share_one_file() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let art = CoverArt {
            data: vec![0xFF, 0xD8, 0xFF, 0x01, 0x02],
            mime: Some("image/jpeg".to_string()),
        };
        let first = store.save(Some(&art)).unwrap();
        let second = store.save(Some(&art)).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(".jpg"));
        let entries = std::fs::read_dir(store.images_dir()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn png_mime_picks_png_extension() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let art = CoverArt {
            data: vec![0x89, 0x50, 0x4E, 0x47],
            mime: Some("image/png".to_string()),
        };
        assert!(store.save(Some(&art)).unwrap().ends_with(".png"));
    }

    #[test]
    fn plan_tiers_on_distinct_covers() {
        let a = "a.jpg".to_string();
        let b = "b.jpg".to_string();
        let c = "c.jpg".to_string();
        let d = "d.jpg".to_string();
        let e = "e.jpg".to_string();

        assert_eq!(CoverPlan::from_covers(&[]), CoverPlan::Placeholder);
        assert_eq!(
            CoverPlan::from_covers(&[String::new()]),
            CoverPlan::Placeholder
        );
        assert_eq!(
            CoverPlan::from_covers(&[a.clone(), a.clone(), b.clone()]),
            CoverPlan::Single(a.clone())
        );
        assert_eq!(
            CoverPlan::from_covers(&[a.clone(), b.clone(), c.clone(), d.clone(), e]),
            CoverPlan::Collage([a, b, c, d])
        );
    }
}
