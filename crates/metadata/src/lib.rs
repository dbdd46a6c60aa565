use std::path::Path;

use lofty::error::LoftyError;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};

#[derive(Debug, Default, Clone)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_no: Option<u16>,
    pub disc_no: Option<u16>,
    pub year: Option<i32>,
}

/// The fields a file must carry before it is allowed into the catalog.
/// `artists` is the raw ';'-delimited credit string from the tag.
#[derive(Debug, Clone)]
pub struct TrackTags {
    pub title: String,
    pub artists: String,
    pub album: String,
    pub album_artist: String,
    pub track_no: u16,
    pub disc_no: u16,
    pub year: i32,
}

#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;

    let mut info = TagInfo::default();

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        info.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
        info.artist = tag.get_string(&ItemKey::TrackArtist).map(|v| v.to_string());
        info.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
        info.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(|v| v.to_string());
        info.track_no = tag.get_string(&ItemKey::TrackNumber).and_then(parse_u16);
        info.disc_no = tag.get_string(&ItemKey::DiscNumber).and_then(parse_u16);
        info.year = tag.get_string(&ItemKey::Year).and_then(parse_year);
    }

    Ok(info)
}

/// Gate for catalog ingestion: title, artist credits, album, album artist,
/// track number and year must all be present or the file is skipped. A
/// missing disc number defaults to 1.
pub fn required_tags(info: TagInfo) -> Option<TrackTags> {
    Some(TrackTags {
        title: non_empty(info.title)?,
        artists: non_empty(info.artist)?,
        album: non_empty(info.album)?,
        album_artist: non_empty(info.album_artist)?,
        track_no: info.track_no?,
        disc_no: info.disc_no.unwrap_or(1),
        year: info.year?,
    })
}

/// Front-cover bytes from the file's embedded pictures, if any.
pub fn read_cover(path: &Path) -> Result<Option<CoverArt>, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => tag,
        None => return Ok(None),
    };

    let picture = match pick_picture(tag.pictures()) {
        Some(picture) => picture,
        None => return Ok(None),
    };

    let data = picture.data().to_vec();
    let mime = guess_mime(&data);
    Ok(Some(CoverArt { data, mime }))
}

/// Duration in seconds from the file's stream properties. This is a second
/// decode pass over the file, independent of whether the tag read
/// succeeded; the tag's own duration field is never trusted.
pub fn read_duration(path: &Path) -> Result<f64, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    Ok(tagged_file.properties().duration().as_secs_f64())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_u16(text: &str) -> Option<u16> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    for picture in pictures {
        if picture.pic_type() == PictureType::CoverFront {
            return Some(picture);
        }
    }
    pictures.first()
}

pub fn guess_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_u16, parse_year, required_tags, TagInfo};

    fn full_info() -> TagInfo {
        TagInfo {
            title: Some("A".into()),
            artist: Some("X;Y".into()),
            album: Some("M".into()),
            album_artist: Some("X".into()),
            track_no: Some(1),
            disc_no: Some(1),
            year: Some(2020),
        }
    }

    #[test]
    fn full_tags_pass_the_gate() {
        let tags = required_tags(full_info()).expect("complete tags");
        assert_eq!(tags.title, "A");
        assert_eq!(tags.artists, "X;Y");
        assert_eq!(tags.disc_no, 1);
    }

    #[test]
    fn missing_album_artist_is_rejected() {
        let mut info = full_info();
        info.album_artist = None;
        assert!(required_tags(info).is_none());
    }

    #[test]
    fn missing_year_is_rejected() {
        let mut info = full_info();
        info.year = None;
        assert!(required_tags(info).is_none());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut info = full_info();
        info.title = Some("   ".into());
        assert!(required_tags(info).is_none());
    }

    #[test]
    fn missing_disc_defaults_to_one() {
        let mut info = full_info();
        info.disc_no = None;
        assert_eq!(required_tags(info).unwrap().disc_no, 1);
    }

    #[test]
    fn track_numbers_with_totals_parse() {
        assert_eq!(parse_u16("3/12"), Some(3));
        assert_eq!(parse_u16(" 7 "), Some(7));
        assert_eq!(parse_u16("x"), None);
    }

    #[test]
    fn years_parse_from_dates() {
        assert_eq!(parse_year("2020-05-01"), Some(2020));
        assert_eq!(parse_year("1999"), Some(1999));
        assert_eq!(parse_year("n/a"), None);
    }
}
