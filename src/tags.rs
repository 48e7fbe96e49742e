//! Reading and writing the rating stored in local audio file tags.
//!
//! Ratings are exchanged on the Plex scale (0 to 10, where one star is 2).
//! Each tag format keeps its own on-disk convention:
//!
//! - ID3v2 (MP3, AIFF): the first `POPM` frame, a byte from 0 to 255.
//! - Vorbis comments (FLAC, Ogg, Opus): a `RATING` field from 0 to 100.
//! - MP4 (M4A): a `rate` atom from 0 to 100.
//!
//! A zero on any scale means "not rated".

use std::path::Path;

use id3::frame::{Content, Popularimeter};
use id3::{Frame, TagLike, Version};
use lofty::config::{ParseOptions, WriteOptions};
use lofty::file::TaggedFile;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag, TagType};

/// A rating on the Plex 0..=10 scale.
pub type Rating = f64;

pub const SUPPORTED_EXTENSIONS: &[&str] = &["flac", "m4a", "mp3", "ogg", "opus", "aif", "aiff"];

const POPM_USER: &str = "plex-ratings-sync";

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("Failed to read tags from {path}: {message}")]
    Read { path: String, message: String },
    #[error("Failed to write tags to {path}: {message}")]
    Write { path: String, message: String },
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
}

impl TagError {
    fn read(path: &Path, message: impl ToString) -> Self {
        TagError::Read {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    fn write(path: &Path, message: impl ToString) -> Self {
        TagError::Write {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Access to the rating embedded in a local audio file.
pub trait TagCodec {
    fn read_rating(&self, path: &Path) -> Result<Option<Rating>, TagError>;

    fn write_rating(&self, path: &Path, rating: Rating) -> Result<(), TagError>;
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    /// MP3, or AIFF with an `ID3 ` chunk.
    Id3,
    Lofty,
}

fn container_of(path: &Path) -> Result<Container, TagError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" | "aif" | "aiff" => Ok(Container::Id3),
        "flac" | "ogg" | "opus" | "m4a" => Ok(Container::Lofty),
        _ => Err(TagError::Unsupported(path.display().to_string())),
    }
}

/// The codec used against real files.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTagCodec;

impl TagCodec for FileTagCodec {
    fn read_rating(&self, path: &Path) -> Result<Option<Rating>, TagError> {
        match container_of(path)? {
            Container::Id3 => read_id3_rating(path),
            Container::Lofty => read_lofty_rating(path),
        }
    }

    fn write_rating(&self, path: &Path, rating: Rating) -> Result<(), TagError> {
        match container_of(path)? {
            Container::Id3 => write_id3_rating(path, rating),
            Container::Lofty => write_lofty_rating(path, rating),
        }
    }
}

// ID3v2

// id3 tells MP3 and AIFF apart by the file's magic bytes.
fn read_id3_tag(path: &Path) -> Result<Option<id3::Tag>, TagError> {
    match id3::Tag::read_from_path(path) {
        Ok(tag) => Ok(Some(tag)),
        Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => Ok(None),
        Err(e) => Err(TagError::read(path, e)),
    }
}

fn read_id3_rating(path: &Path) -> Result<Option<Rating>, TagError> {
    let Some(tag) = read_id3_tag(path)? else {
        return Ok(None);
    };
    Ok(popularimeter(&tag).and_then(|p| popm_to_rating(p.rating)))
}

fn popularimeter(tag: &id3::Tag) -> Option<&Popularimeter> {
    tag.frames().find_map(|frame| match frame.content() {
        Content::Popularimeter(p) if frame.id() == "POPM" => Some(p),
        _ => None,
    })
}

fn write_id3_rating(path: &Path, rating: Rating) -> Result<(), TagError> {
    let mut tag = read_id3_tag(path)?.unwrap_or_else(id3::Tag::new);
    let counter = popularimeter(&tag).map(|p| p.counter).unwrap_or(0);

    let _ = tag.remove("POPM");
    let _ = tag.add_frame(Frame::with_content(
        "POPM",
        Content::Popularimeter(Popularimeter {
            user: POPM_USER.to_string(),
            rating: rating_to_popm(rating),
            counter,
        }),
    ));

    tag.write_to_path(path, Version::Id3v24)
        .map_err(|e| TagError::write(path, e))
}

/// Any non-zero byte is a rating of at least half a star.
fn popm_to_rating(byte: u8) -> Option<Rating> {
    if byte == 0 {
        return None;
    }
    Some(((f64::from(byte) / 25.5 * 2.0).round() / 2.0).max(0.5))
}

fn rating_to_popm(rating: Rating) -> u8 {
    if rating <= 0.0 {
        return 0;
    }
    (rating.min(10.0) * 25.5).round().max(1.0) as u8
}

// Vorbis comments and MP4

// lofty maps `ItemKey::Popularimeter` to the Vorbis `RATING` field and the MP4 `rate` atom.
fn rating_key(tag_type: TagType) -> Option<ItemKey> {
    match tag_type {
        TagType::VorbisComments | TagType::Mp4Ilst => Some(ItemKey::Popularimeter),
        _ => None,
    }
}

fn read_tagged_file(path: &Path) -> Result<TaggedFile, TagError> {
    Probe::open(path)
        .map_err(|e| TagError::read(path, e))?
        .options(ParseOptions::new().read_properties(false))
        .read()
        .map_err(|e| TagError::read(path, e))
}

fn read_lofty_rating(path: &Path) -> Result<Option<Rating>, TagError> {
    let tagged_file = read_tagged_file(path)?;

    let tag_type = tagged_file.primary_tag_type();
    let Some(key) = rating_key(tag_type) else {
        return Err(TagError::Unsupported(format!(
            "{} ({tag_type:?})",
            path.display()
        )));
    };

    Ok(tagged_file
        .tag(tag_type)
        .and_then(|tag| tag.get_string(&key))
        .and_then(parse_percent_rating))
}

fn write_lofty_rating(path: &Path, rating: Rating) -> Result<(), TagError> {
    let mut tagged_file = read_tagged_file(path)?;

    let tag_type = tagged_file.primary_tag_type();
    let Some(key) = rating_key(tag_type) else {
        return Err(TagError::Unsupported(format!(
            "{} ({tag_type:?})",
            path.display()
        )));
    };

    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| TagError::write(path, format!("no {tag_type:?} tag available")))?;

    if !tag.insert_text(key, format_percent_rating(rating)) {
        return Err(TagError::write(
            path,
            format!("{tag_type:?} tag rejected the rating item"),
        ));
    }
    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| TagError::write(path, e))
}

fn parse_percent_rating(value: &str) -> Option<Rating> {
    let percent: f64 = value.trim().parse().ok()?;
    if !(percent > 0.0 && percent <= 100.0) {
        return None;
    }
    Some(((percent / 10.0 * 2.0).round() / 2.0).max(0.5))
}

fn format_percent_rating(rating: Rating) -> String {
    if rating <= 0.0 {
        return "0".to_string();
    }
    ((rating.min(10.0) * 10.0).round().max(1.0) as u32).to_string()
}
