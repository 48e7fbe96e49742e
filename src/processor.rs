use std::fmt;
use std::path::Path;
use std::time::Instant;

use log::{debug, warn};

use crate::cache::{file_mtime, RatingCache};
use crate::catalog::{RemoteCatalog, TrackItem};
use crate::error::SyncError;
use crate::mode::{Action, Mode};
use crate::tags::{is_supported, Rating, TagCodec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    PlexToFile,
    FileToPlex,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::PlexToFile => f.write_str("Plex->File"),
            Direction::FileToPlex => f.write_str("File->Plex"),
        }
    }
}

/// One applied (or, in a dry run, planned) rating change.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecord {
    pub mode: Mode,
    pub direction: Direction,
    pub title: String,
    pub old: Option<Rating>,
    pub new: Rating,
    pub dry_run: bool,
}

impl fmt::Display for UpdateRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "⚡ {} ({}): {} (", self.mode.label(), self.direction, self.title)?;
        match self.old {
            Some(old) => write!(f, "{old}")?,
            None => f.write_str("None")?,
        }
        write!(f, " -> {})", self.new)?;
        if self.dry_run {
            f.write_str(" [dry run]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMediaFile,
    FileNotFound,
    UnsupportedType,
    /// Cache keys are UTF-8, so the path has no stable key.
    NonUtf8Path,
    Vanished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    InSync,
    Updated(Direction),
}

/// Reconciles the rating of a single track between Plex and its file.
pub struct TrackProcessor<'a, C, T> {
    catalog: &'a C,
    codec: &'a T,
    dry_run: bool,
}

impl<'a, C: RemoteCatalog, T: TagCodec> TrackProcessor<'a, C, T> {
    pub fn new(catalog: &'a C, codec: &'a T, dry_run: bool) -> Self {
        Self {
            catalog,
            codec,
            dry_run,
        }
    }

    /// Performs at most one write, to Plex or to the file, never both.
    pub async fn process(
        &self,
        track: &TrackItem,
        mode: Mode,
        cache: &mut RatingCache,
        changes: &mut Vec<UpdateRecord>,
    ) -> Result<Outcome, SyncError> {
        let started = Instant::now();

        let Some(path) = track.file.as_deref() else {
            warn!("▸ No media file reported for {}", track.title);
            return Ok(Outcome::Skipped(SkipReason::NoMediaFile));
        };

        debug!(
            "Track: {:02}. {} ({})",
            track.index.unwrap_or(0),
            track.title,
            file_name(path)
        );

        if !path.exists() {
            warn!("▸ File not found on disk: {}", path.display());
            return Ok(Outcome::Skipped(SkipReason::FileNotFound));
        }
        if !is_supported(path) {
            warn!("▸ Skipping unsupported file type: {}", path.display());
            return Ok(Outcome::Skipped(SkipReason::UnsupportedType));
        }
        let Some(key) = path.to_str() else {
            debug!("▸ Skipping path that is not valid UTF-8: {}", path.display());
            return Ok(Outcome::Skipped(SkipReason::NonUtf8Path));
        };

        let remote = self.catalog.rating(track).await?;

        let mtime = match file_mtime(path) {
            Ok(mtime) => mtime,
            Err(e) => {
                debug!("▸ File vanished before it could be read: {}", e);
                return Ok(Outcome::Skipped(SkipReason::Vanished));
            }
        };

        let local = match cache.get_rating(key, mtime) {
            Some(rating) => rating,
            None => {
                let rating = self.codec.read_rating(path)?;
                cache.put(key, mtime, rating);
                rating
            }
        };

        let outcome = match mode.decide(remote, local) {
            Action::None => {
                debug!("▸ Ratings already match");
                Outcome::InSync
            }
            Action::WriteRemote(rating) => {
                if !self.dry_run {
                    self.catalog.set_rating(track, rating).await?;
                }
                self.record(changes, mode, Direction::FileToPlex, track, remote, rating);
                Outcome::Updated(Direction::FileToPlex)
            }
            Action::WriteLocal(rating) => {
                if !self.dry_run {
                    if let Err(e) = self.codec.write_rating(path, rating) {
                        // The file may have been partially rewritten.
                        cache.invalidate(key);
                        return Err(e.into());
                    }
                    match file_mtime(path) {
                        Ok(new_mtime) => cache.put(key, new_mtime, Some(rating)),
                        Err(e) => {
                            warn!("▸ Could not stat {} after writing: {}", path.display(), e);
                            cache.invalidate(key);
                        }
                    }
                }
                self.record(changes, mode, Direction::PlexToFile, track, local, rating);
                Outcome::Updated(Direction::PlexToFile)
            }
        };

        debug!("▸ Processed in {:?}", started.elapsed());
        Ok(outcome)
    }

    fn record(
        &self,
        changes: &mut Vec<UpdateRecord>,
        mode: Mode,
        direction: Direction,
        track: &TrackItem,
        old: Option<Rating>,
        new: Rating,
    ) {
        let record = UpdateRecord {
            mode,
            direction,
            title: track.title.clone(),
            old,
            new,
            dry_run: self.dry_run,
        };
        warn!("{record}");
        changes.push(record);
    }
}

fn file_name(path: &Path) -> std::borrow::Cow<'_, str> {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy())
}
