use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use log::{debug, error, info, warn};

use crate::cache::RatingCache;
use crate::catalog::{Album, CatalogItem, RemoteCatalog};
use crate::mode::Mode;
use crate::processor::{TrackProcessor, UpdateRecord};
use crate::tags::TagCodec;

/// Counts processed tracks and says when the next periodic flush is due.
#[derive(Debug)]
pub struct FlushSchedule {
    interval: usize,
    since_flush: usize,
}

impl FlushSchedule {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            since_flush: 0,
        }
    }

    pub fn tick(&mut self) -> bool {
        self.since_flush += 1;
        if self.since_flush >= self.interval {
            self.since_flush = 0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalkSummary {
    pub processed: usize,
    pub failed: usize,
    pub periodic_flushes: usize,
    pub elapsed: Duration,
}

/// Walks the configured library sections and feeds every track to the processor.
pub struct LibraryWalker<'a, C, T> {
    catalog: &'a C,
    processor: TrackProcessor<'a, C, T>,
    libraries: &'a [String],
    progress: &'a ProgressBar,
    save_interval: usize,
}

impl<'a, C: RemoteCatalog, T: TagCodec> LibraryWalker<'a, C, T> {
    pub fn new(
        catalog: &'a C,
        processor: TrackProcessor<'a, C, T>,
        libraries: &'a [String],
        progress: &'a ProgressBar,
        save_interval: usize,
    ) -> Self {
        Self {
            catalog,
            processor,
            libraries,
            progress,
            save_interval,
        }
    }

    pub async fn run(
        &self,
        mode: Mode,
        cache: &mut RatingCache,
        changes: &mut Vec<UpdateRecord>,
    ) -> WalkSummary {
        let started = Instant::now();
        let mut summary = WalkSummary::default();
        let mut schedule = FlushSchedule::new(self.save_interval);

        for library_name in self.libraries {
            info!("Processing Plex library: {}", library_name);

            let section = match self.catalog.section(library_name).await {
                Ok(section) => section,
                Err(e) => {
                    error!("Library not found: {} ({})", library_name, e);
                    continue;
                }
            };

            let items = match self.catalog.items(&section).await {
                Ok(items) => items,
                Err(e) => {
                    error!("Failed to list library {}: {}", library_name, e);
                    continue;
                }
            };
            if items.is_empty() {
                warn!("No items found in library: {}", library_name);
                continue;
            }

            for artist in items.iter().filter(|item| item.is_artist()) {
                self.walk_artist(artist, mode, cache, changes, &mut schedule, &mut summary)
                    .await;
            }
        }

        summary.elapsed = started.elapsed();
        self.progress.finish_and_clear();
        info!(
            "Processed {} tracks in {}",
            summary.processed,
            format_elapsed(summary.elapsed)
        );

        cache.flush();
        summary
    }

    async fn walk_artist(
        &self,
        artist: &CatalogItem,
        mode: Mode,
        cache: &mut RatingCache,
        changes: &mut Vec<UpdateRecord>,
        schedule: &mut FlushSchedule,
        summary: &mut WalkSummary,
    ) {
        debug!("Artist: {}", artist.title);
        let albums = match self.catalog.albums(artist).await {
            Ok(albums) => albums,
            Err(e) => {
                error!("Failed to list albums of {}: {}", artist.title, e);
                return;
            }
        };
        for album in &albums {
            self.walk_album(album, mode, cache, changes, schedule, summary)
                .await;
        }
    }

    async fn walk_album(
        &self,
        album: &Album,
        mode: Mode,
        cache: &mut RatingCache,
        changes: &mut Vec<UpdateRecord>,
        schedule: &mut FlushSchedule,
        summary: &mut WalkSummary,
    ) {
        let tracks = match self.catalog.tracks(album).await {
            Ok(tracks) => tracks,
            Err(e) => {
                error!("Failed to list tracks of {}: {}", album.title, e);
                return;
            }
        };
        if tracks.is_empty() {
            return;
        }
        debug!("Album: {}", album.title);

        for track in &tracks {
            if let Err(e) = self.processor.process(track, mode, cache, changes).await {
                summary.failed += 1;
                error!("Failed to process {}: {}", track.title, e);
            }
            summary.processed += 1;
            self.progress.inc(1);
            self.progress
                .set_message(format!("{} tracks processed", summary.processed));

            if schedule.tick() {
                summary.periodic_flushes += 1;
                cache.flush();
            }
        }
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, secs % 3600 / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}
