use std::time::Duration;

use indicatif::ProgressBar;
use log::{info, warn};

use crate::cache::{CacheGuard, RatingCache, CACHE_SAVE_INTERVAL};
use crate::catalog::RemoteCatalog;
use crate::mode::Mode;
use crate::processor::{TrackProcessor, UpdateRecord};
use crate::tags::TagCodec;
use crate::walker::LibraryWalker;

const RULE_WIDTH: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub mode: Mode,
    pub processed: usize,
    pub failed: usize,
    pub changes: Vec<UpdateRecord>,
    pub elapsed: Duration,
}

/// Runs full passes over the configured libraries.
///
/// The controller owns the rating cache through a [`CacheGuard`], so pending
/// cache entries are written out whenever the controller is dropped, including
/// when a run is cancelled mid-way. Applied changes are logged on the
/// controller as they happen so a cancelled run can still report them.
pub struct RunController<C, T> {
    catalog: C,
    codec: T,
    libraries: Vec<String>,
    dry_run: bool,
    cache: CacheGuard,
    changes: Vec<UpdateRecord>,
    progress: ProgressBar,
}

impl<C: RemoteCatalog, T: TagCodec> RunController<C, T> {
    pub fn new(
        catalog: C,
        codec: T,
        cache: RatingCache,
        libraries: Vec<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            catalog,
            codec,
            libraries,
            dry_run,
            cache: CacheGuard::new(cache),
            changes: Vec::new(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Synchronize ratings between Plex and the audio files.
    pub async fn sync(&mut self) -> RunReport {
        self.run(Mode::Sync).await
    }

    /// Import ratings from the audio files into Plex.
    pub async fn import(&mut self) -> RunReport {
        self.run(Mode::Import).await
    }

    /// Export ratings from Plex into the audio files.
    pub async fn export(&mut self) -> RunReport {
        self.run(Mode::Export).await
    }

    pub async fn run(&mut self, mode: Mode) -> RunReport {
        let (subject, sides) = banner(mode);
        info!("{} started: {}", subject, sides);
        if self.dry_run {
            warn!("Running in dry-run mode (no changes will be made)");
        }

        self.changes.clear();
        let processor = TrackProcessor::new(&self.catalog, &self.codec, self.dry_run);
        let walker = LibraryWalker::new(
            &self.catalog,
            processor,
            &self.libraries,
            &self.progress,
            CACHE_SAVE_INTERVAL,
        );
        let summary = walker.run(mode, &mut self.cache, &mut self.changes).await;

        print_summary(&self.changes, summary.failed);
        info!("{} completed: {}", subject, sides);

        RunReport {
            mode,
            processed: summary.processed,
            failed: summary.failed,
            changes: std::mem::take(&mut self.changes),
            elapsed: summary.elapsed,
        }
    }

    /// Report a run whose future was dropped before it finished.
    ///
    /// Prints the summary of every change applied so far and hands the
    /// records back. Tracks that failed before the interruption are only
    /// visible in the error log.
    pub fn interrupted(&mut self) -> Vec<UpdateRecord> {
        self.progress.finish_and_clear();
        warn!("Run interrupted after {} changes", self.changes.len());
        print_summary(&self.changes, 0);
        std::mem::take(&mut self.changes)
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn codec(&self) -> &T {
        &self.codec
    }

    pub fn cache(&self) -> &RatingCache {
        &self.cache
    }
}

fn banner(mode: Mode) -> (&'static str, &'static str) {
    match mode {
        Mode::Sync => ("Synchronization", "Plex ⇄ Audio Files"),
        Mode::Import => ("Import", "Audio Files → Plex"),
        Mode::Export => ("Export", "Plex → Audio Files"),
    }
}

fn print_summary(changes: &[UpdateRecord], failed: usize) {
    let rule = "=".repeat(RULE_WIDTH);
    info!("{}", rule);
    if changes.is_empty() {
        info!(" SUMMARY: NO CHANGES WERE NEEDED");
    } else {
        info!(" SUMMARY: {} TRACKS UPDATED", changes.len());
        info!("{}", rule);
        for change in changes {
            info!("{}", change);
        }
    }
    if failed > 0 {
        warn!(" {} tracks failed, see the errors above", failed);
    }
    info!("{}", rule);
}
