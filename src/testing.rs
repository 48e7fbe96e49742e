//! In-memory stand-ins for Plex and the tag codec.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use reqwest::StatusCode;

use crate::cache::file_mtime;
use crate::catalog::{Album, CatalogItem, LibrarySection, RemoteCatalog, TrackItem};
use crate::plex::PlexError;
use crate::tags::{Rating, TagCodec, TagError};

const INITIAL_MTIME: u64 = 1_700_000_000;

pub fn track(key: &str, title: &str, rating: Option<Rating>, file: Option<PathBuf>) -> TrackItem {
    TrackItem {
        rating_key: key.to_string(),
        title: title.to_string(),
        index: Some(1),
        user_rating: rating,
        file,
    }
}

/// Create a placeholder audio file with a fixed modification time.
pub fn audio_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"not really audio").expect("write audio fixture");
    set_mtime(&path, INITIAL_MTIME);
    path
}

pub fn set_mtime(path: &Path, secs: u64) {
    set_mtime_exact(path, UNIX_EPOCH + Duration::from_secs(secs));
}

fn set_mtime_exact(path: &Path, when: std::time::SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(when))
        .expect("set mtime");
}

fn server_error(path: &str) -> PlexError {
    PlexError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        path: path.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct FakeCatalog {
    sections: Vec<(LibrarySection, Vec<CatalogItem>)>,
    albums: HashMap<String, Vec<Album>>,
    tracks: HashMap<String, Vec<TrackItem>>,
    ratings: RefCell<HashMap<String, Option<Rating>>>,
    rating_reads: Cell<usize>,
    rating_writes: RefCell<Vec<(String, Rating)>>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    failing_albums: HashSet<String>,
    stalled_reads: HashSet<String>,
}

impl FakeCatalog {
    pub fn add_section(&mut self, name: &str) {
        if self.sections.iter().any(|(section, _)| section.title == name) {
            return;
        }
        let section = LibrarySection {
            key: (self.sections.len() + 1).to_string(),
            title: name.to_string(),
        };
        self.sections.push((section, Vec::new()));
    }

    pub fn add_item(&mut self, section: &str, item: CatalogItem) {
        self.add_section(section);
        let (_, items) = self
            .sections
            .iter_mut()
            .find(|(s, _)| s.title == section)
            .expect("section");
        if !items.iter().any(|i| i.rating_key == item.rating_key) {
            items.push(item);
        }
    }

    pub fn add_album(&mut self, section: &str, artist: &str, album: &str) -> String {
        let artist_key = format!("{section}/{artist}");
        self.add_item(
            section,
            CatalogItem {
                rating_key: artist_key.clone(),
                kind: "artist".to_string(),
                title: artist.to_string(),
            },
        );
        let album_key = format!("{artist_key}/{album}");
        let albums = self.albums.entry(artist_key).or_default();
        if !albums.iter().any(|a| a.rating_key == album_key) {
            albums.push(Album {
                rating_key: album_key.clone(),
                title: album.to_string(),
            });
        }
        album_key
    }

    pub fn add_track(&mut self, section: &str, artist: &str, album: &str, track: TrackItem) {
        let album_key = self.add_album(section, artist, album);
        self.ratings
            .borrow_mut()
            .insert(track.rating_key.clone(), track.user_rating);
        self.tracks.entry(album_key).or_default().push(track);
    }

    pub fn fail_reads_for(&mut self, rating_key: &str) {
        self.failing_reads.insert(rating_key.to_string());
    }

    pub fn fail_writes_for(&mut self, rating_key: &str) {
        self.failing_writes.insert(rating_key.to_string());
    }

    /// Rating reads for this track never complete.
    pub fn stall_reads_for(&mut self, rating_key: &str) {
        self.stalled_reads.insert(rating_key.to_string());
    }

    pub fn fail_albums_for(&mut self, section: &str, artist: &str) {
        self.failing_albums.insert(format!("{section}/{artist}"));
    }

    pub fn remote_rating(&self, rating_key: &str) -> Option<Rating> {
        self.ratings.borrow().get(rating_key).copied().flatten()
    }

    pub fn rating_reads(&self) -> usize {
        self.rating_reads.get()
    }

    pub fn rating_writes(&self) -> Vec<(String, Rating)> {
        self.rating_writes.borrow().clone()
    }
}

impl RemoteCatalog for FakeCatalog {
    async fn section(&self, name: &str) -> Result<LibrarySection, PlexError> {
        self.sections
            .iter()
            .find(|(section, _)| section.title == name)
            .map(|(section, _)| section.clone())
            .ok_or_else(|| PlexError::SectionNotFound(name.to_string()))
    }

    async fn items(&self, section: &LibrarySection) -> Result<Vec<CatalogItem>, PlexError> {
        Ok(self
            .sections
            .iter()
            .find(|(s, _)| s.key == section.key)
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }

    async fn albums(&self, artist: &CatalogItem) -> Result<Vec<Album>, PlexError> {
        if self.failing_albums.contains(&artist.rating_key) {
            return Err(server_error(&artist.rating_key));
        }
        Ok(self
            .albums
            .get(&artist.rating_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn tracks(&self, album: &Album) -> Result<Vec<TrackItem>, PlexError> {
        let ratings = self.ratings.borrow();
        Ok(self
            .tracks
            .get(&album.rating_key)
            .map(|tracks| {
                tracks
                    .iter()
                    .map(|t| TrackItem {
                        user_rating: ratings.get(&t.rating_key).copied().flatten(),
                        ..t.clone()
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn rating(&self, track: &TrackItem) -> Result<Option<Rating>, PlexError> {
        if self.failing_reads.contains(&track.rating_key) {
            return Err(server_error(&track.rating_key));
        }
        if self.stalled_reads.contains(&track.rating_key) {
            std::future::pending::<()>().await;
        }
        self.rating_reads.set(self.rating_reads.get() + 1);
        Ok(self.remote_rating(&track.rating_key))
    }

    async fn set_rating(&self, track: &TrackItem, rating: Rating) -> Result<(), PlexError> {
        if self.failing_writes.contains(&track.rating_key) {
            return Err(server_error(&track.rating_key));
        }
        self.ratings
            .borrow_mut()
            .insert(track.rating_key.clone(), Some(rating));
        self.rating_writes
            .borrow_mut()
            .push((track.rating_key.clone(), rating));
        Ok(())
    }
}

/// Keeps ratings in memory but touches the real file on write so its
/// modification time moves like a real tag write would.
#[derive(Debug, Default)]
pub struct FakeCodec {
    ratings: RefCell<HashMap<PathBuf, Option<Rating>>>,
    reads: Cell<usize>,
    writes: Cell<usize>,
    failing_writes: HashSet<PathBuf>,
}

impl FakeCodec {
    pub fn set(&self, path: &Path, rating: Option<Rating>) {
        self.ratings.borrow_mut().insert(path.to_path_buf(), rating);
    }

    pub fn rating(&self, path: &Path) -> Option<Rating> {
        self.ratings.borrow().get(path).copied().flatten()
    }

    pub fn fail_writes_for(&mut self, path: &Path) {
        self.failing_writes.insert(path.to_path_buf());
    }

    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }
}

impl TagCodec for FakeCodec {
    fn read_rating(&self, path: &Path) -> Result<Option<Rating>, TagError> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.rating(path))
    }

    fn write_rating(&self, path: &Path, rating: Rating) -> Result<(), TagError> {
        if self.failing_writes.contains(path) {
            return Err(TagError::Write {
                path: path.display().to_string(),
                message: "read-only file".to_string(),
            });
        }
        self.writes.set(self.writes.get() + 1);
        self.set(path, Some(rating));

        let mtime = file_mtime(path).expect("mtime of written file");
        let bumped = UNIX_EPOCH + Duration::from_secs_f64(mtime) + Duration::from_secs(1);
        set_mtime_exact(path, bumped);
        Ok(())
    }
}
