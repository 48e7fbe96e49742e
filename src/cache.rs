use std::collections::HashMap;
use std::fs;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::tags::Rating;

pub const CACHE_FILE_NAME: &str = "rating_cache.json";

/// Number of processed tracks between two periodic flushes.
pub const CACHE_SAVE_INTERVAL: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub mtime: f64,
    pub rating: Option<Rating>,
}

/// Last-known file ratings keyed by absolute file path.
///
/// An entry is only trusted while the recorded modification time equals the
/// file's current one.
#[derive(Debug)]
pub struct RatingCache {
    path: PathBuf,
    entries: HashMap<String, CacheEntry>,
    dirty: bool,
}

impl RatingCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: HashMap::new(),
            dirty: false,
        }
    }

    /// Load the persisted cache. A missing or unreadable file yields an empty cache.
    pub fn load(path: PathBuf) -> Self {
        let mut cache = Self::new(path);
        if !cache.path.exists() {
            info!("No rating cache found at {}, starting fresh", cache.path.display());
            return cache;
        }
        match read_entries(&cache.path) {
            Ok(entries) => {
                info!(
                    "Loaded rating cache with {} entries from {}",
                    entries.len(),
                    cache.path.display()
                );
                cache.entries = entries;
            }
            Err(e) => {
                error!("Failed to load rating cache {}: {}", cache.path.display(), e);
            }
        }
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns `Some(rating)` on a cache hit, `None` on a miss.
    ///
    /// The inner rating may itself be `None` for files known to be unrated.
    pub fn get_rating(&self, path: &str, mtime: f64) -> Option<Option<Rating>> {
        self.entries
            .get(path)
            .filter(|entry| entry.mtime == mtime)
            .map(|entry| entry.rating)
    }

    pub fn put(&mut self, path: &str, mtime: f64, rating: Option<Rating>) {
        self.entries
            .insert(path.to_string(), CacheEntry { mtime, rating });
        self.dirty = true;
    }

    pub fn invalidate(&mut self, path: &str) {
        if self.entries.remove(path).is_some() {
            self.dirty = true;
        }
    }

    /// Persist pending changes. Returns whether anything was written.
    ///
    /// Errors are logged and leave the cache dirty so a later flush retries.
    pub fn flush(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        match write_entries(&self.path, &self.entries) {
            Ok(()) => {
                debug!(
                    "Saved rating cache with {} entries to {}",
                    self.entries.len(),
                    self.path.display()
                );
                self.dirty = false;
                true
            }
            Err(e) => {
                error!("Failed to save rating cache {}: {}", self.path.display(), e);
                false
            }
        }
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, CacheEntry>, io::Error> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data).map_err(io::Error::from)
}

fn write_entries(path: &Path, entries: &HashMap<String, CacheEntry>) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_vec(entries).map_err(io::Error::from)?;

    // Write a sibling temp file, then rename it over the target.
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}

/// Owns the cache for the duration of a run and flushes it when dropped,
/// whether the run returned, bailed out early or was cancelled.
#[derive(Debug)]
pub struct CacheGuard {
    cache: RatingCache,
}

impl CacheGuard {
    pub fn new(cache: RatingCache) -> Self {
        Self { cache }
    }
}

impl Deref for CacheGuard {
    type Target = RatingCache;

    fn deref(&self) -> &RatingCache {
        &self.cache
    }
}

impl DerefMut for CacheGuard {
    fn deref_mut(&mut self) -> &mut RatingCache {
        &mut self.cache
    }
}

impl Drop for CacheGuard {
    fn drop(&mut self) {
        self.cache.flush();
    }
}

/// Pick the first existing directory, falling back to the working directory.
pub fn resolve_cache_dir<I>(candidates: I) -> PathBuf
where
    I: IntoIterator<Item = PathBuf>,
{
    candidates
        .into_iter()
        .find(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn cache_file_in(dir: &Path) -> PathBuf {
    dir.join(CACHE_FILE_NAME)
}

/// Modification time in fractional seconds since the Unix epoch.
pub fn file_mtime(path: &Path) -> io::Result<f64> {
    let modified = fs::metadata(path)?.modified()?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(since_epoch.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = cache_file_in(dir.path());
        (dir, path)
    }

    #[test]
    fn hit_requires_matching_mtime() {
        let (_dir, path) = temp_cache();
        let mut cache = RatingCache::new(path);
        cache.put("/music/a.flac", 100.5, Some(8.0));

        assert_eq!(cache.get_rating("/music/a.flac", 100.5), Some(Some(8.0)));
        assert_eq!(cache.get_rating("/music/a.flac", 100.6), None);
        assert_eq!(cache.get_rating("/music/b.flac", 100.5), None);
    }

    #[test]
    fn unrated_entries_are_hits() {
        let (_dir, path) = temp_cache();
        let mut cache = RatingCache::new(path);
        cache.put("/music/a.mp3", 1.0, None);
        assert_eq!(cache.get_rating("/music/a.mp3", 1.0), Some(None));
    }

    #[test]
    fn put_marks_dirty_and_flush_clears() {
        let (_dir, path) = temp_cache();
        let mut cache = RatingCache::new(path.clone());
        assert!(!cache.flush());

        cache.put("/music/a.flac", 1.0, Some(2.0));
        assert!(cache.is_dirty());
        assert!(cache.flush());
        assert!(!cache.is_dirty());
        assert!(path.exists());
        assert!(!cache.flush());
    }

    #[test]
    fn invalidate_removes_entry() {
        let (_dir, path) = temp_cache();
        let mut cache = RatingCache::new(path);
        cache.put("/music/a.flac", 1.0, Some(2.0));
        cache.flush();

        cache.invalidate("/music/a.flac");
        assert!(cache.is_dirty());
        assert_eq!(cache.get_rating("/music/a.flac", 1.0), None);

        cache.flush();
        cache.invalidate("/music/missing.flac");
        assert!(!cache.is_dirty());
    }

    #[test]
    fn save_then_load_preserves_entries() {
        let (_dir, path) = temp_cache();
        let mut cache = RatingCache::new(path.clone());
        cache.put("/music/rated.flac", 1_700_000_000.123_456, Some(7.5));
        cache.put("/music/unrated.mp3", 1_700_000_001.5, None);
        assert!(cache.flush());

        let loaded = RatingCache::load(path);
        assert_eq!(loaded.len(), 2);
        assert!(!loaded.is_dirty());
        assert_eq!(
            loaded.get_rating("/music/rated.flac", 1_700_000_000.123_456),
            Some(Some(7.5))
        );
        assert_eq!(
            loaded.get_rating("/music/unrated.mp3", 1_700_000_001.5),
            Some(None)
        );
    }

    #[test]
    fn persisted_format_matches_documented_shape() {
        let (_dir, path) = temp_cache();
        let mut cache = RatingCache::new(path.clone());
        cache.put("/music/a.flac", 12.5, None);
        cache.flush();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
        assert_eq!(
            value,
            serde_json::json!({ "/music/a.flac": { "mtime": 12.5, "rating": null } })
        );
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, path) = temp_cache();
        let cache = RatingCache::load(path);
        assert_eq!(cache.len(), 0);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn corrupt_file_loads_empty_and_is_overwritten() {
        let (_dir, path) = temp_cache();
        fs::write(&path, b"{ not json").expect("write corrupt cache");

        let mut cache = RatingCache::load(path.clone());
        assert_eq!(cache.len(), 0);

        cache.put("/music/a.flac", 3.0, Some(4.0));
        assert!(cache.flush());

        let reloaded = RatingCache::load(path);
        assert_eq!(reloaded.get_rating("/music/a.flac", 3.0), Some(Some(4.0)));
    }

    #[test]
    fn structurally_invalid_file_loads_empty() {
        let (_dir, path) = temp_cache();
        fs::write(&path, br#"{"/music/a.flac": {"rating": 4}}"#).expect("write");
        assert_eq!(RatingCache::load(path).len(), 0);
    }

    #[test]
    fn flush_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("deeper").join(CACHE_FILE_NAME);
        let mut cache = RatingCache::new(path.clone());
        cache.put("/music/a.flac", 1.0, None);
        assert!(cache.flush());
        assert!(path.exists());
    }

    #[test]
    fn unwritable_location_keeps_cache_dirty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a file, not a directory").expect("write");

        let mut cache = RatingCache::new(blocker.join(CACHE_FILE_NAME));
        cache.put("/music/a.flac", 1.0, None);
        assert!(!cache.flush());
        assert!(cache.is_dirty());
    }

    #[test]
    fn guard_flushes_on_drop() {
        let (_dir, path) = temp_cache();
        {
            let mut guard = CacheGuard::new(RatingCache::new(path.clone()));
            guard.put("/music/a.flac", 9.0, Some(10.0));
        }
        let loaded = RatingCache::load(path);
        assert_eq!(loaded.get_rating("/music/a.flac", 9.0), Some(Some(10.0)));
    }

    #[test]
    fn resolve_picks_first_existing_directory() {
        let first = tempfile::tempdir().expect("temp dir");
        let second = tempfile::tempdir().expect("temp dir");
        let missing = first.path().join("does-not-exist");

        let resolved = resolve_cache_dir(vec![
            missing,
            second.path().to_path_buf(),
            first.path().to_path_buf(),
        ]);
        assert_eq!(resolved, second.path());
    }

    #[test]
    fn resolve_falls_back_to_working_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let resolved = resolve_cache_dir(vec![dir.path().join("nope")]);
        assert_eq!(resolved, PathBuf::from("."));
    }

    #[test]
    fn file_mtime_reflects_set_modified() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("a.flac");
        fs::write(&path, b"audio").expect("write");
        let when = UNIX_EPOCH + std::time::Duration::from_millis(1_600_000_000_250);
        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|f| f.set_modified(when))
            .expect("set mtime");

        assert_eq!(file_mtime(&path).expect("mtime"), 1_600_000_000.25);
    }
}
