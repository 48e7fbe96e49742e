use std::path::PathBuf;

use crate::plex::PlexError;
use crate::tags::Rating;

#[derive(Debug, Clone, PartialEq)]
pub struct LibrarySection {
    pub key: String,
    pub title: String,
}

/// A top-level entry of a library section. Music sections list artists.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub rating_key: String,
    pub kind: String,
    pub title: String,
}

impl CatalogItem {
    pub fn is_artist(&self) -> bool {
        self.kind == "artist"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
    pub rating_key: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackItem {
    pub rating_key: String,
    pub title: String,
    pub index: Option<u32>,
    pub user_rating: Option<Rating>,
    /// Local path of the first media part, if the server reported one.
    pub file: Option<PathBuf>,
}

/// The remote media catalog holding the authoritative per-track rating.
#[allow(async_fn_in_trait)]
pub trait RemoteCatalog {
    async fn section(&self, name: &str) -> Result<LibrarySection, PlexError>;

    async fn items(&self, section: &LibrarySection) -> Result<Vec<CatalogItem>, PlexError>;

    async fn albums(&self, artist: &CatalogItem) -> Result<Vec<Album>, PlexError>;

    async fn tracks(&self, album: &Album) -> Result<Vec<TrackItem>, PlexError>;

    async fn rating(&self, track: &TrackItem) -> Result<Option<Rating>, PlexError>;

    async fn set_rating(&self, track: &TrackItem, rating: Rating) -> Result<(), PlexError>;
}
