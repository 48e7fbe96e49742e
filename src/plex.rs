use std::path::PathBuf;

use log::debug;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::catalog::{Album, CatalogItem, LibrarySection, RemoteCatalog, TrackItem};
use crate::tags::Rating;

const LIBRARY_IDENTIFIER: &str = "com.plexapp.plugins.library";

#[derive(Debug, thiserror::Error)]
pub enum PlexError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid server URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Plex returned {status} for {path}")]
    Status { status: StatusCode, path: String },
    #[error("Library not found: {0}")]
    SectionNotFound(String),
}

// Plex wraps every JSON payload in a `MediaContainer`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MediaContainer")]
    media_container: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerIdentity {
    friendly_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<Directory>,
}

#[derive(Debug, Deserialize)]
struct Directory {
    key: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct MetadataContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<Metadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    rating_key: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    title: String,
    index: Option<u32>,
    user_rating: Option<f64>,
    #[serde(rename = "Media", default)]
    media: Vec<Media>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(rename = "Part", default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    file: Option<String>,
}

impl Metadata {
    fn first_file(&self) -> Option<PathBuf> {
        self.media
            .first()
            .and_then(|media| media.parts.first())
            .and_then(|part| part.file.as_deref())
            .map(PathBuf::from)
    }
}

impl From<Metadata> for TrackItem {
    fn from(metadata: Metadata) -> Self {
        let file = metadata.first_file();
        Self {
            rating_key: metadata.rating_key,
            title: metadata.title,
            index: metadata.index,
            // Plex reports a cleared rating as 0
            user_rating: metadata.user_rating.filter(|rating| *rating > 0.0),
            file,
        }
    }
}

pub struct PlexClient {
    client: Client,
    base_url: Url,
    token: String,
    friendly_name: String,
}

impl PlexClient {
    /// Connect to the server and verify the token by fetching its identity.
    pub async fn connect(base_url: &str, token: &str) -> Result<Self, PlexError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut client = Self {
            client: Client::new(),
            base_url,
            token: token.to_string(),
            friendly_name: String::new(),
        };

        let identity: ServerIdentity = client.get("").await?;
        client.friendly_name = identity
            .friendly_name
            .unwrap_or_else(|| client.base_url.to_string());
        Ok(client)
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, PlexError> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("X-Plex-Token", &self.token);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, PlexError> {
        let url = self.endpoint(path, query)?;
        debug!("{} /{}", method, path);

        let response = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlexError::Status {
                status,
                path: format!("/{path}"),
            });
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlexError> {
        let envelope: Envelope<T> = self.send(Method::GET, path, &[]).await?.json().await?;
        Ok(envelope.media_container)
    }

    async fn children(&self, rating_key: &str) -> Result<Vec<Metadata>, PlexError> {
        let container: MetadataContainer = self
            .get(&format!("library/metadata/{rating_key}/children"))
            .await?;
        Ok(container.metadata)
    }
}

impl RemoteCatalog for PlexClient {
    async fn section(&self, name: &str) -> Result<LibrarySection, PlexError> {
        let container: DirectoryContainer = self.get("library/sections").await?;
        container
            .directories
            .into_iter()
            .find(|directory| directory.title == name)
            .map(|directory| LibrarySection {
                key: directory.key,
                title: directory.title,
            })
            .ok_or_else(|| PlexError::SectionNotFound(name.to_string()))
    }

    async fn items(&self, section: &LibrarySection) -> Result<Vec<CatalogItem>, PlexError> {
        let container: MetadataContainer = self
            .get(&format!("library/sections/{}/all", section.key))
            .await?;
        Ok(container
            .metadata
            .into_iter()
            .map(|metadata| CatalogItem {
                rating_key: metadata.rating_key,
                kind: metadata.kind,
                title: metadata.title,
            })
            .collect())
    }

    async fn albums(&self, artist: &CatalogItem) -> Result<Vec<Album>, PlexError> {
        Ok(self
            .children(&artist.rating_key)
            .await?
            .into_iter()
            .map(|metadata| Album {
                rating_key: metadata.rating_key,
                title: metadata.title,
            })
            .collect())
    }

    async fn tracks(&self, album: &Album) -> Result<Vec<TrackItem>, PlexError> {
        Ok(self
            .children(&album.rating_key)
            .await?
            .into_iter()
            .map(TrackItem::from)
            .collect())
    }

    // Track listings are fetched fresh for every album, so the rating they carry is live.
    async fn rating(&self, track: &TrackItem) -> Result<Option<Rating>, PlexError> {
        Ok(track.user_rating)
    }

    async fn set_rating(&self, track: &TrackItem, rating: Rating) -> Result<(), PlexError> {
        let rating = rating.to_string();
        self.send(
            Method::PUT,
            ":/rate",
            &[
                ("key", track.rating_key.as_str()),
                ("identifier", LIBRARY_IDENTIFIER),
                ("rating", rating.as_str()),
            ],
        )
        .await?;
        Ok(())
    }
}
