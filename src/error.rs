use crate::plex::PlexError;
use crate::tags::TagError;

/// Failure while processing a single track.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Plex(#[from] PlexError),
    #[error(transparent)]
    Tag(#[from] TagError),
}
