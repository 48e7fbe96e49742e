use std::fmt;

use crate::tags::Rating;

/// Which side of the pair may be overwritten during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Both directions, a present Plex rating wins.
    Sync,
    /// File to Plex only.
    Import,
    /// Plex to file only.
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    None,
    WriteRemote(Rating),
    WriteLocal(Rating),
}

impl Mode {
    pub fn decide(self, remote: Option<Rating>, local: Option<Rating>) -> Action {
        match self {
            Mode::Sync => decide_sync(remote, local),
            Mode::Import => decide_import(remote, local),
            Mode::Export => decide_export(remote, local),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Sync => "SYNC",
            Mode::Import => "IMPORT",
            Mode::Export => "EXPORT",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Mode::Sync => "sync",
            Mode::Import => "import",
            Mode::Export => "export",
        };
        f.write_str(name)
    }
}

pub fn decide_import(remote: Option<Rating>, local: Option<Rating>) -> Action {
    match local {
        Some(local) if remote != Some(local) => Action::WriteRemote(local),
        _ => Action::None,
    }
}

pub fn decide_export(remote: Option<Rating>, local: Option<Rating>) -> Action {
    match remote {
        Some(remote) if local != Some(remote) => Action::WriteLocal(remote),
        _ => Action::None,
    }
}

pub fn decide_sync(remote: Option<Rating>, local: Option<Rating>) -> Action {
    if remote == local {
        return Action::None;
    }
    match (remote, local) {
        (Some(remote), _) => Action::WriteLocal(remote),
        (None, Some(local)) => Action::WriteRemote(local),
        (None, None) => Action::None,
    }
}
