use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::Deserialize;

pub const APP_NAME: &str = "plex-ratings-sync";
pub const CONFIG_FILE_NAME: &str = "config.json";

const LOG_LEVEL_DEFAULT: LevelFilter = LevelFilter::Info;

/// Fixed locations checked for the cache directory after the environment overrides.
const CONTAINER_DIRS: [&str; 2] = ["/config", "/app/data"];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub plex_url: String,
    pub plex_token: String,
    pub libraries: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no Plex configuration: set PLEX_URL and PLEX_TOKEN or create {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("the Plex configuration is not valid: {0} is empty")]
    Empty(&'static str),
    #[error("no Plex libraries configured")]
    NoLibraries,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    plex: PlexSection,
}

#[derive(Debug, Deserialize)]
struct PlexSection {
    url: String,
    token: String,
    #[serde(default)]
    libraries: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(env_var, &config_file_path())
    }

    /// Build the configuration from `var` lookups, falling back to the JSON
    /// file at `file` when `PLEX_URL` and `PLEX_TOKEN` are not both set.
    pub fn from_vars(
        var: impl Fn(&str) -> Option<String>,
        file: &Path,
    ) -> Result<Self, ConfigError> {
        let dry_run = var("DRY_RUN").is_some_and(|v| is_truthy(&v));

        let (plex_url, plex_token, libraries) = match (var("PLEX_URL"), var("PLEX_TOKEN")) {
            (Some(url), Some(token)) => {
                let libraries = var("PLEX_LIBRARIES")
                    .map(|v| parse_libraries(&v))
                    .unwrap_or_default();
                (url, token, libraries)
            }
            _ => {
                let section = read_config_file(file)?;
                let libraries = section
                    .libraries
                    .iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                (section.url, section.token, libraries)
            }
        };

        if plex_url.trim().is_empty() {
            return Err(ConfigError::Empty("url"));
        }
        if plex_token.trim().is_empty() {
            return Err(ConfigError::Empty("token"));
        }
        if libraries.is_empty() {
            return Err(ConfigError::NoLibraries);
        }

        Ok(Self {
            plex_url: plex_url.trim().to_string(),
            plex_token: plex_token.trim().to_string(),
            libraries,
            dry_run,
        })
    }
}

fn read_config_file(path: &Path) -> Result<PlexSection, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let file: ConfigFile = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.plex)
}

/// Non-empty environment variable, or `None`.
pub fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Split a comma separated library list, trimming names and dropping empties.
pub fn parse_libraries(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Candidate cache directories in priority order.
pub fn cache_dir_candidates(
    explicit: Option<PathBuf>,
    var: impl Fn(&str) -> Option<String>,
) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = explicit.into_iter().collect();
    candidates.extend(
        ["CRON_CONFIG_DIR", "CONFIG_DIR"]
            .into_iter()
            .filter_map(|key| var(key))
            .map(PathBuf::from),
    );
    candidates.extend(CONTAINER_DIRS.iter().map(PathBuf::from));
    candidates.push(config_dir());
    candidates
}

fn parse_log_level(level: &str) -> Option<LevelFilter> {
    match level.trim().to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// `LOG_LEVEL` sets the base level, each `-v` raises it by one step up to trace.
pub fn log_level(verbose: u8, var: impl Fn(&str) -> Option<String>) -> LevelFilter {
    let base = var("LOG_LEVEL")
        .and_then(|v| {
            let level = parse_log_level(&v);
            if level.is_none() {
                eprintln!("Invalid log level: '{}'", v);
            }
            level
        })
        .unwrap_or(LOG_LEVEL_DEFAULT);
    let requested = match verbose {
        0 => base,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    base.max(requested)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
