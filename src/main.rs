use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::cache::{cache_file_in, resolve_cache_dir, RatingCache};
use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::controller::RunController;
use crate::plex::PlexClient;
use crate::tags::FileTagCodec;

mod cache;
mod catalog;
mod cli;
mod config;
mod controller;
mod error;
mod logger;
mod mode;
mod plex;
mod processor;
mod tags;
#[cfg(test)]
mod testing;
mod walker;

/// Exit status after Ctrl-C, as a shell would report it.
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    if let Ok(path) = dotenv::dotenv() {
        // Logging is not up yet
        eprintln!("Loaded environment from {:?}", path);
    }

    let cli = Cli::parse();

    let multi = match logger::init(config::log_level(cli.verbose, config::env_var)) {
        Ok(multi) => multi,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let dry_run = cli.dry_run || config.dry_run;

    let plex = match PlexClient::connect(&config.plex_url, &config.plex_token).await {
        Ok(plex) => plex,
        Err(e) => {
            error!("Failed to connect to Plex at {}: {}", config.plex_url, e);
            return ExitCode::FAILURE;
        }
    };
    info!("Connected to Plex server: {}", plex.friendly_name());

    let cache_dir = resolve_cache_dir(config::cache_dir_candidates(
        cli.cache_dir.clone(),
        config::env_var,
    ));
    let cache = RatingCache::load(cache_file_in(&cache_dir));
    info!(
        "Starting {} run, rating cache at {}",
        cli.command.mode(),
        cache.path().display()
    );

    let spinner = multi.add(ProgressBar::new_spinner());
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(120));

    let mut controller =
        RunController::new(plex, FileTagCodec, cache, config.libraries, dry_run)
            .with_progress(spinner);

    let run = async {
        match cli.command {
            Command::Sync => controller.sync().await,
            Command::Import => controller.import().await,
            Command::Export => controller.export().await,
        }
    };

    let finished = tokio::select! {
        report = run => Some(report),
        Ok(()) = tokio::signal::ctrl_c() => None,
    };

    let code = match finished {
        Some(report) => {
            if report.failed > 0 {
                warn!(
                    "{} run finished with {} of {} tracks failing",
                    report.mode, report.failed, report.processed
                );
            }
            ExitCode::SUCCESS
        }
        None => {
            warn!("Interrupted, saving rating cache before exit");
            controller.interrupted();
            ExitCode::from(INTERRUPTED)
        }
    };

    // The controller's cache guard writes out pending entries.
    drop(controller);
    code
}
