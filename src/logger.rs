use chrono::Local;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::{LevelFilter, Log, Metadata, Record};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Dependencies only get to speak at warn and above.
const DEPENDENCY_LEVEL: LevelFilter = LevelFilter::Warn;

struct SimpleLogger {
    level: LevelFilter,
}

impl SimpleLogger {
    fn max_level_for(&self, target: &str) -> LevelFilter {
        if target.starts_with(env!("CARGO_CRATE_NAME")) {
            self.level
        } else {
            self.level.min(DEPENDENCY_LEVEL)
        }
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{}", format_line(&Local::now().format(TIMESTAMP_FORMAT), record));
        }
    }

    fn flush(&self) {}
}

fn format_line(timestamp: &impl std::fmt::Display, record: &Record) -> String {
    format!("{} {:<5} {}", timestamp, record.level(), record.args())
}

/// Install the logger behind `LogWrapper` so log lines are printed above the
/// progress bars of the returned `MultiProgress` instead of tearing them.
pub fn init(level: LevelFilter) -> Result<MultiProgress, log::SetLoggerError> {
    let multi = MultiProgress::new();
    LogWrapper::new(multi.clone(), SimpleLogger { level }).try_init()?;
    log::set_max_level(level);
    Ok(multi)
}
