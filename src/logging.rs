use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log file name theo giờ local: `2024-05-01T13-45-09.txt`.
fn log_file_name() -> String {
    let fmt = format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc()
        .to_offset(offset)
        .format(&fmt)
        .map(|s| format!("{s}.txt"))
        .unwrap_or_else(|_| "face_manager.txt".to_string())
}

/// Install the global subscriber: stdout always, plus a new file in `log_dir`.
///
/// `RUST_LOG` wins over `level` when set. Returns the log file path, if any.
pub fn init(level: &str, log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let level = level.trim().to_lowercase();
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    let stdout_layer = fmt::layer().with_target(true).with_filter(filter());

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
            let path = dir.join(log_file_name());
            let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter());
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    match &log_path {
        Some(p) => tracing::debug!(path = %p.display(), "writing logs to file"),
        None => tracing::info!("logs file disabled"),
    }
    Ok(log_path)
}
