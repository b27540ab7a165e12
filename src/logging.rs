//! tracing subscriber setup for applications embedding the crate

use std::fs;
use std::path::PathBuf;

use eyre::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn env_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    EnvFilter::from_default_env().add_directive(level.into())
}

/// Log to stderr; `RUST_LOG` directives are honored on top of the level
pub fn init(verbose: bool) -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(verbose))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

/// Log to `<data_local_dir>/netqueue/logs/netqueue.log`
pub fn init_file(verbose: bool) -> Result<PathBuf> {
    let log_dir = log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_path = log_dir.join("netqueue.log");
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(env_filter(verbose))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging initialized to {} (verbose: {})", log_path.display(), verbose);
    Ok(log_path)
}

pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("netqueue")
        .join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_layout() {
        let dir = log_dir();
        assert!(dir.ends_with("netqueue/logs"));
    }

    #[test]
    fn test_second_init_fails_cleanly() {
        // Whichever call installs the subscriber first wins; the other reports an error
        let first = init(true);
        let second = init(false);
        assert!(first.is_err() || second.is_err());
    }
}
