//! Tracing bootstrap for the embedding application.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. With a log directory, output goes to a
/// daily-rotated file; otherwise to stderr. The returned guard must be held
/// for the lifetime of the process to keep the file writer flushing.
pub fn init(filter: Option<&str>, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let env_filter = match filter {
    Some(directive) => {
      EnvFilter::try_new(directive).map_err(|e| eyre!("Invalid log filter: {}", e))?
    }
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
  };

  if let Some(dir) = log_dir {
    let appender = tracing_appender::rolling::daily(dir, "reelfeed.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
      .with(env_filter)
      .with(fmt::layer().with_writer(writer).with_ansi(false))
      .try_init()
      .map_err(|e| eyre!("Failed to install subscriber: {}", e))?;
    Ok(Some(guard))
  } else {
    tracing_subscriber::registry()
      .with(env_filter)
      .with(fmt::layer())
      .try_init()
      .map_err(|e| eyre!("Failed to install subscriber: {}", e))?;
    Ok(None)
  }
}
