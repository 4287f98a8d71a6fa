use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
  Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Mirrors spec.md §6's `LOG_LEVEL ∈ {debug,info,warn,error}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
  Debug,
  #[default]
  Info,
  Warn,
  Error,
}

impl LogLevel {
  pub fn parse(s: &str) -> Self {
    match s.to_ascii_lowercase().as_str() {
      "debug" => Self::Debug,
      "warn" | "warning" => Self::Warn,
      "error" => Self::Error,
      _ => Self::Info,
    }
  }
}

impl From<LogLevel> for tracing::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Error => tracing::Level::ERROR,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
  pub level: LogLevel,
  /// Emit newline-delimited JSON instead of the human-readable format.
  pub json: bool,
  pub ansi: bool,
}

/// Initializes the global `tracing` subscriber. Safe to call once at
/// process startup; a second call returns an error rather than panicking.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
  let level: tracing::Level = config.level.into();
  let registry = Registry::default().with(LevelFilter::from(level));

  if config.json {
    registry
      .with(tracing_subscriber::fmt::layer().json())
      .try_init()
  } else {
    registry
      .with(
        tracing_subscriber::fmt::layer()
          .with_target(false)
          .with_ansi(config.ansi),
      )
      .try_init()
  }
  .context("failed to init logger")
}
