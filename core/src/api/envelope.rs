use chrono::{DateTime, Utc};
use serde::Serialize;

/// The response envelope every handler returns (spec §6): `data` is
/// omitted on error, `error` is omitted on success.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<serde_json::Value>,
  pub timestamp: DateTime<Utc>,
  pub version: &'static str,
}

impl<T> Envelope<T> {
  pub fn ok(data: T) -> Self {
    Envelope {
      success: true,
      data: Some(data),
      error: None,
      timestamp: Utc::now(),
      version: env!("CARGO_PKG_VERSION"),
    }
  }

  pub fn err(error: serde_json::Value) -> Self {
    Envelope {
      success: false,
      data: None,
      error: Some(error),
      timestamp: Utc::now(),
      version: env!("CARGO_PKG_VERSION"),
    }
  }
}
