use std::fmt;

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// Error taxonomy from spec §7. Carried alongside an `anyhow::Error` chain
/// so call sites keep full context while callers can still match on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  Unavailable,
  PermissionDenied,
  Timeout,
  DatabaseError,
  PrecheckFailed,
  ValidationError,
  ComposeParseError,
  NoComposeFile,
  RollbackFailed,
  /// Stack busy - another update is already mid-flight for this stack.
  Conflict,
  Cancelled,
  SelfUpdateInProgress,
  Cycle,
}

impl ErrorKind {
  pub fn status(self) -> StatusCode {
    match self {
      ErrorKind::NotFound | ErrorKind::NoComposeFile => {
        StatusCode::NOT_FOUND
      }
      ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
      ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
      ErrorKind::ValidationError
      | ErrorKind::ComposeParseError
      | ErrorKind::Cycle => StatusCode::BAD_REQUEST,
      ErrorKind::Conflict | ErrorKind::SelfUpdateInProgress => {
        StatusCode::CONFLICT
      }
      ErrorKind::Cancelled => StatusCode::from_u16(499).unwrap(),
      ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
      ErrorKind::PrecheckFailed => StatusCode::UNPROCESSABLE_ENTITY,
      ErrorKind::DatabaseError | ErrorKind::RollbackFailed => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  /// `PrecheckFailed` carries a user-visible hint that `force=true` is
  /// available (spec §7).
  pub fn hint(self) -> Option<&'static str> {
    match self {
      ErrorKind::PrecheckFailed => {
        Some("re-issue the request with force=true to skip the pre-update check")
      }
      _ => None,
    }
  }
}

/// An error with a classified kind plus the full `anyhow` context chain.
pub struct AppError {
  pub kind: ErrorKind,
  pub error: anyhow::Error,
}

impl AppError {
  pub fn new(
    kind: ErrorKind,
    error: impl Into<anyhow::Error>,
  ) -> Self {
    Self { kind, error: error.into() }
  }

  pub fn not_found(msg: impl fmt::Display) -> Self {
    Self::new(ErrorKind::NotFound, anyhow::anyhow!("{msg}"))
  }

  pub fn conflict(msg: impl fmt::Display) -> Self {
    Self::new(ErrorKind::Conflict, anyhow::anyhow!("{msg}"))
  }

  pub fn validation(msg: impl fmt::Display) -> Self {
    Self::new(ErrorKind::ValidationError, anyhow::anyhow!("{msg}"))
  }

  /// Message format used for `error_message` on operations and SSE
  /// `stage=failed` events (spec §7).
  pub fn message(&self) -> String {
    match self.kind.hint() {
      Some(hint) => format!("{:#} ({hint})", self.error),
      None => format!("{:#}", self.error),
    }
  }
}

impl fmt::Debug for AppError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?} {:?}", self.kind, self.error)
  }
}

impl fmt::Display for AppError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.message())
  }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
  fn from(error: anyhow::Error) -> Self {
    Self { kind: ErrorKind::DatabaseError, error }
  }
}

impl From<sqlx::Error> for AppError {
  fn from(error: sqlx::Error) -> Self {
    let kind = match &error {
      sqlx::Error::RowNotFound => ErrorKind::NotFound,
      _ => ErrorKind::DatabaseError,
    };
    Self { kind, error: error.into() }
  }
}

#[derive(Serialize)]
struct EnvelopeError<'a> {
  kind: String,
  message: String,
  hint: Option<&'a str>,
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    tracing::warn!(kind = %self.kind, error = %self.error, "request failed");
    let status = self.kind.status();
    let body = crate::api::envelope::Envelope::<()>::err(
      serde_json::to_value(EnvelopeError {
        kind: self.kind.to_string(),
        message: self.message(),
        hint: self.kind.hint(),
      })
      .unwrap_or_default(),
    );
    (status, Json(body)).into_response()
  }
}

pub type AppResult<T> = Result<T, AppError>;
