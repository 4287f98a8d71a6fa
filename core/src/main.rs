//! docksmith: a container-update manager for self-hosted Docker
//! deployments (spec.md §1). Boots the runtime context, resumes any
//! self-update left `pending_restart` by a predecessor process, starts the
//! scheduler's background sweeps, and serves the HTTP/SSE API.

use std::sync::Arc;

use tracing::{error, info};

use docksmith_core::{
  api::{self, AppState},
  config::Config,
  context::RuntimeContext,
  orchestrator,
  scheduler::Scheduler,
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config = Config::load()?;
  logger::init(&config.log_config())?;

  info!(version = env!("CARGO_PKG_VERSION"), "starting docksmith");

  let ctx = Arc::new(RuntimeContext::build(config).await?);

  if let Err(e) = orchestrator::resume_pending_restarts(&ctx).await {
    error!(error = %e, "failed to resume pending self-update restarts");
  }

  let scheduler = Scheduler::new(ctx.clone());
  scheduler.spawn();
  // Run an initial discovery sweep immediately rather than waiting out the
  // first `CHECK_INTERVAL` tick, so `/api/status` has data right away.
  scheduler.trigger_check().await;

  let app = api::router(AppState { ctx, scheduler });

  let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
  let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
  info!(addr = %bind_addr, "listening");

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  Ok(())
}

/// Waits for either SIGTERM or SIGINT (Ctrl-C) so `docker stop` sends a
/// clean shutdown through axum's graceful-shutdown path rather than
/// killing in-flight requests.
async fn shutdown_signal() {
  let ctrl_c = async {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
  };

  #[cfg(unix)]
  let terminate = async {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
      .expect("failed to install SIGTERM handler")
      .recv()
      .await;
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {}
    _ = terminate => {}
  }
  info!("shutdown signal received, draining in-flight requests");
}
