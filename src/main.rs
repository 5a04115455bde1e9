//! HSK Story Backend
//!
//! - Axum HTTP API behind the graded-reader client: story generation,
//!   sentence analysis, comprehension questions and answer review
//! - LLM calls through an OpenAI-compatible gateway with per-operation model fallback
//! - Static SPA fallback (STATIC_DIR/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   LLM_API_KEY       : gateway credential (falls back to OPENROUTER_API_KEY)
//!   LLM_BASE_URL      : overrides the configured gateway base URL
//!   AGENT_CONFIG_PATH : path to TOML config (prompts, model lists, gateway, story settings)
//!   STATIC_DIR        : client bundle directory (default "./static")
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod error;
mod state;
mod protocol;
mod prompts;
mod normalize;
mod gateway;
mod logic;
mod routes;
mod pinyin;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let state = Arc::new(AppState::new());

  let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into());
  let app = build_router(state, &static_dir);

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "story_backend", %addr, %static_dir, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "story_backend", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "story_backend", "Shutdown signal received");
}
