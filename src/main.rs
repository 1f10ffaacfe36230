use anyhow::Result;
use tracing::info;

mod analysis;
mod config;
mod errors;
mod fanout;
mod parsing;
mod providers;
mod scrub;
mod tools;
mod types;

use config::{load_registry, load_thresholds};
use tools::{serve_stdio, ToolContext};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Configuration errors are fatal: do not serve requests on a bad registry.
    let registry = load_registry()?;
    let thresholds = load_thresholds()?;
    info!(clusters = ?registry.ids(), "cluster registry loaded");

    serve_stdio(ToolContext { registry, thresholds }).await
}

fn init_tracing() {
    // Diagnostics go to stderr; stdout carries only tool responses.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
