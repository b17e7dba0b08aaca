mod backend;
mod config;
mod error;
mod event;
mod hub;
mod session;
mod snapshot;
mod standby;
mod supervisor;
#[cfg(test)]
mod testing;
mod translate;
mod web;
use eyre::Result;
use tracing_subscriber::{Layer, layer::SubscriberExt};

pub fn build_logger() -> Result<()> {
    // Create an env filter that defaults to "info" level if RUST_LOG is not set
    // But also specifically filters out noisy websocket and http client logs
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info")
            // Silence tungstenite websocket crate - very verbose
            .add_directive("tungstenite=warn".parse().unwrap())
            .add_directive("tokio_tungstenite=warn".parse().unwrap())
            // Connection pool and request chatter from the speaker client
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("hyper_util=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
    });

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(env_filter),
        ),
    )
    .map_err(|e| eyre::eyre!("Failed to initialize logger: {}", e))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    build_logger()?;
    tracing::info!("speakerlink version: {}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(
        "Override with RUST_LOG environment variable if needed (e.g., RUST_LOG=tungstenite=trace)"
    );

    // Load configuration
    let config = config::AppConfig::load_or_default();
    tracing::info!("Configuration loaded successfully");
    tracing::debug!("Active configuration: {:?}", config);

    // Create and run the backend
    backend::setup_and_run_backend(config).await?;

    tracing::info!("Application shutdown complete");
    Ok(())
}
