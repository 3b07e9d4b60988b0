mod client;
mod config;
mod session;
mod state;

use anyhow::Context;
use config::ServerConfig;
use state::ServerState;
use tokio::net::TcpListener;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    tracing::info!("Server Version: {}", crate::VERSION);

    let config = ServerConfig::from_env();
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(
        "Listening on port {} (waiting rooms close after {:?})",
        config.port,
        config.wait_timeout
    );

    let state = ServerState::default();
    loop {
        let (socket, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Failed to accept connection: {e}");
                continue;
            }
        };
        tracing::debug!(%addr, "Accepted connection");
        tokio::spawn(client::handle_new_connection(state.clone(), config, socket));
    }
}
