//! The bridge: receives snapshots from page agents and mirrors them into Discord rich presence.

mod controller;
#[cfg(test)]
mod fake_rpc;
mod server;

use std::{future::Future, net::SocketAddr, pin::pin};

use anyhow::{Context as _, Result};
use thiserror::Error;
use tokio::{net::TcpListener, select, sync::mpsc};

use crate::{ipc::IpcConnector, presence::PresenceStyle, rpc::Connector, utils::interrupted};

pub use controller::{PresenceController, Wakeup};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no Discord application id configured. Create one at https://discord.com/developers/applications and pass it with --client-id or CLIENT_ID")]
    MissingClientId,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Discord application id
    pub client_id: String,
    pub listen: SocketAddr,
    pub style: PresenceStyle,
}

/// Run the bridge until interrupted.
///
/// # Errors
///
/// Returns an error if the WebSocket port can't be bound.
pub async fn run_bridge(config: BridgeConfig) -> Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to listen on {}", config.listen))?;
    serve_presence(
        listener,
        IpcConnector::new(config.client_id),
        config.style,
        interrupted(),
    )
    .await
}

/// Accept agents on `listener` and keep the presence in sync until `shutdown` resolves.
///
/// Snapshots are applied in arrival order, whichever agent sent them.
///
/// # Errors
///
/// Returns an error if the listener's address can't be read.
pub async fn serve_presence<C: Connector>(
    listener: TcpListener,
    connector: C,
    style: PresenceStyle,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("WebSocket server started on ws://{addr}");

    let (snapshot_sender, mut snapshots) = mpsc::channel(16);
    let server = tokio::spawn(server::serve(listener, snapshot_sender));

    let mut controller = PresenceController::new(connector, style);
    controller.start();

    let mut shutdown = pin!(shutdown);
    loop {
        select! {
            wakeup = controller.next_wakeup() => controller.handle(wakeup),
            Some(snapshot) = snapshots.recv() => controller.apply(&snapshot).await,
            () = &mut shutdown => break,
        }
    }

    tracing::info!("Shutting down...");
    controller.shutdown().await;
    server.abort();
    Ok(())
}
