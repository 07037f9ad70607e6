use std::{net::SocketAddr, time::Duration};

use futures::StreamExt as _;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::sleep,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::instrument;

use crate::snapshot::Snapshot;

/// Accept page agent connections forever, forwarding every valid snapshot to `snapshots`.
pub async fn serve(listener: TcpListener, snapshots: mpsc::Sender<Snapshot>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, peer, snapshots.clone()));
            }
            Err(e) => {
                tracing::warn!(%e, "Failed to accept connection");
                sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

#[instrument(skip(stream, snapshots))]
async fn handle_connection(stream: TcpStream, peer: SocketAddr, snapshots: mpsc::Sender<Snapshot>) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%e, "WebSocket handshake failed");
            return;
        }
    };
    tracing::info!("Client connected");

    while let Some(message) = ws.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(%e, "Discarding non UTF-8 message");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(%e, "WebSocket error");
                break;
            }
        };
        match Snapshot::from_json(&text) {
            Ok(snapshot) if snapshot.has_song() => {
                tracing::info!(title = %snapshot.title, artist = %snapshot.artist, "Received");
                if snapshots.send(snapshot).await.is_err() {
                    break;
                }
            }
            Ok(_) => tracing::debug!("Discarding snapshot without a song"),
            Err(e) => tracing::warn!(%e, "Error processing message"),
        }
    }
    tracing::info!("Client disconnected");
}
