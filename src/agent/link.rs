use std::{pin::Pin, time::Duration};

use futures::{future::BoxFuture, SinkExt as _, StreamExt as _};
use tokio::{
    net::TcpStream,
    time::{sleep, Sleep},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};

use crate::{backoff::LinearBackoff, snapshot::Snapshot};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum State {
    Waiting(Pin<Box<Sleep>>),
    Connecting(BoxFuture<'static, Result<WsStream, tungstenite::Error>>),
    Open(Box<WsStream>),
}

pub enum LinkEvent {
    RetryDue,
    Connected,
    ConnectFailed(tungstenite::Error),
    Closed(Option<tungstenite::Error>),
}

/// The agent's single connection to the bridge, reconnecting with a linear backoff.
pub struct BridgeLink {
    endpoint: String,
    state: State,
    backoff: LinearBackoff,
}

impl BridgeLink {
    /// Start connecting to `endpoint` right away.
    pub fn connect(endpoint: String, backoff: LinearBackoff) -> Self {
        let state = State::Connecting(Self::dial(endpoint.clone()));
        Self {
            endpoint,
            state,
            backoff,
        }
    }

    fn dial(endpoint: String) -> BoxFuture<'static, Result<WsStream, tungstenite::Error>> {
        Box::pin(async move { connect_async(endpoint).await.map(|(stream, _)| stream) })
    }

    pub const fn is_open(&self) -> bool {
        matches!(self.state, State::Open(_))
    }

    /// Wait for the next thing that happens to the connection.
    ///
    /// Cancel safe: dropping the future leaves the link as it was.
    pub async fn next_event(&mut self) -> LinkEvent {
        match &mut self.state {
            State::Waiting(timer) => {
                timer.as_mut().await;
                LinkEvent::RetryDue
            }
            State::Connecting(dial) => match dial.as_mut().await {
                Ok(stream) => {
                    self.state = State::Open(Box::new(stream));
                    self.backoff.reset();
                    LinkEvent::Connected
                }
                Err(e) => LinkEvent::ConnectFailed(e),
            },
            State::Open(stream) => loop {
                match stream.next().await {
                    None | Some(Ok(Message::Close(_))) => return LinkEvent::Closed(None),
                    Some(Err(e)) => return LinkEvent::Closed(Some(e)),
                    // The bridge never talks back, pings are answered by tungstenite
                    Some(Ok(_)) => {}
                }
            },
        }
    }

    /// Begin a new connection attempt after the retry delay elapsed.
    pub fn redial(&mut self) {
        tracing::debug!(endpoint = %self.endpoint, "Connecting to bridge");
        self.state = State::Connecting(Self::dial(self.endpoint.clone()));
    }

    /// Drop the current connection (if any) and wait before dialing again.
    pub fn schedule_retry(&mut self) -> Duration {
        let delay = self.backoff.next_delay();
        self.state = State::Waiting(Box::pin(sleep(delay)));
        delay
    }

    /// Send a snapshot if connected.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the socket fails. The link is left for the caller to retry.
    pub async fn send(&mut self, snapshot: &Snapshot) -> anyhow::Result<bool> {
        let State::Open(stream) = &mut self.state else {
            return Ok(false);
        };
        let payload = serde_json::to_string(snapshot)?;
        stream.send(Message::Text(payload)).await?;
        Ok(true)
    }
}
