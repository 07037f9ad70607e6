//! Connection lifecycle of the presence RPC client, independent of the transport.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::presence::Activity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcState {
    Disconnected,
    Connecting,
    Ready,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcEvent {
    /// The process started
    Start,
    /// The reconnect delay elapsed
    ReconnectDue,
    LoginSucceeded,
    LoginFailed,
    /// The client library reported the connection gone, or an update failed because of it
    ConnectionLost,
}

/// Side effect the controller has to perform after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcAction {
    Login,
    ScheduleReconnect,
    ResetAttempts,
}

impl RpcState {
    /// Transition table of the connection lifecycle.
    #[must_use]
    pub const fn on(self, event: RpcEvent) -> (Self, Option<RpcAction>) {
        use RpcEvent as E;
        use RpcState as S;
        match (self, event) {
            (S::Disconnected, E::Start | E::ReconnectDue) => (S::Connecting, Some(RpcAction::Login)),
            (S::Connecting, E::LoginSucceeded) => (S::Ready, Some(RpcAction::ResetAttempts)),
            (S::Connecting, E::LoginFailed | E::ConnectionLost) | (S::Ready, E::ConnectionLost) => {
                (S::Disconnected, Some(RpcAction::ScheduleReconnect))
            }
            (state, _) => (state, None),
        }
    }
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("no Discord IPC socket accepted the connection")]
    NoSocket,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),
    #[error("connection closed by Discord ({code}): {message}")]
    Closed { code: i64, message: String },
    #[error("Discord returned error {code}: {message}")]
    Discord { code: i64, message: String },
    #[error("connection closed before Discord answered")]
    Disconnected,
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl RpcError {
    /// Whether the error text suggests the connection is gone.
    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        const NEEDLES: [&str; 6] = [
            "connection",
            "closed",
            "broken pipe",
            "not connected",
            "reset",
            "end of file",
        ];
        let message = self.to_string().to_lowercase();
        NEEDLES.iter().any(|n| message.contains(n))
    }
}

/// Notification from a live client, tagged with the login attempt that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Disconnected { generation: u64 },
}

/// A logged-in presence client.
#[async_trait]
pub trait PresenceClient: Send {
    /// Name of the logged in user, for logging.
    fn user(&self) -> &str;

    /// Replace the current presence. [`None`] clears it.
    async fn set_activity(&mut self, activity: Option<&Activity>) -> Result<(), RpcError>;
}

/// Builds fresh clients, one per login attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Client: PresenceClient + 'static;

    /// Connect and log in. `events` receives a [`ConnectionEvent`] carrying `generation` when the
    /// client loses its connection.
    async fn login(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Self::Client, RpcError>;
}
