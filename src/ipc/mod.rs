//! Client for the Discord desktop client's local IPC RPC endpoint.

mod frame;
mod socket;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    io::{split, ReadHalf, WriteHalf},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    presence::Activity,
    rpc::{ConnectionEvent, Connector, PresenceClient, RpcError},
};

use frame::{read_frame, write_frame, Opcode};
use socket::IpcStream;

const RPC_VERSION: u32 = 1;

type Writer = Arc<tokio::sync::Mutex<WriteHalf<Box<dyn IpcStream>>>>;
/// Callers waiting for a response, by nonce. [`None`] once the connection is gone.
type Pending = Arc<Mutex<Option<HashMap<String, oneshot::Sender<Result<Value, RpcError>>>>>>;

/// Payload of a `Frame` message coming from Discord.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Incoming {
    cmd: Option<String>,
    evt: Option<String>,
    nonce: Option<String>,
    data: Value,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct ErrorData {
    code: i64,
    message: String,
}

impl From<ErrorData> for RpcError {
    fn from(e: ErrorData) -> Self {
        Self::Discord {
            code: e.code,
            message: e.message,
        }
    }
}

fn close_error(payload: Value) -> RpcError {
    let ErrorData { code, message } = serde_json::from_value(payload).unwrap_or_default();
    RpcError::Closed { code, message }
}

/// Logs in to whichever Discord instance answers on the local IPC endpoint.
pub struct IpcConnector {
    client_id: String,
}

impl IpcConnector {
    pub const fn new(client_id: String) -> Self {
        Self { client_id }
    }
}

#[async_trait]
impl Connector for IpcConnector {
    type Client = IpcClient;

    async fn login(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<IpcClient, RpcError> {
        let stream = socket::connect().await?;
        IpcClient::handshake(stream, &self.client_id, generation, events).await
    }
}

/// A logged in IPC connection.
///
/// Dropping the client stops its reader, so a discarded handle never reports a disconnect.
pub struct IpcClient {
    user: String,
    writer: Writer,
    pending: Pending,
    reader: JoinHandle<()>,
}

impl IpcClient {
    /// Perform the handshake on an already connected stream and wait for `READY`.
    ///
    /// # Errors
    ///
    /// Returns an error if Discord closes the connection (e.g. for an unknown client id) or the
    /// stream fails before `READY` arrives.
    #[instrument(skip(stream, events))]
    pub async fn handshake<S: IpcStream + 'static>(
        stream: S,
        client_id: &str,
        generation: u64,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Self, RpcError> {
        let (mut reader, mut writer) = split(Box::new(stream) as Box<dyn IpcStream>);
        write_frame(
            &mut writer,
            Opcode::Handshake,
            &json!({ "v": RPC_VERSION, "client_id": client_id }),
        )
        .await?;

        let user = loop {
            let (opcode, payload) = read_frame(&mut reader).await?;
            match opcode {
                Opcode::Frame => {
                    let incoming: Incoming = serde_json::from_value(payload)?;
                    match (incoming.cmd.as_deref(), incoming.evt.as_deref()) {
                        (Some("DISPATCH"), Some("READY")) => {
                            break incoming.data["user"]["username"]
                                .as_str()
                                .unwrap_or("unknown user")
                                .to_owned();
                        }
                        (_, Some("ERROR")) => {
                            return Err(serde_json::from_value::<ErrorData>(incoming.data)
                                .unwrap_or_default()
                                .into())
                        }
                        _ => tracing::debug!(?incoming, "Ignoring frame before READY"),
                    }
                }
                Opcode::Close => return Err(close_error(payload)),
                Opcode::Ping => write_frame(&mut writer, Opcode::Pong, &payload).await?,
                Opcode::Pong | Opcode::Handshake => {}
            }
        };

        let writer = Arc::new(tokio::sync::Mutex::new(writer));
        let pending: Pending = Arc::new(Mutex::new(Some(HashMap::new())));
        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&writer),
            Arc::clone(&pending),
            generation,
            events,
        ));

        Ok(Self {
            user,
            writer,
            pending,
            reader,
        })
    }

    async fn command(&self, cmd: &str, args: Value) -> Result<Value, RpcError> {
        let nonce = Uuid::new_v4().to_string();
        let (sender, response) = oneshot::channel();
        self.pending
            .lock()
            .ok()
            .and_then(|mut p| p.as_mut().map(|p| p.insert(nonce.clone(), sender)))
            .ok_or(RpcError::Disconnected)?;

        let payload = json!({ "cmd": cmd, "args": args, "nonce": nonce });
        let written = write_frame(&mut *self.writer.lock().await, Opcode::Frame, &payload).await;
        if let Err(e) = written {
            if let Ok(Some(pending)) = self.pending.lock().as_deref_mut() {
                pending.remove(&nonce);
            }
            return Err(e);
        }
        response.await.map_err(|_| RpcError::Disconnected)?
    }
}

impl Drop for IpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl PresenceClient for IpcClient {
    fn user(&self) -> &str {
        &self.user
    }

    async fn set_activity(&mut self, activity: Option<&Activity>) -> Result<(), RpcError> {
        let args = json!({ "pid": std::process::id(), "activity": activity });
        self.command("SET_ACTIVITY", args).await.map(|_| ())
    }
}

/// Route responses to their callers and answer pings until the connection goes away.
async fn read_loop(
    mut reader: ReadHalf<Box<dyn IpcStream>>,
    writer: Writer,
    pending: Pending,
    generation: u64,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    loop {
        let (opcode, payload) = match read_frame(&mut reader).await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(%e, generation, "Discord IPC connection lost");
                break;
            }
        };
        match opcode {
            Opcode::Frame => {
                let incoming: Incoming = match serde_json::from_value(payload) {
                    Ok(i) => i,
                    Err(e) => {
                        tracing::warn!(%e, "Ignoring malformed IPC frame");
                        continue;
                    }
                };
                let Some(nonce) = incoming.nonce.as_deref() else {
                    tracing::debug!(cmd = ?incoming.cmd, evt = ?incoming.evt, "Unsolicited IPC event");
                    continue;
                };
                let sender = pending
                    .lock()
                    .ok()
                    .and_then(|mut p| p.as_mut().and_then(|p| p.remove(nonce)));
                let Some(sender) = sender else {
                    tracing::debug!(nonce, "Response for an unknown request");
                    continue;
                };
                let result = if incoming.evt.as_deref() == Some("ERROR") {
                    Err(serde_json::from_value::<ErrorData>(incoming.data)
                        .unwrap_or_default()
                        .into())
                } else {
                    Ok(incoming.data)
                };
                let _ = sender.send(result);
            }
            Opcode::Ping => {
                if let Err(e) = write_frame(&mut *writer.lock().await, Opcode::Pong, &payload).await {
                    tracing::warn!(%e, generation, "Failed to answer IPC ping");
                    break;
                }
            }
            Opcode::Close => {
                tracing::warn!(%payload, generation, "Discord closed the IPC connection");
                break;
            }
            Opcode::Pong | Opcode::Handshake => {}
        }
    }
    // Waiting callers see the dropped senders as a lost connection
    if let Ok(mut p) = pending.lock() {
        p.take();
    }
    let _ = events.send(ConnectionEvent::Disconnected { generation });
}
