use std::{
    future::{pending, Pending},
    pin::Pin,
    sync::Arc,
};

use futures::future::Either;
use tokio::{
    select,
    sync::mpsc,
    time::{sleep, Sleep},
};

use crate::{
    backoff::LinearBackoff,
    presence::{build_activity, Activity, PresenceStyle},
    rpc::{ConnectionEvent, Connector, PresenceClient, RpcAction, RpcError, RpcEvent, RpcState},
    snapshot::Snapshot,
    utils::now_millis,
};

/// Something the controller has to react to, produced by [`PresenceController::next_wakeup`].
pub enum Wakeup<Client> {
    Login {
        generation: u64,
        result: Result<Client, RpcError>,
    },
    Connection(ConnectionEvent),
    ReconnectDue,
}

type LoginResult<Client> = (u64, Result<Client, RpcError>);

/// Owns the RPC connection and turns snapshots into presence updates.
///
/// All state lives here and is only touched from the bridge's event loop.
pub struct PresenceController<C: Connector> {
    connector: Arc<C>,
    style: PresenceStyle,
    state: RpcState,
    client: Option<C::Client>,
    /// Last activity Discord accepted
    last_activity: Option<Activity>,
    backoff: LinearBackoff,
    /// Incremented for every login attempt; results and events from older attempts are ignored
    generation: u64,
    reconnect_timer: Pin<Box<Either<Sleep, Pending<()>>>>,
    login_sender: mpsc::UnboundedSender<LoginResult<C::Client>>,
    login_receiver: mpsc::UnboundedReceiver<LoginResult<C::Client>>,
    event_sender: mpsc::UnboundedSender<ConnectionEvent>,
    event_receiver: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl<C: Connector> PresenceController<C> {
    pub fn new(connector: C, style: PresenceStyle) -> Self {
        let (login_sender, login_receiver) = mpsc::unbounded_channel();
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        Self {
            connector: Arc::new(connector),
            style,
            state: RpcState::Disconnected,
            client: None,
            last_activity: None,
            backoff: LinearBackoff::bridge(),
            generation: 0,
            reconnect_timer: Box::pin(Either::Right(pending())),
            login_sender,
            login_receiver,
            event_sender,
            event_receiver,
        }
    }

    pub const fn state(&self) -> RpcState {
        self.state
    }

    pub const fn attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    pub const fn last_activity(&self) -> Option<&Activity> {
        self.last_activity.as_ref()
    }

    /// Begin the first login.
    pub fn start(&mut self) {
        self.transition(RpcEvent::Start);
    }

    /// Wait for a login to finish, the connection to drop, or the reconnect delay to elapse.
    ///
    /// Cancel safe.
    pub async fn next_wakeup(&mut self) -> Wakeup<C::Client> {
        select! {
            Some((generation, result)) = self.login_receiver.recv() => Wakeup::Login { generation, result },
            Some(event) = self.event_receiver.recv() => Wakeup::Connection(event),
            () = &mut self.reconnect_timer => Wakeup::ReconnectDue,
        }
    }

    pub fn handle(&mut self, wakeup: Wakeup<C::Client>) {
        match wakeup {
            Wakeup::Login { generation, .. } if generation != self.generation => {
                tracing::debug!(generation, current = self.generation, "Discarding stale login");
            }
            Wakeup::Login {
                result: Ok(client), ..
            } => {
                self.transition(RpcEvent::LoginSucceeded);
                if self.state == RpcState::Ready {
                    tracing::info!(user = client.user(), "Connected to Discord RPC");
                    self.client = Some(client);
                }
            }
            Wakeup::Login { result: Err(e), .. } => {
                tracing::warn!(%e, "Failed to connect to Discord, make sure it is running");
                self.transition(RpcEvent::LoginFailed);
            }
            Wakeup::Connection(ConnectionEvent::Disconnected { generation }) => {
                if generation == self.generation {
                    tracing::warn!("Discord RPC disconnected");
                    self.transition(RpcEvent::ConnectionLost);
                } else {
                    tracing::debug!(generation, "Ignoring disconnect of a discarded client");
                }
            }
            Wakeup::ReconnectDue => {
                self.reconnect_timer = Box::pin(Either::Right(pending()));
                self.transition(RpcEvent::ReconnectDue);
            }
        }
    }

    fn transition(&mut self, event: RpcEvent) {
        let (next, action) = self.state.on(event);
        tracing::debug!(from = ?self.state, to = ?next, ?event, "RPC state transition");
        self.state = next;
        match action {
            Some(RpcAction::Login) => self.begin_login(),
            Some(RpcAction::ScheduleReconnect) => self.schedule_reconnect(),
            Some(RpcAction::ResetAttempts) => self.backoff.reset(),
            None => {}
        }
    }

    fn begin_login(&mut self) {
        // The old handle goes away before a new one is built
        self.client = None;
        self.generation += 1;
        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let events = self.event_sender.clone();
        let results = self.login_sender.clone();
        tracing::debug!(generation, "Logging in to Discord RPC");
        tokio::spawn(async move {
            let result = connector.login(generation, events).await;
            let _ = results.send((generation, result));
        });
    }

    fn schedule_reconnect(&mut self) {
        self.client = None;
        let delay = self.backoff.next_delay();
        tracing::info!(attempt = self.backoff.attempts(), ?delay, "Reconnecting to Discord");
        self.reconnect_timer = Box::pin(Either::Left(sleep(delay)));
    }

    /// Show `snapshot` as the current presence. Skipped while not logged in.
    pub async fn apply(&mut self, snapshot: &Snapshot) {
        let activity = build_activity(snapshot, &self.style, now_millis());
        let client = match (self.state, self.client.as_mut()) {
            (RpcState::Ready, Some(client)) => client,
            (state, _) => {
                tracing::info!(?state, "Discord RPC not ready, skipping presence update");
                return;
            }
        };
        match client.set_activity(Some(&activity)).await {
            Ok(()) => {
                tracing::info!(title = %snapshot.title, "Updated Discord presence");
                tracing::debug!(?activity);
                self.last_activity = Some(activity);
            }
            Err(e) if e.is_connection_lost() => {
                tracing::warn!(%e, "Presence update failed, connection lost");
                self.transition(RpcEvent::ConnectionLost);
            }
            Err(e) => tracing::error!(%e, "Failed to update presence"),
        }
    }

    /// Clear the presence and drop the connection.
    pub async fn shutdown(&mut self) {
        if let Some(client) = self.client.as_mut() {
            if let Err(e) = client.set_activity(None).await {
                tracing::warn!(%e, "Failed to clear presence");
            }
        }
        self.client = None;
        self.state = RpcState::Disconnected;
        self.reconnect_timer = Box::pin(Either::Right(pending()));
    }
}
