//! In-memory stand-in for the Discord IPC client.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    presence::Activity,
    rpc::{ConnectionEvent, Connector, PresenceClient, RpcError},
};

#[derive(Default)]
struct FakeState {
    failing_logins: u32,
    update_errors: VecDeque<RpcError>,
    activities: Vec<Option<Activity>>,
    logins: u32,
    events: Option<(u64, mpsc::UnboundedSender<ConnectionEvent>)>,
}

#[derive(Clone, Default)]
pub struct FakeDiscord {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDiscord {
    pub fn fail_logins(&self, n: u32) {
        self.state.lock().unwrap().failing_logins = n;
    }

    pub fn fail_next_update(&self, e: RpcError) {
        self.state.lock().unwrap().update_errors.push_back(e);
    }

    pub fn activities(&self) -> Vec<Option<Activity>> {
        self.state.lock().unwrap().activities.clone()
    }

    pub fn logins(&self) -> u32 {
        self.state.lock().unwrap().logins
    }

    /// Report the most recent client as disconnected.
    pub fn disconnect(&self) {
        let state = self.state.lock().unwrap();
        let (generation, events) = state.events.as_ref().unwrap();
        events
            .send(ConnectionEvent::Disconnected {
                generation: *generation,
            })
            .unwrap();
    }
}

#[async_trait]
impl Connector for FakeDiscord {
    type Client = FakeClient;

    async fn login(
        &self,
        generation: u64,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<FakeClient, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.logins += 1;
        state.events = Some((generation, events));
        if state.failing_logins > 0 {
            state.failing_logins -= 1;
            return Err(RpcError::NoSocket);
        }
        Ok(FakeClient {
            discord: self.clone(),
        })
    }
}

pub struct FakeClient {
    discord: FakeDiscord,
}

#[async_trait]
impl PresenceClient for FakeClient {
    fn user(&self) -> &str {
        "fake listener"
    }

    async fn set_activity(&mut self, activity: Option<&Activity>) -> Result<(), RpcError> {
        let mut state = self.discord.state.lock().unwrap();
        if let Some(e) = state.update_errors.pop_front() {
            return Err(e);
        }
        state.activities.push(activity.cloned());
        Ok(())
    }
}
