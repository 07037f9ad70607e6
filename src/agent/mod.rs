//! The page agent: polls the player page and pushes changes to the bridge.

mod change_detector;
mod link;

use std::{
    future::{pending, Future, Pending},
    pin::{pin, Pin},
    time::Duration,
};

use anyhow::Result;
use futures::future::Either;
use tokio::{
    select,
    time::{interval, sleep, MissedTickBehavior, Sleep},
};

use crate::{backoff::LinearBackoff, page::PageSource};

pub use change_detector::ChangeDetector;
use link::{BridgeLink, LinkEvent};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// WebSocket URL of the bridge
    pub endpoint: String,
    pub poll_interval: Duration,
    /// Extra poll after the page navigated, to pick up the new song early
    pub navigation_delay: Duration,
    /// Delay between connection attempts to the bridge
    pub backoff: LinearBackoff,
}

impl AgentConfig {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            poll_interval: Duration::from_millis(2000),
            navigation_delay: Duration::from_millis(1000),
            backoff: LinearBackoff::agent(),
        }
    }
}

/// Poll `page` and send snapshots to the bridge until the page goes away or `shutdown` resolves.
///
/// # Errors
///
/// Currently never fails: connection problems are retried forever.
pub async fn run_agent<P: PageSource>(
    mut page: P,
    config: AgentConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut shutdown = pin!(shutdown);
    let mut link = BridgeLink::connect(config.endpoint.clone(), config.backoff.clone());
    let mut detector = ChangeDetector::default();

    let mut poll_timer = interval(config.poll_interval);
    poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut navigation_timer: Pin<Box<Either<Sleep, Pending<()>>>> =
        Box::pin(Either::Right(pending()));
    let mut last_location = page.location();

    tracing::info!(endpoint = %config.endpoint, "Page agent started");

    loop {
        select! {
            event = link.next_event() => match event {
                LinkEvent::RetryDue => link.redial(),
                LinkEvent::Connected => {
                    tracing::info!("Connected to bridge");
                    if let Some(snapshot) = page.snapshot() {
                        if snapshot.has_song() {
                            match link.send(&snapshot).await {
                                Ok(_) => detector.record(snapshot),
                                Err(e) => {
                                    tracing::error!(?e, "Failed to send song data");
                                    let delay = link.schedule_retry();
                                    tracing::info!(?delay, "Disconnected, retrying");
                                }
                            }
                        }
                    }
                }
                LinkEvent::ConnectFailed(e) => {
                    let delay = link.schedule_retry();
                    tracing::warn!(%e, ?delay, "Failed to connect to bridge, retrying");
                }
                LinkEvent::Closed(e) => {
                    let delay = link.schedule_retry();
                    tracing::info!(?e, ?delay, "Disconnected, retrying");
                }
            },
            _ = poll_timer.tick() => check_for_updates(&page, &mut detector, &mut link).await,
            () = &mut navigation_timer => {
                navigation_timer = Box::pin(Either::Right(pending()));
                check_for_updates(&page, &mut detector, &mut link).await;
            }
            alive = page.changed() => {
                if !alive {
                    tracing::info!("Page closed, stopping agent");
                    break;
                }
                let location = page.location();
                if location != last_location {
                    tracing::debug!(?location, "Page navigated");
                    last_location = location;
                    navigation_timer = Box::pin(Either::Left(sleep(config.navigation_delay)));
                }
            }
            () = &mut shutdown => {
                tracing::info!("Shutting down page agent");
                break;
            }
        }
    }
    Ok(())
}

/// Read the page and send the snapshot if a watched field changed.
async fn check_for_updates<P: PageSource>(
    page: &P,
    detector: &mut ChangeDetector,
    link: &mut BridgeLink,
) {
    let Some(snapshot) = page.snapshot() else {
        return;
    };
    if !detector.should_send(&snapshot) {
        return;
    }
    tracing::info!(title = %snapshot.title, artist = %snapshot.artist, playing = snapshot.is_playing, "Song update");
    if link.is_open() {
        if let Err(e) = link.send(&snapshot).await {
            tracing::error!(?e, "Failed to send song data");
            let delay = link.schedule_retry();
            tracing::info!(?delay, "Disconnected, retrying");
        }
    }
    // Recorded even when offline, the bridge gets the current song on reconnect
    detector.record(snapshot);
}

#[cfg(test)]
mod tests;
