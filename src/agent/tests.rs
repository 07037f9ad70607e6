use std::{future::pending, time::Duration};

use async_trait::async_trait;
use futures::StreamExt as _;
use tokio::{
    net::TcpListener,
    sync::watch,
    time::{timeout, Instant},
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use super::*;
use crate::snapshot::{RepeatMode, Snapshot};

#[derive(Clone, Default)]
struct PageState {
    snapshot: Option<Snapshot>,
    location: Option<String>,
}

struct FakePage {
    state: watch::Receiver<PageState>,
}

#[async_trait]
impl PageSource for FakePage {
    fn snapshot(&self) -> Option<Snapshot> {
        self.state.borrow().snapshot.clone()
    }

    fn location(&self) -> Option<String> {
        self.state.borrow().location.clone()
    }

    async fn changed(&mut self) -> bool {
        self.state.changed().await.is_ok()
    }
}

fn song(title: &str, artist: &str) -> Snapshot {
    Snapshot {
        title: title.to_owned(),
        artist: artist.to_owned(),
        album: None,
        thumbnail: None,
        is_playing: true,
        repeat_mode: RepeatMode::Off,
        duration: Some(200),
        current_time: Some(1),
        capture_timestamp: 0,
        timestamp: 0,
    }
}

fn showing(snapshot: Snapshot, location: &str) -> PageState {
    PageState {
        snapshot: Some(snapshot),
        location: Some(location.to_owned()),
    }
}

async fn next_snapshot<S>(ws: &mut S) -> Snapshot
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            return Snapshot::from_json(&text).unwrap();
        }
    }
}

/// Real sockets and real time: timers fire a little late, never early.
fn assert_waited(since: Instant, expected: Duration) {
    let waited = since.elapsed();
    assert!(
        waited >= expected && waited < expected + Duration::from_millis(400),
        "waited {waited:?}, expected {expected:?}"
    );
}

/// Config whose poll never fires again after the first tick.
fn quiet_config(endpoint: String, backoff: LinearBackoff) -> AgentConfig {
    AgentConfig {
        poll_interval: Duration::from_secs(3600),
        navigation_delay: Duration::from_millis(500),
        backoff,
        ..AgentConfig::new(endpoint)
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    (listener, endpoint)
}

#[tokio::test]
async fn sends_on_connect_and_only_on_watched_changes() {
    let (listener, endpoint) = listen().await;
    let (page_state, state) = watch::channel(showing(song("First", "Artist"), "/watch?v=1"));

    let config = AgentConfig {
        poll_interval: Duration::from_millis(20),
        ..AgentConfig::new(endpoint)
    };
    let agent = tokio::spawn(run_agent(FakePage { state }, config, pending()));

    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(tcp).await.unwrap();
    assert_eq!(next_snapshot(&mut ws).await.title, "First");

    // Byline and elapsed time alone do not count
    let mut artist_only = song("First", "Another Artist");
    artist_only.current_time = Some(30);
    page_state.send(showing(artist_only, "/watch?v=1")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    page_state
        .send(showing(song("Second", "Artist"), "/watch?v=1"))
        .unwrap();
    assert_eq!(next_snapshot(&mut ws).await.title, "Second");

    let mut paused = song("Second", "Artist");
    paused.is_playing = false;
    page_state.send(showing(paused, "/watch?v=1")).unwrap();
    let received = next_snapshot(&mut ws).await;
    assert_eq!(received.title, "Second");
    assert!(!received.is_playing);

    agent.abort();
}

#[tokio::test]
async fn navigation_triggers_an_early_poll() {
    let (listener, endpoint) = listen().await;
    let (page_state, state) = watch::channel(showing(song("First", "Artist"), "/watch?v=1"));
    let config = quiet_config(endpoint, LinearBackoff::agent());
    let navigation_delay = config.navigation_delay;
    let agent = tokio::spawn(run_agent(FakePage { state }, config, pending()));

    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(tcp).await.unwrap();
    assert_eq!(next_snapshot(&mut ws).await.title, "First");

    let navigated = Instant::now();
    page_state
        .send(showing(song("Second", "Artist"), "/watch?v=2"))
        .unwrap();
    assert_eq!(next_snapshot(&mut ws).await.title, "Second");
    assert_waited(navigated, navigation_delay);

    agent.abort();
}

#[tokio::test]
async fn redials_with_growing_delay_and_resends_on_reconnect() {
    let (listener, endpoint) = listen().await;
    let (_page_state, state) = watch::channel(showing(song("First", "Artist"), "/watch?v=1"));
    let base = Duration::from_millis(500);
    let config = quiet_config(endpoint, LinearBackoff::new(base, base * 10));
    let agent = tokio::spawn(run_agent(FakePage { state }, config, pending()));

    let (tcp, _) = listener.accept().await.unwrap();
    let ws = accept_async(tcp).await.unwrap();

    // Bridge goes away: first retry after one step
    let dropped = Instant::now();
    drop(ws);
    let (tcp, _) = listener.accept().await.unwrap();
    assert_waited(dropped, base);

    // Handshake fails: the next retry waits two steps
    let refused = Instant::now();
    drop(tcp);
    let (tcp, _) = listener.accept().await.unwrap();
    assert_waited(refused, base * 2);

    // Reconnected: the current song is sent right away, without a page change
    let mut ws = accept_async(tcp).await.unwrap();
    assert_eq!(next_snapshot(&mut ws).await.title, "First");

    // Successful connect reset the delay
    let dropped = Instant::now();
    drop(ws);
    let (_tcp, _) = listener.accept().await.unwrap();
    assert_waited(dropped, base);

    agent.abort();
}

#[tokio::test]
async fn stops_when_page_closes() {
    let (page_state, state) = watch::channel(PageState::default());
    // Nothing listens here, the agent keeps retrying in the background
    let config = AgentConfig::new("ws://127.0.0.1:9".to_owned());
    let agent = tokio::spawn(run_agent(FakePage { state }, config, pending()));
    drop(page_state);
    timeout(Duration::from_secs(5), agent)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn stops_on_shutdown() {
    let (_page_state, state) = watch::channel(PageState::default());
    let config = AgentConfig::new("ws://127.0.0.1:9".to_owned());
    timeout(
        Duration::from_secs(5),
        run_agent(FakePage { state }, config, async {}),
    )
    .await
    .unwrap()
    .unwrap();
}
