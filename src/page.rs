//! Reading the now-playing state off the player page.
//!
//! The page itself is driven elsewhere (a browser, a headless session, a userscript); what arrives
//! here are [`PageFields`], the raw text and attribute values of the player bar. Turning them into
//! a [`Snapshot`] happens on this side.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt as _, AsyncRead, BufReader},
    sync::watch,
    task::JoinHandle,
};

use crate::{
    snapshot::{parse_time_info, RepeatMode, Snapshot},
    utils::now_millis,
};

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const BYLINE_SEPARATOR: char = '\u{2022}';

/// Raw values of the player bar elements. A missing element is [`None`].
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PageFields {
    /// Text of the title element
    pub title: Option<String>,
    /// "Artist • Album • Year" line below the title
    pub byline: Option<String>,
    /// `src` of the artwork image
    pub thumbnail_src: Option<String>,
    /// `aria-label` of the play/pause button
    pub play_button_label: Option<String>,
    /// Label of the repeat button
    pub repeat_button_label: Option<String>,
    /// "current / total" text
    pub time_info: Option<String>,
    /// Page location
    pub url: Option<String>,
}

impl PageFields {
    /// Derive the playback snapshot, or [`None`] if no song is shown.
    #[must_use]
    pub fn snapshot(&self, now_ms: i64) -> Option<Snapshot> {
        let title = self.title.as_deref().map(str::trim).unwrap_or_default();
        if title.is_empty() {
            return None;
        }

        let byline = self
            .byline
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty());
        let (artist, album) = match byline {
            Some(b) if b.contains(BYLINE_SEPARATOR) => {
                let mut parts = b.split(BYLINE_SEPARATOR).map(str::trim);
                let artist = parts.next().unwrap_or_default().to_owned();
                let album = parts.next().filter(|a| !a.is_empty()).map(ToOwned::to_owned);
                (artist, album)
            }
            Some(b) => (b.to_owned(), None),
            None => (UNKNOWN_ARTIST.to_owned(), None),
        };

        // Artwork URLs carry their size after the first '='
        let thumbnail = self
            .thumbnail_src
            .as_deref()
            .and_then(|src| src.split('=').next())
            .filter(|src| !src.is_empty())
            .map(ToOwned::to_owned);

        let is_playing = self
            .play_button_label
            .as_deref()
            .is_some_and(|l| l.contains("Pause"));

        let repeat_mode = self
            .repeat_button_label
            .as_deref()
            .map(str::to_lowercase)
            .map_or(RepeatMode::Off, |l| {
                if l.contains("one") {
                    RepeatMode::One
                } else if l.contains("all") {
                    RepeatMode::All
                } else {
                    RepeatMode::Off
                }
            });

        let (current_time, duration) = self
            .time_info
            .as_deref()
            .map(parse_time_info)
            .unwrap_or_default();

        Some(Snapshot {
            title: title.to_owned(),
            artist,
            album,
            thumbnail,
            is_playing,
            repeat_mode,
            duration,
            current_time,
            capture_timestamp: now_ms,
            timestamp: now_ms,
        })
    }
}

/// Something that shows a player page.
#[async_trait]
pub trait PageSource: Send {
    /// Read the current playback state. [`None`] if the page shows no song or can't be read.
    fn snapshot(&self) -> Option<Snapshot>;

    /// Current location of the page, used to notice navigation.
    fn location(&self) -> Option<String>;

    /// Wait until the page content changes. Returns `false` once the page is gone.
    async fn changed(&mut self) -> bool;
}

/// A page whose fields arrive as JSON lines on a reader (stdin in the binary).
pub struct FeedSource {
    /// Latest fields and when their line arrived, in epoch milliseconds
    fields: watch::Receiver<Option<(PageFields, i64)>>,
    reader: JoinHandle<()>,
}

impl FeedSource {
    pub fn spawn<R: AsyncRead + Unpin + Send + 'static>(input: R) -> Self {
        let (sender, fields) = watch::channel(None);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(input).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(?e, "Failed to read page feed");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<PageFields>(&line) {
                    Ok(f) => {
                        if sender.send(Some((f, now_millis()))).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(?e, "Ignoring malformed page fields"),
                }
            }
            tracing::info!("Page feed ended");
        });
        Self { fields, reader }
    }
}

impl Drop for FeedSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl PageSource for FeedSource {
    fn snapshot(&self) -> Option<Snapshot> {
        self.fields
            .borrow()
            .as_ref()
            .and_then(|(f, received)| f.snapshot(*received))
    }

    fn location(&self) -> Option<String> {
        self.fields.borrow().as_ref().and_then(|(f, _)| f.url.clone())
    }

    async fn changed(&mut self) -> bool {
        self.fields.changed().await.is_ok()
    }
}
