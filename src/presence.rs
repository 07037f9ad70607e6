//! Mapping from a playback snapshot to a Discord activity.

use serde::Serialize;

use crate::snapshot::{RepeatMode, Snapshot};

const FALLBACK_IMAGE: &str = "ytmusic";
const FALLBACK_TEXT: &str = "YouTube Music";
const PLAYING_ICON: (&str, &str) = ("play", "Playing");
const PAUSED_ICON: (&str, &str) = ("pause", "Paused");
const PLAYING_GLYPH: &str = "\u{25b6}\u{fe0f}";
const PAUSED_GLYPH: &str = "\u{23f8}\u{fe0f}";

/// Discord rejects text fields outside of these bounds.
const MIN_TEXT_LEN: usize = 2;
const MAX_TEXT_LEN: usize = 128;
/// Longest image key or URL Discord accepts.
const MAX_IMAGE_LEN: usize = 256;

/// Rich presence payload, serialized in the shape the IPC `SET_ACTIVITY` command expects.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub instance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Assets>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Assets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
}

/// Epoch milliseconds
#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// Display tweaks that do not depend on the snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceStyle {
    /// Prefix the title with a play/pause glyph, for applications without uploaded icons.
    pub status_glyph: bool,
}

/// Build the activity shown for `snapshot` at wall-clock time `now_ms`.
#[must_use]
pub fn build_activity(snapshot: &Snapshot, style: &PresenceStyle, now_ms: i64) -> Activity {
    let details = if style.status_glyph {
        let glyph = if snapshot.is_playing {
            PLAYING_GLYPH
        } else {
            PAUSED_GLYPH
        };
        format!("{glyph} {}", snapshot.title)
    } else {
        snapshot.title.clone()
    };
    let state = (!snapshot.artist.trim().is_empty()).then(|| format!("by {}", snapshot.artist));

    let (large_image, large_text) = match &snapshot.thumbnail {
        Some(url) if !url.is_empty() && url.len() <= MAX_IMAGE_LEN => (
            url.clone(),
            snapshot
                .album
                .clone()
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| FALLBACK_TEXT.to_owned()),
        ),
        _ => (FALLBACK_IMAGE.to_owned(), FALLBACK_TEXT.to_owned()),
    };
    let (small_image, small_text) = if snapshot.is_playing {
        PLAYING_ICON
    } else {
        PAUSED_ICON
    };

    Activity {
        details: Some(clamp_text(&details)),
        state: state.as_deref().map(clamp_text),
        instance: false,
        assets: Some(Assets {
            large_image: Some(large_image),
            large_text: Some(clamp_text(&large_text)),
            small_image: Some(small_image.to_owned()),
            small_text: Some(small_text.to_owned()),
        }),
        timestamps: playback_window(snapshot, now_ms),
    }
}

/// Start/end of the elapsed-time display, compensated for the time the snapshot spent in flight.
fn playback_window(snapshot: &Snapshot, now_ms: i64) -> Option<Timestamps> {
    if !snapshot.is_playing {
        return None;
    }
    let (Some(elapsed), Some(total)) = (snapshot.current_time, snapshot.duration) else {
        return None;
    };
    let elapsed = i64::try_from(elapsed).ok()?;
    let total = i64::try_from(total).ok()?;
    let in_flight_secs = if snapshot.capture_timestamp > 0 {
        now_ms.saturating_sub(snapshot.capture_timestamp).max(0) / 1000
    } else {
        0
    };
    let start = now_ms.saturating_sub(elapsed.saturating_add(in_flight_secs).saturating_mul(1000));
    // A countdown would be wrong while the song repeats forever
    let end = match snapshot.repeat_mode {
        RepeatMode::One => None,
        RepeatMode::Off | RepeatMode::All => Some(start.saturating_add(total.saturating_mul(1000))),
    };
    Some(Timestamps {
        start: Some(start),
        end,
    })
}

fn clamp_text(s: &str) -> String {
    let mut s = s.to_owned();
    if s.len() > MAX_TEXT_LEN {
        let mut cut = MAX_TEXT_LEN;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    while s.chars().count() < MIN_TEXT_LEN {
        s.push(' ');
    }
    s
}
