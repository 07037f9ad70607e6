//! Playback snapshots exchanged between the page agent and the bridge.

use serde::{Deserialize, Serialize};

/// Repeat setting of the player.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

/// One captured playback state.
///
/// Field names on the wire follow the page agent's JSON (`isPlaying`, `currentTime`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    /// Total length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Elapsed time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<u64>,
    /// Milliseconds since epoch at which the page was read. Agents that only
    /// send `timestamp` get it copied here. Zero when unknown.
    #[serde(default)]
    pub capture_timestamp: i64,
    #[serde(default)]
    pub timestamp: i64,
}

impl Snapshot {
    /// Whether this snapshot describes a song at all.
    #[must_use]
    pub fn has_song(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// Parse a snapshot as sent by the page agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object with a string `title`.
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        let mut snapshot: Self = serde_json::from_str(payload)?;
        if snapshot.capture_timestamp == 0 {
            snapshot.capture_timestamp = snapshot.timestamp;
        }
        Ok(snapshot)
    }
}

/// Convert a `MM:SS` or `HH:MM:SS` string to seconds.
///
/// Anything else, including empty input, yields [`None`].
#[must_use]
pub fn parse_time(s: &str) -> Option<u64> {
    let parts = s
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let (h, m, s) = match parts.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    h.checked_mul(3600)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(s)
}

/// Split a `"current / total"` string into elapsed and total seconds.
#[must_use]
pub fn parse_time_info(s: &str) -> (Option<u64>, Option<u64>) {
    let times = s.split('/').collect::<Vec<_>>();
    match times.as_slice() {
        [current, total] => (parse_time(current), parse_time(total)),
        _ => (None, None),
    }
}
