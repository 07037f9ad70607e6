use crate::snapshot::Snapshot;

/// Remembers what was last sent to the bridge and decides whether a new snapshot is worth sending.
///
/// Only title, play state and repeat mode count as a change. The elapsed time ticks every second
/// and the byline may settle after the title, neither warrants an update of their own.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_sent: Option<Snapshot>,
}

impl ChangeDetector {
    #[must_use]
    pub fn should_send(&self, snapshot: &Snapshot) -> bool {
        if !snapshot.has_song() {
            return false;
        }
        self.last_sent.as_ref().map_or(true, |last| {
            last.title != snapshot.title
                || last.is_playing != snapshot.is_playing
                || last.repeat_mode != snapshot.repeat_mode
        })
    }

    pub fn record(&mut self, snapshot: Snapshot) {
        self.last_sent = Some(snapshot);
    }

    #[must_use]
    pub const fn last_sent(&self) -> Option<&Snapshot> {
        self.last_sent.as_ref()
    }
}
