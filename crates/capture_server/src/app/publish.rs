use std::collections::HashMap;
use std::time::Duration;

use capture_core::{CaptureSnapshot, ZoneId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct PublishedSnapshot {
    pub tick: u64,
    pub zone: ZoneId,
    #[serde(flatten)]
    pub snapshot: CaptureSnapshot,
}

#[derive(Debug, Clone, Copy)]
struct LastPublished {
    at: Duration,
    snapshot: CaptureSnapshot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PublishStats {
    pub published: u64,
    pub suppressed: u64,
}

/// Rate-limits replicated zone state.
///
/// Identical snapshots are never resent. Changes in progress only are sent at
/// most once per `min_interval` of simulation time, while ownership changes go
/// out immediately so clients never miss a capture or neutralization.
#[derive(Debug)]
pub(crate) struct SnapshotPublisher {
    min_interval: Duration,
    last: HashMap<ZoneId, LastPublished>,
    stats: PublishStats,
}

impl SnapshotPublisher {
    pub(crate) fn new(publish_hz: u32) -> Self {
        let min_interval = if publish_hz == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / f64::from(publish_hz))
        };
        Self {
            min_interval,
            last: HashMap::new(),
            stats: PublishStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> PublishStats {
        self.stats
    }

    pub(crate) fn offer(
        &mut self,
        tick: u64,
        now: Duration,
        zone: &ZoneId,
        snapshot: CaptureSnapshot,
    ) -> Option<PublishedSnapshot> {
        let due = match self.last.get(zone) {
            None => true,
            Some(last) if last.snapshot == snapshot => false,
            Some(last) if !last.snapshot.same_ownership(&snapshot) => true,
            Some(last) => now.saturating_sub(last.at) >= self.min_interval,
        };

        if !due {
            self.stats.suppressed = self.stats.suppressed.saturating_add(1);
            return None;
        }

        self.last.insert(zone.clone(), LastPublished { at: now, snapshot });
        self.stats.published = self.stats.published.saturating_add(1);
        Some(PublishedSnapshot {
            tick,
            zone: zone.clone(),
            snapshot,
        })
    }

    /// Sends whatever a client would still be missing at match end.
    pub(crate) fn flush(
        &mut self,
        tick: u64,
        zone: &ZoneId,
        snapshot: CaptureSnapshot,
    ) -> Option<PublishedSnapshot> {
        let stale = self
            .last
            .get(zone)
            .map_or(true, |last| last.snapshot != snapshot);
        if !stale {
            return None;
        }
        let now = self.last.get(zone).map_or(Duration::ZERO, |last| last.at);
        self.last.remove(zone);
        self.offer(tick, now, zone, snapshot)
    }
}
