use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::events::CaptureEvent;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "host metrics lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HostMetricsSnapshot {
    pub tps: f32,
    pub ticks_total: u64,
    pub captures_total: u64,
    pub neutralizations_total: u64,
    pub sampler_failures_total: u64,
}

/// Shared read side of the host's metrics; cheap to clone across threads.
#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<HostMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(HostMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> HostMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: HostMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    interval_ticks: u32,
    totals: HostMetricsSnapshot,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval_start: start,
            interval,
            interval_ticks: 0,
            totals: HostMetricsSnapshot::default(),
        }
    }

    pub(crate) fn record_tick(&mut self) {
        self.interval_ticks = self.interval_ticks.saturating_add(1);
        self.totals.ticks_total = self.totals.ticks_total.saturating_add(1);
    }

    pub(crate) fn record_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::PointCaptured { .. } => {
                self.totals.captures_total = self.totals.captures_total.saturating_add(1);
            }
            CaptureEvent::PointNeutralized { .. } => {
                self.totals.neutralizations_total =
                    self.totals.neutralizations_total.saturating_add(1);
            }
        }
    }

    pub(crate) fn record_sampler_failure(&mut self) {
        self.totals.sampler_failures_total = self.totals.sampler_failures_total.saturating_add(1);
    }

    pub(crate) fn totals(&self) -> HostMetricsSnapshot {
        self.totals
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<HostMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let snapshot = HostMetricsSnapshot {
            tps: self.interval_ticks as f32 / elapsed_seconds,
            ..self.totals
        };

        self.interval_start = now;
        self.interval_ticks = 0;
        self.totals.tps = snapshot.tps;

        Some(snapshot)
    }
}
