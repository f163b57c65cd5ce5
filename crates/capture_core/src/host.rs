use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::events::{CaptureEvent, CaptureEventSink};
use crate::metrics::{HostMetricsSnapshot, MetricsAccumulator, MetricsHandle};
use crate::occupancy::{Occupancy, OccupancySampler, TickClock, ZoneId};
use crate::point::{CapturePoint, TickDelta};
use crate::snapshot::CaptureSnapshot;

const TICK_COUNT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.target_tps == 0 {
            return Err(CaptureError::InvalidLoopConfig {
                field: "target_tps",
                reason: "must be at least 1",
            });
        }
        if self.max_ticks_per_frame == 0 {
            return Err(CaptureError::InvalidLoopConfig {
                field: "max_ticks_per_frame",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    pub fn fixed_dt(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_tps.max(1) as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub events: Vec<(ZoneId, CaptureEvent)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub ticks_run: u32,
    pub dropped_backlog: Duration,
}

/// Authoritative owner of every capture point in a match.
///
/// Each tick samples occupancy for every zone, advances the zone's point,
/// stores the new state and forwards transitions to the event sink. Zones are
/// visited in id order so a replay of the same inputs yields the same event
/// sequence.
#[derive(Debug)]
pub struct CaptureHost {
    zones: BTreeMap<ZoneId, CapturePoint>,
    target_tps: u32,
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    tick: u64,
    elapsed: Duration,
    accumulator: Duration,
    metrics: MetricsAccumulator,
    metrics_handle: MetricsHandle,
}

impl CaptureHost {
    pub fn new(config: &LoopConfig, start: Instant) -> Result<Self, CaptureError> {
        config.validate()?;
        let max_frame_delta =
            normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
        let metrics_log_interval =
            normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
        let fixed_dt = config.fixed_dt();

        info!(
            target_tps = config.target_tps,
            max_frame_delta_ms = max_frame_delta.as_millis() as u64,
            max_ticks_per_frame = config.max_ticks_per_frame,
            metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
            "host_config"
        );

        Ok(Self {
            zones: BTreeMap::new(),
            target_tps: config.target_tps,
            fixed_dt,
            max_frame_delta,
            max_ticks_per_frame: config.max_ticks_per_frame,
            tick: 0,
            elapsed: Duration::ZERO,
            accumulator: Duration::ZERO,
            metrics: MetricsAccumulator::new(metrics_log_interval, start),
            metrics_handle: MetricsHandle::default(),
        })
    }

    pub fn add_zone(&mut self, zone: ZoneId, point: CapturePoint) -> Result<(), CaptureError> {
        if self.zones.contains_key(&zone) {
            return Err(CaptureError::DuplicateZone { zone: zone.0 });
        }
        info!(
            zone = %zone,
            rate_model = point.rate_model().kind_name(),
            max_rate = point.rate_model().max_rate(),
            state = %point.snapshot().describe(),
            "zone_registered"
        );
        self.zones.insert(zone, point);
        Ok(())
    }

    pub fn snapshot(&self, zone: &ZoneId) -> Result<CaptureSnapshot, CaptureError> {
        self.zones
            .get(zone)
            .map(CapturePoint::snapshot)
            .ok_or_else(|| CaptureError::UnknownZone {
                zone: zone.0.clone(),
            })
    }

    pub fn snapshots(&self) -> impl Iterator<Item = (&ZoneId, CaptureSnapshot)> + '_ {
        self.zones
            .iter()
            .map(|(zone, point)| (zone, point.snapshot()))
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Number of ticks run so far. Tick ids start at 1.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Simulation time covered by the ticks run so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn fixed_dt(&self) -> Duration {
        self.fixed_dt
    }

    /// Ticks needed to cover `duration` of simulation time, rounded up.
    pub fn ticks_in(&self, duration: Duration) -> u64 {
        // fixed_dt is rounded to whole nanoseconds; count from the rate instead.
        let ticks = duration.as_secs_f64() * f64::from(self.target_tps);
        (ticks - TICK_COUNT_EPSILON).ceil().max(0.0) as u64
    }

    pub fn metrics_handle(&self) -> MetricsHandle {
        self.metrics_handle.clone()
    }

    pub fn metrics_totals(&self) -> HostMetricsSnapshot {
        self.metrics.totals()
    }

    /// Runs exactly one authoritative tick.
    pub fn run_tick<S, E>(&mut self, sampler: &mut S, sink: &mut E) -> TickReport
    where
        S: OccupancySampler + ?Sized,
        E: CaptureEventSink + ?Sized,
    {
        let tick = self.tick.saturating_add(1);
        let dt = TickDelta::from_duration(self.fixed_dt);
        sampler.begin_tick(TickClock {
            tick,
            elapsed: self.elapsed,
        });

        let mut events = Vec::new();
        for (zone, point) in self.zones.iter_mut() {
            let occupancy = match sampler.sample(zone) {
                Ok(occupancy) => occupancy,
                Err(error) => {
                    warn!(tick, zone = %zone, error = %error, "occupancy_sample_failed");
                    self.metrics.record_sampler_failure();
                    Occupancy::EMPTY
                }
            };
            for event in point.apply(occupancy, dt) {
                debug!(
                    tick,
                    zone = %zone,
                    event = event.name(),
                    team = %event.team(),
                    blue = occupancy.blue,
                    red = occupancy.red,
                    "capture_transition"
                );
                self.metrics.record_event(event);
                sink.on_capture_event(tick, zone, event);
                events.push((zone.clone(), event));
            }
        }

        self.tick = tick;
        self.elapsed = self.elapsed.saturating_add(self.fixed_dt);
        self.metrics.record_tick();
        TickReport { tick, events }
    }

    /// Feeds one frame of wall-clock time into the fixed-step accumulator
    /// and runs however many ticks it covers, up to the per-frame cap.
    /// `after_tick` sees the host after every tick, e.g. to publish state.
    pub fn advance_frame<S, E, F>(
        &mut self,
        raw_frame_dt: Duration,
        now: Instant,
        sampler: &mut S,
        sink: &mut E,
        mut after_tick: F,
    ) -> FrameReport
    where
        S: OccupancySampler + ?Sized,
        E: CaptureEventSink + ?Sized,
        F: FnMut(&CaptureHost, &TickReport),
    {
        let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, self.max_frame_delta);
        self.accumulator = self.accumulator.saturating_add(clamped_frame_dt);

        let step_plan = plan_sim_steps(self.accumulator, self.fixed_dt, self.max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            let report = self.run_tick(sampler, sink);
            after_tick(self, &report);
        }
        self.accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame = self.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
        }

        if let Some(snapshot) = self.metrics.maybe_snapshot(now) {
            self.metrics_handle.publish(snapshot);
            info!(
                tps = snapshot.tps,
                ticks_total = snapshot.ticks_total,
                captures_total = snapshot.captures_total,
                neutralizations_total = snapshot.neutralizations_total,
                zone_count = self.zone_count(),
                "host_metrics"
            );
        }

        FrameReport {
            ticks_run: step_plan.ticks_to_run,
            dropped_backlog: step_plan.dropped_backlog,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub ticks_to_run: u32,
    pub remaining_accumulator: Duration,
    pub dropped_backlog: Duration,
}

pub fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

pub fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLog;
    use crate::occupancy::SamplerUnavailable;
    use crate::rate::RateModel;
    use crate::team::Team;

    struct FixedSampler {
        occupancy: Occupancy,
        clocks: Vec<TickClock>,
    }

    impl FixedSampler {
        fn new(blue: u32, red: u32) -> Self {
            Self {
                occupancy: Occupancy::new(blue, red),
                clocks: Vec::new(),
            }
        }
    }

    impl OccupancySampler for FixedSampler {
        fn begin_tick(&mut self, clock: TickClock) {
            self.clocks.push(clock);
        }

        fn sample(&mut self, _zone: &ZoneId) -> Result<Occupancy, SamplerUnavailable> {
            Ok(self.occupancy)
        }
    }

    struct OfflineSampler;

    impl OccupancySampler for OfflineSampler {
        fn sample(&mut self, zone: &ZoneId) -> Result<Occupancy, SamplerUnavailable> {
            Err(SamplerUnavailable {
                zone: zone.clone(),
                reason: "overlap query offline".to_string(),
            })
        }
    }

    fn host_with_zone(zone: &str, point: CapturePoint) -> CaptureHost {
        let config = LoopConfig {
            target_tps: 10,
            ..LoopConfig::default()
        };
        let mut host = CaptureHost::new(&config, Instant::now()).expect("host");
        host.add_zone(ZoneId::new(zone), point).expect("zone");
        host
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let result = plan_sim_steps(Duration::from_millis(48), Duration::from_millis(16), 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let result = plan_sim_steps(Duration::from_millis(120), Duration::from_millis(16), 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn loop_config_rejects_zero_rates() {
        let zero_tps = LoopConfig {
            target_tps: 0,
            ..LoopConfig::default()
        };
        assert!(CaptureHost::new(&zero_tps, Instant::now()).is_err());

        let zero_ticks = LoopConfig {
            max_ticks_per_frame: 0,
            ..LoopConfig::default()
        };
        assert!(zero_ticks.validate().is_err());
    }

    #[test]
    fn duplicate_zone_is_rejected() {
        let mut host = host_with_zone("alpha", CapturePoint::default());
        let error = host
            .add_zone(ZoneId::new("alpha"), CapturePoint::default())
            .expect_err("duplicate");
        assert_eq!(
            error,
            CaptureError::DuplicateZone {
                zone: "alpha".to_string()
            }
        );
    }

    #[test]
    fn unknown_zone_snapshot_is_an_error() {
        let host = host_with_zone("alpha", CapturePoint::default());
        assert!(matches!(
            host.snapshot(&ZoneId::new("bravo")),
            Err(CaptureError::UnknownZone { .. })
        ));
    }

    #[test]
    fn run_tick_advances_state_and_clock() {
        let mut host = host_with_zone("alpha", CapturePoint::default());
        let mut sampler = FixedSampler::new(2, 0);
        let mut log = EventLog::new();

        let report = host.run_tick(&mut sampler, &mut log);

        assert_eq!(report.tick, 1);
        assert!(report.events.is_empty());
        assert_eq!(host.tick_count(), 1);
        assert_eq!(host.elapsed(), Duration::from_millis(100));
        assert_eq!(sampler.clocks[0].elapsed, Duration::ZERO);
        let snapshot = host.snapshot(&ZoneId::new("alpha")).expect("snapshot");
        assert_eq!(snapshot.capturing_team, Some(Team::Blue));
        assert!((snapshot.percentage - 0.9).abs() < 0.0001);
    }

    #[test]
    fn capture_transition_reaches_sink_once() {
        let mut host = host_with_zone("alpha", CapturePoint::default());
        let mut sampler = FixedSampler::new(4, 0);
        let mut log = EventLog::new();

        for _ in 0..200 {
            host.run_tick(&mut sampler, &mut log);
        }

        assert_eq!(log.len(), 1);
        let entry = &log.entries()[0];
        assert_eq!(entry.zone, ZoneId::new("alpha"));
        assert_eq!(entry.event, CaptureEvent::PointCaptured { team: Team::Blue });
        assert_eq!(host.metrics_totals().captures_total, 1);
        assert_eq!(host.metrics_totals().ticks_total, 200);
    }

    #[test]
    fn sampler_failure_counts_as_empty_zone() {
        let point = CapturePoint::restore(
            CaptureSnapshot {
                percentage: 40.0,
                defending_team: None,
                capturing_team: Some(Team::Red),
                attacking_team: Some(Team::Blue),
            },
            RateModel::default(),
        )
        .expect("point");
        let mut host = host_with_zone("alpha", point.clone());
        let mut log = EventLog::new();

        host.run_tick(&mut OfflineSampler, &mut log);

        assert_eq!(
            host.snapshot(&ZoneId::new("alpha")).expect("snapshot"),
            point.snapshot()
        );
        assert_eq!(host.metrics_totals().sampler_failures_total, 1);
        assert!(log.is_empty());
    }

    #[test]
    fn advance_frame_runs_fixed_steps_and_reports_each_tick() {
        let mut host = host_with_zone("alpha", CapturePoint::default());
        let mut sampler = FixedSampler::new(1, 0);
        let mut log = EventLog::new();
        let mut seen_ticks = Vec::new();

        let report = host.advance_frame(
            Duration::from_millis(250),
            Instant::now(),
            &mut sampler,
            &mut log,
            |host, tick| {
                assert_eq!(host.tick_count(), tick.tick);
                seen_ticks.push(tick.tick);
            },
        );

        assert_eq!(report.ticks_run, 2);
        assert_eq!(report.dropped_backlog, Duration::ZERO);
        assert_eq!(seen_ticks, vec![1, 2]);

        let report = host.advance_frame(
            Duration::from_millis(50),
            Instant::now(),
            &mut sampler,
            &mut log,
            |_, _| {},
        );
        assert_eq!(report.ticks_run, 1);
    }

    #[test]
    fn ticks_in_rounds_up() {
        let host = host_with_zone("alpha", CapturePoint::default());
        assert_eq!(host.ticks_in(Duration::from_secs(2)), 20);
        assert_eq!(host.ticks_in(Duration::from_millis(1050)), 11);
        assert_eq!(host.ticks_in(Duration::ZERO), 0);

        let config = LoopConfig::default();
        let host = CaptureHost::new(&config, Instant::now()).expect("host");
        assert_eq!(host.ticks_in(Duration::from_secs(10)), 600);
    }

    #[test]
    fn zones_tick_in_id_order() {
        let mut host = host_with_zone("charlie", CapturePoint::default());
        host.add_zone(ZoneId::new("alpha"), CapturePoint::default())
            .expect("zone");
        let ids = host
            .snapshots()
            .map(|(zone, _)| zone.as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["alpha".to_string(), "charlie".to_string()]);
        assert_eq!(host.zone_count(), 2);
    }
}
