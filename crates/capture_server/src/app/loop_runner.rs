use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use capture_core::{
    CaptureError, CaptureEvent, CaptureEventSink, CaptureHost, EventLog, HostMetricsSnapshot,
    ZoneId,
};
use thiserror::Error;
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::publish::{PublishStats, PublishedSnapshot, SnapshotPublisher};
use super::roster::ScriptedSampler;
use super::scenario::ScenarioError;
use super::transcript::{MatchTranscript, TranscriptError, TRANSCRIPT_VERSION};

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct MatchSummary {
    pub transcript: MatchTranscript,
    pub digest: String,
    pub publish_stats: PublishStats,
    pub dropped_backlog: Duration,
    pub host_metrics: HostMetricsSnapshot,
}

impl MatchSummary {
    pub(crate) fn render(&self) -> String {
        let transcript = &self.transcript;
        let mut lines = vec![format!(
            "match '{}' finished after {} ticks: {} captures, {} neutralizations",
            transcript.scenario,
            transcript.totals.ticks,
            transcript.totals.captures,
            transcript.totals.neutralizations
        )];
        for (zone, snapshot) in &transcript.final_state {
            lines.push(format!("  {zone}: {}", snapshot.describe()));
        }
        lines.push(format!(
            "host tps {:.1}, sampler failures {}",
            self.host_metrics.tps, self.host_metrics.sampler_failures_total
        ));
        lines.push(format!(
            "snapshots published {}, suppressed {}",
            self.publish_stats.published, self.publish_stats.suppressed
        ));
        if !self.dropped_backlog.is_zero() {
            lines.push(format!(
                "dropped {}ms of backlog",
                self.dropped_backlog.as_millis()
            ));
        }
        lines.push(format!("transcript sha256 {}", self.digest));
        lines.join("\n")
    }
}

/// Logs every transition and keeps it for the transcript.
#[derive(Debug, Default)]
struct MatchEventSink {
    log: EventLog,
}

impl CaptureEventSink for MatchEventSink {
    fn on_capture_event(&mut self, tick: u64, zone: &ZoneId, event: CaptureEvent) {
        info!(
            tick,
            zone = %zone,
            event = event.name(),
            team = %event.team(),
            "capture_event"
        );
        self.log.on_capture_event(tick, zone, event);
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run_match(&app, &mut out) {
        Ok(summary) => {
            if let Err(err) = writeln!(out, "{}", summary.render()) {
                error!(error = %err, "summary_write_failed");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "match_failed");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn run_match<W: Write>(app: &AppWiring, out: &mut W) -> Result<MatchSummary, RunError> {
    let start = Instant::now();
    let mut host = CaptureHost::new(&app.loop_config, start)?;
    for zone in &app.scenario.zones {
        host.add_zone(ZoneId::new(zone.id.clone()), zone.build_point()?)?;
    }

    let fixed_dt = host.fixed_dt();
    let metrics = host.metrics_handle();
    let total_ticks = host.ticks_in(app.scenario.duration()?);
    let mut sampler = ScriptedSampler::from_scenario(&app.scenario);
    let mut sink = MatchEventSink::default();
    let mut publisher = SnapshotPublisher::new(app.publish_hz);
    let emit_snapshots = !app.options.quiet_snapshots;
    let mut emit_error: Option<RunError> = None;

    for (zone, snapshot) in host.snapshots() {
        if let Some(published) = publisher.offer(0, Duration::ZERO, zone, snapshot) {
            if emit_snapshots {
                emit_snapshot(out, &published)?;
            }
        }
    }

    info!(
        scenario = %app.scenario.name,
        total_ticks,
        agents = sampler.roster().len(),
        realtime = app.options.realtime,
        "match_started"
    );

    let mut sim_clock = Duration::ZERO;
    let mut last_frame = start;
    let mut dropped_backlog = Duration::ZERO;
    while host.tick_count() < total_ticks {
        let (raw_frame_dt, now) = if app.options.realtime {
            let deadline = last_frame + fixed_dt;
            let before_sleep = Instant::now();
            if before_sleep < deadline {
                thread::sleep(deadline - before_sleep);
            }
            let now = Instant::now();
            let frame_dt = now.saturating_duration_since(last_frame);
            last_frame = now;
            (frame_dt, now)
        } else {
            sim_clock = sim_clock.saturating_add(fixed_dt);
            (fixed_dt, start + sim_clock)
        };

        // Never schedule past the end of the match.
        let remaining = total_ticks - host.tick_count();
        let budget = fixed_dt.saturating_mul(u32::try_from(remaining).unwrap_or(u32::MAX));
        let frame_dt = raw_frame_dt.min(budget);

        let frame = host.advance_frame(frame_dt, now, &mut sampler, &mut sink, |host, report| {
            for (zone, snapshot) in host.snapshots() {
                let Some(published) = publisher.offer(report.tick, host.elapsed(), zone, snapshot)
                else {
                    continue;
                };
                if emit_snapshots && emit_error.is_none() {
                    if let Err(err) = emit_snapshot(out, &published) {
                        emit_error = Some(err);
                    }
                }
            }
        });
        if let Some(err) = emit_error.take() {
            return Err(err);
        }
        dropped_backlog = dropped_backlog.saturating_add(frame.dropped_backlog);
    }

    let final_tick = host.tick_count();
    let mut final_state = BTreeMap::new();
    for (zone, snapshot) in host.snapshots() {
        if let Some(published) = publisher.flush(final_tick, zone, snapshot) {
            if emit_snapshots {
                emit_snapshot(out, &published)?;
            }
        }
        final_state.insert(zone.as_str().to_string(), snapshot);
    }

    let transcript = MatchTranscript {
        transcript_version: TRANSCRIPT_VERSION,
        scenario: app.scenario.name.clone(),
        tick_rate: app.loop_config.target_tps,
        totals: host.metrics_totals().into(),
        events: sink.log.into_entries(),
        final_state,
    };
    let digest = match &app.options.transcript_path {
        Some(path) => {
            let digest = transcript.write_to(path)?;
            info!(path = %path.display(), digest = %digest, "transcript_written");
            digest
        }
        None => transcript.digest_hex()?,
    };

    let publish_stats = publisher.stats();
    let host_metrics = metrics.snapshot();
    info!(
        tps = host_metrics.tps,
        ticks = final_tick,
        events = transcript.events.len(),
        published = publish_stats.published,
        suppressed = publish_stats.suppressed,
        dropped_backlog_ms = dropped_backlog.as_millis() as u64,
        wall_ms = start.elapsed().as_millis() as u64,
        "match_complete"
    );

    Ok(MatchSummary {
        transcript,
        digest,
        publish_stats,
        dropped_backlog,
        host_metrics,
    })
}

fn emit_snapshot<W: Write>(out: &mut W, published: &PublishedSnapshot) -> Result<(), RunError> {
    let line = serde_json::to_string(published)?;
    writeln!(out, "{line}")?;
    Ok(())
}
