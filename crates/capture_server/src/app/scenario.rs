use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use capture_core::{CapturePoint, RateModel, Team};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) const SCENARIO_VERSION: u32 = 1;
/// One week of match time.
pub(crate) const MAX_DURATION_SECONDS: f32 = 604_800.0;

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("failed to read scenario '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario json{}: {message}", at_path(.path))]
    Parse { path: String, message: String },
    #[error("scenario validation failed at {path}: {message}")]
    Validation { path: String, message: String },
}

fn at_path(path: &str) -> String {
    if path.is_empty() || path == "." {
        String::new()
    } else {
        format!(" at {path}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct AgentId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    pub scenario_version: u32,
    pub name: String,
    pub duration_seconds: f32,
    pub zones: Vec<ZoneDef>,
    #[serde(default)]
    pub agents: Vec<AgentDef>,
    #[serde(default)]
    pub timeline: Vec<PresenceKeyframe>,
    #[serde(default)]
    pub sampler_outages: Vec<SamplerOutage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ZoneDef {
    pub id: String,
    #[serde(default)]
    pub rate_model: RateModel,
    #[serde(default)]
    pub initial_owner: Option<Team>,
}

impl Scenario {
    pub(crate) fn duration(&self) -> Result<Duration, ScenarioError> {
        Duration::try_from_secs_f32(self.duration_seconds).map_err(|_| {
            expected_actual(
                "duration_seconds",
                "a representable duration",
                self.duration_seconds,
            )
        })
    }
}

impl ZoneDef {
    pub(crate) fn build_point(&self) -> Result<CapturePoint, capture_core::CaptureError> {
        match self.initial_owner {
            Some(team) => CapturePoint::held_by(team, self.rate_model.clone()),
            None => CapturePoint::neutral(self.rate_model.clone()),
        }
    }
}

/// An agent and its team tag. Tags that are not a known team mark
/// non-combatants, which never count toward occupancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AgentDef {
    pub id: AgentId,
    pub team: String,
}

/// From `at_seconds` on, exactly `present` stand inside `zone`, until the
/// next keyframe for the same zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PresenceKeyframe {
    pub at_seconds: f32,
    pub zone: String,
    pub present: Vec<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SamplerOutage {
    pub zone: String,
    pub from_seconds: f32,
    pub until_seconds: f32,
}

pub(crate) fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let scenario = parse_scenario_json(&raw)?;
    validate_scenario(&scenario)?;
    Ok(scenario)
}

pub(crate) fn parse_scenario_json(raw: &str) -> Result<Scenario, ScenarioError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, Scenario>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let source = error.into_inner();
        ScenarioError::Parse {
            path,
            message: source.to_string(),
        }
    })
}

fn validation_err(path: impl Into<String>, message: impl Into<String>) -> ScenarioError {
    ScenarioError::Validation {
        path: path.into(),
        message: message.into(),
    }
}

fn expected_actual(
    path: impl Into<String>,
    expected: impl Display,
    actual: impl Display,
) -> ScenarioError {
    validation_err(path, format!("expected {expected}, got {actual}"))
}

fn check_time(path: String, seconds: f32) -> Result<(), ScenarioError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(expected_actual(path, "finite non-negative seconds", seconds));
    }
    Ok(())
}

pub(crate) fn validate_scenario(scenario: &Scenario) -> Result<(), ScenarioError> {
    if scenario.scenario_version != SCENARIO_VERSION {
        return Err(expected_actual(
            "scenario_version",
            SCENARIO_VERSION,
            scenario.scenario_version,
        ));
    }
    if !scenario.duration_seconds.is_finite() || scenario.duration_seconds <= 0.0 {
        return Err(expected_actual(
            "duration_seconds",
            "finite positive seconds",
            scenario.duration_seconds,
        ));
    }
    if scenario.duration_seconds > MAX_DURATION_SECONDS {
        return Err(expected_actual(
            "duration_seconds",
            format!("at most {MAX_DURATION_SECONDS} seconds"),
            scenario.duration_seconds,
        ));
    }
    if scenario.zones.is_empty() {
        return Err(validation_err("zones", "at least one zone is required"));
    }

    let mut zone_ids = HashMap::with_capacity(scenario.zones.len());
    for (index, zone) in scenario.zones.iter().enumerate() {
        let path = format!("zones[{index}]");
        if zone.id.trim().is_empty() {
            return Err(validation_err(format!("{path}.id"), "zone id must not be empty"));
        }
        if let Some(first_index) = zone_ids.insert(zone.id.as_str(), index) {
            return Err(validation_err(
                format!("{path}.id"),
                format!("duplicate zone id '{}' (first seen at zones[{first_index}])", zone.id),
            ));
        }
        zone.rate_model
            .validate()
            .map_err(|error| validation_err(format!("{path}.rate_model"), error.to_string()))?;
    }

    let mut agent_ids = HashMap::with_capacity(scenario.agents.len());
    for (index, agent) in scenario.agents.iter().enumerate() {
        if let Some(first_index) = agent_ids.insert(agent.id, index) {
            return Err(validation_err(
                format!("agents[{index}].id"),
                format!(
                    "duplicate agent id {} (first seen at agents[{first_index}])",
                    agent.id.0
                ),
            ));
        }
    }

    for (index, keyframe) in scenario.timeline.iter().enumerate() {
        let path = format!("timeline[{index}]");
        check_time(format!("{path}.at_seconds"), keyframe.at_seconds)?;
        if !zone_ids.contains_key(keyframe.zone.as_str()) {
            return Err(validation_err(
                format!("{path}.zone"),
                format!("unknown zone '{}'", keyframe.zone),
            ));
        }
        let mut seen = HashSet::with_capacity(keyframe.present.len());
        for (agent_index, agent) in keyframe.present.iter().enumerate() {
            let agent_path = format!("{path}.present[{agent_index}]");
            if !agent_ids.contains_key(agent) {
                return Err(validation_err(agent_path, format!("unknown agent id {}", agent.0)));
            }
            if !seen.insert(*agent) {
                return Err(validation_err(
                    agent_path,
                    format!("agent {} listed twice", agent.0),
                ));
            }
        }
    }

    for (index, outage) in scenario.sampler_outages.iter().enumerate() {
        let path = format!("sampler_outages[{index}]");
        check_time(format!("{path}.from_seconds"), outage.from_seconds)?;
        check_time(format!("{path}.until_seconds"), outage.until_seconds)?;
        if outage.until_seconds <= outage.from_seconds {
            return Err(expected_actual(
                format!("{path}.until_seconds"),
                format!("a time after {}", outage.from_seconds),
                outage.until_seconds,
            ));
        }
        if !zone_ids.contains_key(outage.zone.as_str()) {
            return Err(validation_err(
                format!("{path}.zone"),
                format!("unknown zone '{}'", outage.zone),
            ));
        }
    }

    Ok(())
}

/// Per-zone keyframes in time order. Keyframes with equal times keep their
/// file order, so the later one wins.
pub(crate) fn keyframes_by_zone(scenario: &Scenario) -> BTreeMap<String, Vec<PresenceKeyframe>> {
    let mut by_zone = BTreeMap::<String, Vec<PresenceKeyframe>>::new();
    for keyframe in &scenario.timeline {
        by_zone
            .entry(keyframe.zone.clone())
            .or_default()
            .push(keyframe.clone());
    }
    for keyframes in by_zone.values_mut() {
        keyframes.sort_by(|a, b| a.at_seconds.total_cmp(&b.at_seconds));
    }
    by_zone
}

#[cfg(test)]
pub(crate) fn sample_scenario_json() -> serde_json::Value {
    serde_json::json!({
        "scenario_version": 1,
        "name": "single_lane",
        "duration_seconds": 30.0,
        "zones": [
            { "id": "alpha" },
            { "id": "bravo", "rate_model": { "kind": "table", "rates": [5.0, 6.25, 8.33, 12.5] }, "initial_owner": "red" }
        ],
        "agents": [
            { "id": 1, "team": "Blue" },
            { "id": 2, "team": "Blue" },
            { "id": 3, "team": "Red" },
            { "id": 9, "team": "Spectator" }
        ],
        "timeline": [
            { "at_seconds": 0.0, "zone": "alpha", "present": [1, 2, 3, 9] },
            { "at_seconds": 12.0, "zone": "alpha", "present": [] }
        ],
        "sampler_outages": [
            { "zone": "bravo", "from_seconds": 1.0, "until_seconds": 2.0 }
        ]
    })
}
