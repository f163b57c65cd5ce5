use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::events::CaptureEvent;
use crate::occupancy::Occupancy;
use crate::rate::RateModel;
use crate::snapshot::CaptureSnapshot;
use crate::team::Team;

pub const MIN_PERCENTAGE: f32 = 0.0;
pub const MAX_PERCENTAGE: f32 = 100.0;

/// Elapsed simulation time for one tick. Always finite and non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct TickDelta(f32);

impl TickDelta {
    pub const ZERO: TickDelta = TickDelta(0.0);

    pub fn from_secs(seconds: f32) -> Result<Self, CaptureError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(CaptureError::InvalidTickDelta { seconds });
        }
        Ok(Self(seconds))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration.as_secs_f32())
    }

    pub fn as_secs(self) -> f32 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

/// Contest state of one capture point.
///
/// Invariants held by every value reachable through the public API:
/// - `percentage` is within `[0, 100]`;
/// - at 0 the point is neutral (no defender, no capturer);
/// - inside `(0, 100)` exactly one of defender/capturer is set;
/// - at 100 the defender holds the point and nobody is capturing;
/// - the attacking team is the opponent of whichever side is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturePoint {
    defending_team: Option<Team>,
    capturing_team: Option<Team>,
    attacking_team: Option<Team>,
    percentage: f32,
    rate_model: RateModel,
}

/// Result of [`CapturePoint::advance`]: the next state plus any transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub point: CapturePoint,
    pub events: Vec<CaptureEvent>,
}

impl Default for CapturePoint {
    fn default() -> Self {
        Self {
            defending_team: None,
            capturing_team: None,
            attacking_team: None,
            percentage: MIN_PERCENTAGE,
            rate_model: RateModel::default(),
        }
    }
}

impl CapturePoint {
    pub fn neutral(rate_model: RateModel) -> Result<Self, CaptureError> {
        rate_model.validate()?;
        Ok(Self {
            rate_model,
            ..Self::default()
        })
    }

    /// A point placed in the level already secured by `team`.
    pub fn held_by(team: Team, rate_model: RateModel) -> Result<Self, CaptureError> {
        rate_model.validate()?;
        Ok(Self {
            defending_team: Some(team),
            capturing_team: None,
            attacking_team: Some(team.opponent()),
            percentage: MAX_PERCENTAGE,
            rate_model,
        })
    }

    /// Rebuilds a point from an observed snapshot, rejecting snapshots that
    /// break the contest invariants.
    pub fn restore(snapshot: CaptureSnapshot, rate_model: RateModel) -> Result<Self, CaptureError> {
        rate_model.validate()?;
        validate_snapshot(&snapshot)?;
        Ok(Self {
            defending_team: snapshot.defending_team,
            capturing_team: snapshot.capturing_team,
            attacking_team: snapshot.attacking_team,
            percentage: snapshot.percentage,
            rate_model,
        })
    }

    pub fn defending_team(&self) -> Option<Team> {
        self.defending_team
    }

    pub fn capturing_team(&self) -> Option<Team> {
        self.capturing_team
    }

    pub fn attacking_team(&self) -> Option<Team> {
        self.attacking_team
    }

    pub fn percentage(&self) -> f32 {
        self.percentage
    }

    pub fn rate_model(&self) -> &RateModel {
        &self.rate_model
    }

    pub fn is_neutral(&self) -> bool {
        self.defending_team.is_none() && self.capturing_team.is_none()
    }

    /// Team that currently counts as "defenders" for the rate model.
    pub fn holding_side(&self) -> Option<Team> {
        self.defending_team.or(self.capturing_team)
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            percentage: self.percentage,
            defending_team: self.defending_team,
            capturing_team: self.capturing_team,
            attacking_team: self.attacking_team,
        }
    }

    /// Computes the state after `dt` seconds with `occupancy` on the point.
    /// Pure: `self` is left untouched, so speculative calls are safe.
    pub fn advance(&self, occupancy: Occupancy, dt: TickDelta) -> TickOutcome {
        if dt.is_zero() {
            return self.unchanged();
        }
        // Equal head counts are a stalemate.
        let Some(majority) = occupancy.majority() else {
            return self.unchanged();
        };

        let was_contested = !self.is_neutral();
        let mut next = self.clone();
        if !was_contested {
            next.capturing_team = Some(majority);
            next.attacking_team = Some(majority.opponent());
        }

        let holder = next.holding_side().unwrap_or(majority);
        let defenders = occupancy.count(holder);
        let attackers = occupancy.count(holder.opponent());

        if next.percentage >= MAX_PERCENTAGE && defenders >= attackers {
            return self.unchanged();
        }

        let speed = self.rate_model.capture_speed(defenders, attackers);
        if speed == 0.0 {
            return self.unchanged();
        }

        next.percentage =
            (next.percentage + speed * dt.as_secs()).clamp(MIN_PERCENTAGE, MAX_PERCENTAGE);

        let mut events = Vec::new();
        if next.percentage <= MIN_PERCENTAGE {
            if was_contested {
                events.push(CaptureEvent::PointNeutralized {
                    by: holder.opponent(),
                });
            }
            next.percentage = MIN_PERCENTAGE;
            next.defending_team = None;
            next.capturing_team = None;
            next.attacking_team = None;
        } else if next.percentage >= MAX_PERCENTAGE {
            if let Some(team) = next.capturing_team.take() {
                events.push(CaptureEvent::PointCaptured { team });
                next.defending_team = Some(team);
                next.attacking_team = Some(team.opponent());
            }
        }

        TickOutcome {
            point: next,
            events,
        }
    }

    /// Advances in place and returns the transitions, for hosts that own the
    /// point and do not need the previous value.
    pub fn apply(&mut self, occupancy: Occupancy, dt: TickDelta) -> Vec<CaptureEvent> {
        let outcome = self.advance(occupancy, dt);
        *self = outcome.point;
        outcome.events
    }

    fn unchanged(&self) -> TickOutcome {
        TickOutcome {
            point: self.clone(),
            events: Vec::new(),
        }
    }
}

/// Free-function form of [`CapturePoint::advance`].
pub fn advance(point: &CapturePoint, occupancy: Occupancy, dt: TickDelta) -> TickOutcome {
    point.advance(occupancy, dt)
}

fn validate_snapshot(snapshot: &CaptureSnapshot) -> Result<(), CaptureError> {
    let percentage = snapshot.percentage;
    if !percentage.is_finite() || !(MIN_PERCENTAGE..=MAX_PERCENTAGE).contains(&percentage) {
        return Err(invalid_state(format!(
            "percentage must be within [0, 100], got {percentage}"
        )));
    }

    let side = match (snapshot.defending_team, snapshot.capturing_team) {
        (Some(_), Some(_)) => {
            return Err(invalid_state(
                "defending and capturing team cannot both be set",
            ))
        }
        (side, None) | (None, side) => side,
    };

    match side {
        None if percentage > MIN_PERCENTAGE => {
            return Err(invalid_state(format!(
                "a point at {percentage}% needs a defending or capturing team"
            )))
        }
        Some(_) if percentage <= MIN_PERCENTAGE => {
            return Err(invalid_state("a point at 0% must be neutral"))
        }
        _ => {}
    }
    if percentage >= MAX_PERCENTAGE && snapshot.capturing_team.is_some() {
        return Err(invalid_state(
            "a point at 100% is held by its defender, not captured",
        ));
    }

    let expected_attacker = side.map(Team::opponent);
    if snapshot.attacking_team != expected_attacker {
        return Err(invalid_state(format!(
            "attacking team must be {expected_attacker:?}, got {:?}",
            snapshot.attacking_team
        )));
    }
    Ok(())
}

fn invalid_state(reason: impl Into<String>) -> CaptureError {
    CaptureError::InvalidState {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(seconds: f32) -> TickDelta {
        TickDelta::from_secs(seconds).expect("valid delta")
    }

    fn capturing(team: Team, percentage: f32) -> CapturePoint {
        CapturePoint::restore(
            CaptureSnapshot {
                percentage,
                defending_team: None,
                capturing_team: Some(team),
                attacking_team: Some(team.opponent()),
            },
            RateModel::default(),
        )
        .expect("capturing state")
    }

    fn held(team: Team, percentage: f32) -> CapturePoint {
        CapturePoint::restore(
            CaptureSnapshot {
                percentage,
                defending_team: Some(team),
                capturing_team: None,
                attacking_team: Some(team.opponent()),
            },
            RateModel::default(),
        )
        .expect("held state")
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 0.0001,
            "{actual} vs {expected}"
        );
    }

    #[test]
    fn neutral_start_assigns_majority_as_capturer() {
        let point = CapturePoint::default();
        let outcome = point.advance(Occupancy::new(3, 1), secs(1.0));

        assert_eq!(outcome.point.capturing_team(), Some(Team::Blue));
        assert_eq!(outcome.point.defending_team(), None);
        assert_eq!(outcome.point.attacking_team(), Some(Team::Red));
        assert_close(
            outcome.point.percentage(),
            RateModel::default().capture_speed(2, 0),
        );
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn red_majority_starts_red_capture() {
        let outcome = CapturePoint::default().advance(Occupancy::new(0, 1), secs(1.0));
        assert_eq!(outcome.point.capturing_team(), Some(Team::Red));
        assert_close(outcome.point.percentage(), 5.0);
    }

    #[test]
    fn tie_is_a_stalemate() {
        let states = [
            CapturePoint::default(),
            capturing(Team::Blue, 40.0),
            held(Team::Red, 70.0),
            held(Team::Blue, 100.0),
        ];
        for state in states {
            for count in 0..6 {
                let outcome = state.advance(Occupancy::new(count, count), secs(1.0));
                assert_eq!(outcome.point, state);
                assert!(outcome.events.is_empty());
            }
        }
    }

    #[test]
    fn zero_delta_is_a_no_op() {
        let state = capturing(Team::Red, 30.0);
        let outcome = state.advance(Occupancy::new(0, 4), TickDelta::ZERO);
        assert_eq!(outcome.point, state);
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn reaching_full_progress_captures_once() {
        let state = capturing(Team::Blue, 95.0);
        let outcome = state.advance(Occupancy::new(3, 1), secs(1.0));

        assert_eq!(
            outcome.events,
            vec![CaptureEvent::PointCaptured { team: Team::Blue }]
        );
        assert_eq!(outcome.point.percentage(), MAX_PERCENTAGE);
        assert_eq!(outcome.point.defending_team(), Some(Team::Blue));
        assert_eq!(outcome.point.capturing_team(), None);
        assert_eq!(outcome.point.attacking_team(), Some(Team::Red));
    }

    #[test]
    fn neutral_point_can_be_captured_in_a_single_long_tick() {
        let point = CapturePoint::default();
        // 0v1 at 5%/s covers the full bar in 20 seconds.
        let outcome = point.advance(Occupancy::new(0, 1), secs(25.0));

        assert_eq!(
            outcome.events,
            vec![CaptureEvent::PointCaptured { team: Team::Red }]
        );
        assert_eq!(outcome.point.percentage(), MAX_PERCENTAGE);
        assert_eq!(outcome.point.defending_team(), Some(Team::Red));
        assert_eq!(outcome.point.capturing_team(), None);
        assert_eq!(outcome.point.attacking_team(), Some(Team::Blue));
    }

    #[test]
    fn saturated_point_ignores_dominant_defenders() {
        let mut point = held(Team::Blue, 100.0);
        for _ in 0..50 {
            let events = point.apply(Occupancy::new(3, 1), secs(0.5));
            assert!(events.is_empty());
            assert_eq!(point.percentage(), MAX_PERCENTAGE);
        }
        assert_eq!(point, held(Team::Blue, 100.0));
    }

    #[test]
    fn attackers_drain_owned_point_to_neutral() {
        let state = held(Team::Blue, 100.0);
        let outcome = state.advance(Occupancy::new(0, 2), secs(20.0));

        assert_eq!(
            outcome.events,
            vec![CaptureEvent::PointNeutralized { by: Team::Red }]
        );
        assert_eq!(outcome.point.percentage(), MIN_PERCENTAGE);
        assert!(outcome.point.is_neutral());
        assert_eq!(outcome.point.attacking_team(), None);
    }

    #[test]
    fn partial_drain_keeps_defender() {
        let state = held(Team::Red, 100.0);
        let outcome = state.advance(Occupancy::new(1, 0), secs(2.0));

        assert!(outcome.events.is_empty());
        assert_close(outcome.point.percentage(), 90.0);
        assert_eq!(outcome.point.defending_team(), Some(Team::Red));
        assert_eq!(outcome.point.capturing_team(), None);
    }

    #[test]
    fn defender_restoring_to_full_is_not_a_capture() {
        let state = held(Team::Red, 60.0);
        let outcome = state.advance(Occupancy::new(0, 4), secs(10.0));

        assert!(outcome.events.is_empty());
        assert_eq!(outcome.point.percentage(), MAX_PERCENTAGE);
        assert_eq!(outcome.point.defending_team(), Some(Team::Red));
    }

    #[test]
    fn interrupted_capture_is_neutralized_by_opponent() {
        let state = capturing(Team::Blue, 5.0);
        let outcome = state.advance(Occupancy::new(0, 2), secs(1.0));

        assert_eq!(
            outcome.events,
            vec![CaptureEvent::PointNeutralized { by: Team::Red }]
        );
        assert!(outcome.point.is_neutral());
        assert_eq!(outcome.point.percentage(), MIN_PERCENTAGE);
    }

    #[test]
    fn outnumbered_beyond_influence_cap_is_a_stalemate() {
        let point = CapturePoint::default();
        let outcome = point.advance(Occupancy::new(6, 5), secs(1.0));
        assert_eq!(outcome.point, point);
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn advance_leaves_input_untouched() {
        let state = capturing(Team::Red, 50.0);
        let before = state.clone();
        let _ = advance(&state, Occupancy::new(0, 4), secs(1.0));
        assert_eq!(state, before);
    }

    #[test]
    fn tick_delta_rejects_non_finite_and_negative() {
        assert!(TickDelta::from_secs(f32::NAN).is_err());
        assert!(TickDelta::from_secs(f32::INFINITY).is_err());
        assert!(TickDelta::from_secs(-0.1).is_err());
        assert!(TickDelta::from_secs(0.0).expect("zero").is_zero());
        assert_close(
            TickDelta::from_duration(Duration::from_millis(250)).as_secs(),
            0.25,
        );
    }

    #[test]
    fn restore_rejects_broken_invariants() {
        let broken = [
            CaptureSnapshot {
                percentage: 120.0,
                ..CaptureSnapshot::default()
            },
            CaptureSnapshot {
                percentage: 50.0,
                ..CaptureSnapshot::default()
            },
            CaptureSnapshot {
                percentage: 0.0,
                defending_team: Some(Team::Blue),
                capturing_team: None,
                attacking_team: Some(Team::Red),
            },
            CaptureSnapshot {
                percentage: 40.0,
                defending_team: Some(Team::Blue),
                capturing_team: Some(Team::Red),
                attacking_team: None,
            },
            CaptureSnapshot {
                percentage: 100.0,
                defending_team: None,
                capturing_team: Some(Team::Blue),
                attacking_team: Some(Team::Red),
            },
            CaptureSnapshot {
                percentage: 40.0,
                defending_team: Some(Team::Blue),
                capturing_team: None,
                attacking_team: Some(Team::Blue),
            },
        ];
        for snapshot in broken {
            assert!(
                CapturePoint::restore(snapshot, RateModel::default()).is_err(),
                "{snapshot:?} should be rejected"
            );
        }
    }

    #[test]
    fn held_by_starts_secured() {
        let point = CapturePoint::held_by(Team::Red, RateModel::default_table()).expect("point");
        assert_eq!(point.snapshot(), held(Team::Red, 100.0).snapshot());
        assert_eq!(point.rate_model().kind_name(), "table");
    }

    #[test]
    fn neutral_rejects_invalid_rate_model() {
        let result = CapturePoint::neutral(RateModel::Fixed {
            rate: 0.0,
            influence_cap: 4,
        });
        assert!(matches!(
            result,
            Err(CaptureError::InvalidRateModel { .. })
        ));
    }
}
