use serde::{Deserialize, Serialize};

use crate::team::{team_label, Team};

/// The externally observable part of a capture point: everything a remote
/// observer needs to draw contest status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureSnapshot {
    pub percentage: f32,
    pub defending_team: Option<Team>,
    pub capturing_team: Option<Team>,
    pub attacking_team: Option<Team>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "phase", content = "team", rename_all = "snake_case")]
pub enum ContestPhase {
    Neutral,
    Capturing(Team),
    Held(Team),
}

impl CaptureSnapshot {
    pub fn phase(&self) -> ContestPhase {
        match (self.defending_team, self.capturing_team) {
            (Some(team), _) => ContestPhase::Held(team),
            (None, Some(team)) => ContestPhase::Capturing(team),
            (None, None) => ContestPhase::Neutral,
        }
    }

    /// Same ownership fields, ignoring progress.
    pub fn same_ownership(&self, other: &CaptureSnapshot) -> bool {
        self.defending_team == other.defending_team
            && self.capturing_team == other.capturing_team
            && self.attacking_team == other.attacking_team
    }

    pub fn describe(&self) -> String {
        match self.phase() {
            ContestPhase::Neutral => "neutral".to_string(),
            ContestPhase::Capturing(team) => {
                format!("{} capturing {:.1}%", team_label(Some(team)), self.percentage)
            }
            ContestPhase::Held(team) => {
                format!("held by {} {:.1}%", team_label(Some(team)), self.percentage)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_prefers_defender() {
        let held = CaptureSnapshot {
            percentage: 60.0,
            defending_team: Some(Team::Red),
            capturing_team: None,
            attacking_team: Some(Team::Blue),
        };
        assert_eq!(held.phase(), ContestPhase::Held(Team::Red));
        assert_eq!(held.describe(), "held by red 60.0%");
        assert_eq!(CaptureSnapshot::default().phase(), ContestPhase::Neutral);
    }

    #[test]
    fn same_ownership_ignores_progress() {
        let a = CaptureSnapshot {
            percentage: 10.0,
            defending_team: None,
            capturing_team: Some(Team::Blue),
            attacking_team: Some(Team::Red),
        };
        let b = CaptureSnapshot {
            percentage: 40.0,
            ..a
        };
        assert!(a.same_ownership(&b));
        assert!(!a.same_ownership(&CaptureSnapshot::default()));
    }

    #[test]
    fn snapshot_json_names_fields() {
        let snapshot = CaptureSnapshot {
            percentage: 25.0,
            defending_team: None,
            capturing_team: Some(Team::Blue),
            attacking_team: Some(Team::Red),
        };
        let value = serde_json::to_value(snapshot).expect("encode");
        assert_eq!(
            value,
            serde_json::json!({
                "percentage": 25.0,
                "defending_team": null,
                "capturing_team": "blue",
                "attacking_team": "red"
            })
        );
    }
}
