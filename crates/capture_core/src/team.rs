use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two sides contesting a capture point.
///
/// "No team" is expressed as `Option<Team>::None` everywhere; there is no
/// neutral variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Blue,
    Red,
}

impl Team {
    pub fn opponent(self) -> Team {
        match self {
            Self::Blue => Self::Red,
            Self::Red => Self::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Red => "red",
        }
    }

    /// Resolves a free-form team tag. Matching ignores ASCII case and
    /// surrounding whitespace; anything else is not a combatant.
    pub fn from_tag(tag: &str) -> Option<Team> {
        let trimmed = tag.trim();
        if trimmed.eq_ignore_ascii_case("blue") {
            Some(Self::Blue)
        } else if trimmed.eq_ignore_ascii_case("red") {
            Some(Self::Red)
        } else {
            None
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats an optional team the way logs and summaries show it.
pub fn team_label(team: Option<Team>) -> &'static str {
    team.map(Team::as_str).unwrap_or("neutral")
}
