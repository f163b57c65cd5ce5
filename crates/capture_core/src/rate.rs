//! Capture speed as a function of who is standing on the point.
//!
//! Every model maps a (defenders, attackers) pair to a signed rate in
//! percent per second. Positive rates push progress toward 100, negative
//! rates toward 0. All models share the same contract:
//!
//! - zero when the clamped head counts are equal,
//! - non-decreasing in defenders and non-increasing in attackers,
//! - bounded, because each side's head count is clamped to the model's
//!   influence cap before the advantage is taken.

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;

pub const DEFAULT_INFLUENCE_CAP: u32 = 4;
pub const DEFAULT_LINEAR_K: f32 = 4.0;
pub const DEFAULT_LINEAR_BIAS: f32 = -0.25;
pub const DEFAULT_TABLE_RATES: [f32; 4] = [5.0, 6.25, 8.33, 12.5];
pub const DEFAULT_FIXED_RATE: f32 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateModel {
    /// `sign(adv) * k * (|adv| - bias)`.
    Linear {
        k: f32,
        bias: f32,
        #[serde(default = "default_influence_cap")]
        influence_cap: u32,
    },
    /// Rate looked up by advantage magnitude; entry `i` is used for an
    /// advantage of `i + 1`. The table length is the influence cap.
    Table { rates: Vec<f32> },
    /// Same speed for any non-zero advantage.
    Fixed {
        rate: f32,
        #[serde(default = "default_influence_cap")]
        influence_cap: u32,
    },
}

fn default_influence_cap() -> u32 {
    DEFAULT_INFLUENCE_CAP
}

impl Default for RateModel {
    fn default() -> Self {
        Self::Linear {
            k: DEFAULT_LINEAR_K,
            bias: DEFAULT_LINEAR_BIAS,
            influence_cap: DEFAULT_INFLUENCE_CAP,
        }
    }
}

impl RateModel {
    pub fn default_table() -> Self {
        Self::Table {
            rates: DEFAULT_TABLE_RATES.to_vec(),
        }
    }

    pub fn default_fixed() -> Self {
        Self::Fixed {
            rate: DEFAULT_FIXED_RATE,
            influence_cap: DEFAULT_INFLUENCE_CAP,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Linear { .. } => "linear",
            Self::Table { .. } => "table",
            Self::Fixed { .. } => "fixed",
        }
    }

    /// Maximum head count per side that still contributes to the advantage.
    pub fn influence_cap(&self) -> u32 {
        match self {
            Self::Linear { influence_cap, .. } | Self::Fixed { influence_cap, .. } => {
                *influence_cap
            }
            Self::Table { rates } => u32::try_from(rates.len()).unwrap_or(u32::MAX),
        }
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.influence_cap() == 0 {
            return Err(invalid("influence cap must be at least 1"));
        }
        match self {
            Self::Linear { k, bias, .. } => {
                if !k.is_finite() || *k <= 0.0 {
                    return Err(invalid(format!("k must be finite and positive, got {k}")));
                }
                if !bias.is_finite() || *bias >= 1.0 {
                    return Err(invalid(format!(
                        "bias must be finite and below 1 so a single-player advantage moves the point, got {bias}"
                    )));
                }
            }
            Self::Table { rates } => {
                for (index, rate) in rates.iter().enumerate() {
                    if !rate.is_finite() || *rate <= 0.0 {
                        return Err(invalid(format!(
                            "rates[{index}] must be finite and positive, got {rate}"
                        )));
                    }
                }
                if let Some(index) = rates.windows(2).position(|pair| pair[1] < pair[0]) {
                    return Err(invalid(format!(
                        "rates must be non-decreasing, rates[{}] < rates[{index}]",
                        index + 1
                    )));
                }
            }
            Self::Fixed { rate, .. } => {
                if !rate.is_finite() || *rate <= 0.0 {
                    return Err(invalid(format!(
                        "rate must be finite and positive, got {rate}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Clamped signed head-count difference, in `[-cap, cap]`.
    pub fn advantage(&self, defenders: u32, attackers: u32) -> i64 {
        let cap = self.influence_cap();
        i64::from(defenders.min(cap)) - i64::from(attackers.min(cap))
    }

    /// Signed capture speed in percent per second.
    pub fn capture_speed(&self, defenders: u32, attackers: u32) -> f32 {
        let advantage = self.advantage(defenders, attackers);
        if advantage == 0 {
            return 0.0;
        }
        let magnitude = self.rate_for_magnitude(advantage.unsigned_abs());
        if advantage > 0 {
            magnitude
        } else {
            -magnitude
        }
    }

    /// Fastest speed this model can produce.
    pub fn max_rate(&self) -> f32 {
        self.rate_for_magnitude(u64::from(self.influence_cap()))
    }

    fn rate_for_magnitude(&self, magnitude: u64) -> f32 {
        match self {
            Self::Linear { k, bias, .. } => k * (magnitude as f32 - bias),
            Self::Table { rates } => {
                let index = usize::try_from(magnitude)
                    .unwrap_or(usize::MAX)
                    .clamp(1, rates.len().max(1))
                    - 1;
                rates.get(index).copied().unwrap_or(0.0)
            }
            Self::Fixed { rate, .. } => *rate,
        }
    }
}

fn invalid(reason: impl Into<String>) -> CaptureError {
    CaptureError::InvalidRateModel {
        reason: reason.into(),
    }
}
