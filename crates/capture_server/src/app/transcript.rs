use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use capture_core::{CaptureSnapshot, HostMetricsSnapshot, LoggedEvent};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::atomic_io::write_bytes_atomic;

pub(crate) const TRANSCRIPT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub(crate) enum TranscriptError {
    #[error("failed to encode transcript: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write transcript '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TranscriptTotals {
    pub ticks: u64,
    pub captures: u64,
    pub neutralizations: u64,
    pub sampler_failures: u64,
}

impl From<HostMetricsSnapshot> for TranscriptTotals {
    fn from(metrics: HostMetricsSnapshot) -> Self {
        Self {
            ticks: metrics.ticks_total,
            captures: metrics.captures_total,
            neutralizations: metrics.neutralizations_total,
            sampler_failures: metrics.sampler_failures_total,
        }
    }
}

/// Everything needed to audit a finished match: the ordered transitions and
/// the final state of each zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MatchTranscript {
    pub transcript_version: u32,
    pub scenario: String,
    pub tick_rate: u32,
    pub totals: TranscriptTotals,
    pub events: Vec<LoggedEvent>,
    pub final_state: BTreeMap<String, CaptureSnapshot>,
}

impl MatchTranscript {
    pub(crate) fn to_json_bytes(&self) -> Result<Vec<u8>, TranscriptError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// SHA-256 of the encoded transcript. Identical inputs replay to the
    /// same digest.
    pub(crate) fn digest_hex(&self) -> Result<String, TranscriptError> {
        let bytes = self.to_json_bytes()?;
        Ok(to_hex_lower(&Sha256::digest(&bytes)))
    }

    pub(crate) fn write_to(&self, path: &Path) -> Result<String, TranscriptError> {
        let bytes = self.to_json_bytes()?;
        write_bytes_atomic(path, &bytes).map_err(|source| TranscriptError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(to_hex_lower(&Sha256::digest(&bytes)))
    }
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
