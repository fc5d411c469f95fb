//! Reconstruction settings chosen by the user

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Upper bound on requested candidates per reconstruction
pub const MAX_CANDIDATE_COUNT: u32 = 20;

/// Upper bound on generation temperature
pub const MAX_TEMPERATURE: f64 = 2.0;

/// How aggressively the backend may rewrite damaged regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconstructionMode {
    Soft,
    #[default]
    Hard,
    Adaptive,
}

impl std::fmt::Display for ReconstructionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconstructionMode::Soft => write!(f, "soft"),
            ReconstructionMode::Hard => write!(f, "hard"),
            ReconstructionMode::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// Settings read when building a reconstruction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub mode: ReconstructionMode,
    #[serde(default = "default_candidate_count")]
    pub candidate_count: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_candidate_count() -> u32 {
    5
}

fn default_temperature() -> f64 {
    0.3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: ReconstructionMode::default(),
            candidate_count: default_candidate_count(),
            temperature: default_temperature(),
        }
    }
}

impl Settings {
    /// Check ranges before the settings are accepted into the store
    pub fn validate(&self) -> Result<()> {
        if self.candidate_count == 0 || self.candidate_count > MAX_CANDIDATE_COUNT {
            return Err(SessionError::InvalidSettings {
                message: format!(
                    "candidate_count must be between 1 and {}, got {}",
                    MAX_CANDIDATE_COUNT, self.candidate_count
                ),
            });
        }
        if !self.temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(SessionError::InvalidSettings {
                message: format!(
                    "temperature must be between 0.0 and {}, got {}",
                    MAX_TEMPERATURE, self.temperature
                ),
            });
        }
        Ok(())
    }
}
