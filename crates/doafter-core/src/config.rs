//! Scheduler configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```
//! use doafter_core::config::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_json_str(r#"{ "movement_threshold": 0.25 }"#).unwrap();
//! assert_eq!(config.movement_threshold, 0.25);
//! assert!(config.emit_events);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DoAfterError, DoAfterResult};

/// Tunables shared by every deferred action the scheduler runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Distance an actor or target may drift before it counts as moved.
    /// Changing grids always counts.
    pub movement_threshold: f32,
    /// Range limit applied to targeted actions that don't set their own.
    pub default_distance_threshold: Option<f32>,
    /// Record terminal outcomes in the drainable event queue.
    pub emit_events: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 0.0,
            default_distance_threshold: None,
            emit_events: true,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(json: &str) -> DoAfterResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> DoAfterResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> DoAfterResult<()> {
        if !self.movement_threshold.is_finite() || self.movement_threshold < 0.0 {
            return Err(DoAfterError::config(format!(
                "movement_threshold must be finite and >= 0, got {}",
                self.movement_threshold
            )));
        }
        if let Some(range) = self.default_distance_threshold {
            if !range.is_finite() || range < 0.0 {
                return Err(DoAfterError::config(format!(
                    "default_distance_threshold must be finite and >= 0, got {}",
                    range
                )));
            }
        }
        Ok(())
    }
}
