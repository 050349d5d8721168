//! Simulation settings
//!
//! Tunables for physics and timing. Loaded from JSON (every field optional),
//! and overridable per level.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

/// Errors that can occur while loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// Settings JSON is malformed
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Physics and timing configuration for one scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    // === Physics ===
    /// Gravity magnitude (pixels/s²)
    pub gravity: f32,
    /// Verlet velocity retention per step
    pub damping: f32,
    /// Constraint relaxation passes per rope update
    pub relaxation_iterations: u32,
    /// Multiplier applied to delta for rope updates
    pub rope_physics_speed: f32,
    /// Seconds from cut to rope removal
    pub cut_disappear_timeout: f32,

    // === Bounds ===
    /// How far above the map the candy may float before it is lost
    pub offscreen_top_margin: f32,
    /// How far below the map the candy may fall before it is lost
    pub offscreen_bottom_margin: f32,

    // === Timing ===
    /// Delay between the last candy loss and the lose sequence
    pub lose_delay: f32,
    /// Delay between the win animation and the outcome report
    pub win_outcome_delay: f32,
    /// Delay between the lose animation and the outcome report
    pub lose_outcome_delay: f32,
    /// Delay between entering a sock and leaving its pair
    pub sock_teleport_delay: f32,
    /// Seconds for two candy halves to close the gap once touching
    pub merge_duration: f32,
    /// Lose if the candy stays rope-free this long (disabled when `None`)
    pub rope_free_timeout: Option<f32>,

    // === Target ===
    /// Distance at which the mouth opens
    pub mouth_open_radius: f32,
    /// Seconds the mouth stays open after the candy leaves the radius
    pub mouth_close_delay: f32,

    // === Input ===
    /// Tap-to-cut assist instead of swipe cutting
    pub click_to_cut: bool,

    // === Audio ===
    /// Master volume (0.0 - 1.0)
    pub master_volume: f32,
    /// Sound effects volume (0.0 - 1.0)
    pub sfx_volume: f32,
    /// Mute all sounds
    pub muted: bool,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            damping: DAMPING,
            relaxation_iterations: ROPE_RELAXATION_ITERATIONS,
            rope_physics_speed: 1.0,
            cut_disappear_timeout: CUT_DISAPPEAR_TIMEOUT,

            offscreen_top_margin: 400.0,
            offscreen_bottom_margin: 100.0,

            lose_delay: 0.3,
            win_outcome_delay: 2.0,
            lose_outcome_delay: 1.0,
            sock_teleport_delay: 0.1,
            merge_duration: 0.5,
            rope_free_timeout: None,

            mouth_open_radius: 200.0,
            mouth_close_delay: 1.0,

            click_to_cut: false,

            master_volume: 0.8,
            sfx_volume: 1.0,
            muted: false,
        }
    }
}

impl SimSettings {
    /// Parse settings from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Effective sound volume (respects mute)
    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            (self.master_volume * self.sfx_volume).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = SimSettings::from_json(r#"{ "gravity": 500.0, "click_to_cut": true }"#)
            .unwrap();
        assert_eq!(settings.gravity, 500.0);
        assert!(settings.click_to_cut);
        assert_eq!(settings.lose_delay, 0.3);
        assert_eq!(settings.relaxation_iterations, ROPE_RELAXATION_ITERATIONS);
    }

    #[test]
    fn test_malformed_json() {
        let err = SimSettings::from_json("{ gravity: }").unwrap_err();
        assert!(format!("{err}").starts_with("failed to parse settings"));
    }

    #[test]
    fn test_effective_volume() {
        let mut settings = SimSettings::default();
        assert!((settings.effective_volume() - 0.8).abs() < 0.001);
        settings.muted = true;
        assert_eq!(settings.effective_volume(), 0.0);
    }
}
