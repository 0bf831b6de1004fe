//! Configuration management for runtime parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! so thresholds for pitch detection, note stabilisation and the rhythm
//! trainer's tempo ramp can be adjusted without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::trainer::pattern::ComplexityMode;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pitch: PitchDetectionConfig,
    #[serde(default)]
    pub stabilizer: StabilizerConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub audio: AudioConfig,
}

/// Autocorrelation pitch detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchDetectionConfig {
    /// Analysis frame length in samples (power of two)
    pub frame_size: usize,
    /// RMS below which a frame is treated as silence
    pub silence_rms: f32,
    /// Lowest frequency accepted as a plausible instrument pitch
    pub min_frequency_hz: f32,
    /// Highest frequency accepted as a plausible instrument pitch
    pub max_frequency_hz: f32,
}

impl Default for PitchDetectionConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            // Tuned low: a missed quiet note is worse than an occasional noise frame
            silence_rms: 0.005,
            min_frequency_hz: 20.0,
            max_frequency_hz: 4000.0,
        }
    }
}

/// Note stream debounce parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Frequency drift (Hz) that re-emits a held note
    pub drift_tolerance_hz: f32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            drift_tolerance_hz: 1.0,
        }
    }
}

/// Rhythm trainer parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Tempo when training begins
    pub start_bpm: f32,
    /// Tempo ceiling for the ramp
    pub target_bpm: f32,
    /// BPM added on each level up
    pub bpm_increment: f32,
    /// Full verified cycles needed before training starts
    pub confirmations_required: u32,
    /// Notes kept in the rolling learning history
    pub history_capacity: usize,
    /// Accepted |offset| as a fraction of the beat period
    pub tolerance_fraction: f32,
    /// |offset| fraction classified as perfect
    pub perfect_fraction: f32,
    /// |offset| fraction classified as good
    pub good_fraction: f32,
    /// Streak increments between level ups
    pub level_up_every: u32,
    /// Beats per bar reported by the clock
    pub beats_per_bar: u32,
    /// Pattern length range used while learning
    pub complexity: ComplexityMode,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            start_bpm: 80.0,
            target_bpm: 140.0,
            bpm_increment: 5.0,
            confirmations_required: 5,
            history_capacity: 20,
            tolerance_fraction: 0.40,
            perfect_fraction: 0.05,
            good_fraction: 0.15,
            level_up_every: 3,
            beats_per_bar: 4,
            complexity: ComplexityMode::Balanced,
        }
    }
}

/// Audio transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Number of frame buffers in flight between capture and analysis
    pub buffer_pool_size: usize,
    /// Expected capture sample rate in Hz
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 16,
            sample_rate: 44100,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file is missing or
    /// the JSON is invalid (a warning is logged in both cases).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/riff_config.json")
    }
}
