use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{analysis::FrequencyBand, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub bands: BandConfig,
    pub mapping: MappingConfig,
    pub particles: ParticleConfig,
}

impl AppConfig {
    /// Reads a JSON document from disk. Missing sections and fields fall back
    /// to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Configuration specific to the playback and spectral subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub transform_size: usize,
    pub loop_enabled: bool,
    /// Temporal smoothing applied between consecutive spectrum snapshots.
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            transform_size: 1024,
            loop_enabled: true,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Frequency ranges analysed every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub kick: FrequencyBand,
    pub snare: FrequencyBand,
    /// Number of leading bins averaged into the bass level.
    pub bass_bins: usize,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            kick: FrequencyBand::KICK,
            snare: FrequencyBand::SNARE,
            bass_bins: 8,
        }
    }
}

/// Coefficients for the per-frame parameter mapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub base_scale: f32,
    pub kick_scale_factor: f32,
    pub snare_scale_factor: f32,
    pub scale_smoothing: f32,
    pub audio_reactivity_enabled: bool,
    pub base_bloom_strength: f32,
    pub bloom_amplitude: f32,
    /// Angular rate of the bloom breathing in radians per second.
    pub bloom_rate: f32,
    pub bloom_animation_enabled: bool,
    pub animation_enabled: bool,
    /// Group yaw added per displayed frame, in radians.
    pub rotation_speed: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
    /// Camera eases toward the pointer while enabled and rests at the origin
    /// otherwise.
    pub mouse_control_enabled: bool,
    /// Per-frame easing coefficient of the camera toward its pointer target.
    pub camera_follow: f32,
    /// Camera offset reached at the edge of the normalised pointer range.
    pub camera_range: f32,
    pub camera_distance: f32,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            base_scale: 1.0,
            kick_scale_factor: 0.5,
            snare_scale_factor: 0.3,
            scale_smoothing: 0.1,
            audio_reactivity_enabled: true,
            base_bloom_strength: 0.9,
            bloom_amplitude: 0.2,
            bloom_rate: 0.5,
            bloom_animation_enabled: true,
            animation_enabled: true,
            rotation_speed: 0.01,
            bloom_radius: 0.5,
            bloom_threshold: 0.0,
            mouse_control_enabled: true,
            camera_follow: 0.05,
            camera_range: 5.0,
            camera_distance: 5.0,
        }
    }
}

/// Settings forwarded to the particle collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    pub enabled: bool,
    pub wind_force: f32,
    pub particle_count: u32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            wind_force: 0.002,
            particle_count: 100,
        }
    }
}
