use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::{analysis::BandLevels, config::MappingConfig};

/// Visual control value eased toward a target once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactiveParameter {
    target: f32,
    current: f32,
}

impl ReactiveParameter {
    pub fn new(value: f32) -> Self {
        Self {
            target: value,
            current: value,
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// One exponential-moving-average step. Frame-rate coupled: no delta time.
    pub fn step(&mut self, smoothing: f32) -> f32 {
        self.current += (self.target - self.current) * smoothing;
        self.current
    }

    /// The only discontinuous change a parameter ever sees.
    pub fn reset(&mut self, value: f32) {
        self.target = value;
        self.current = value;
    }
}

/// Read-only values handed to the renderer after each update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameParameters {
    /// Uniform scale for the visual group on all three axes.
    pub reactive_scale: f32,
    pub bloom_intensity: f32,
    /// Accumulated group yaw in radians, wrapped to `[0, 2π)`.
    pub rotation_y: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
    /// Camera position; the camera always looks at the scene origin.
    pub camera: [f32; 3],
}

/// Turns band levels into smoothed visual parameters, and owns the ambient
/// animations that run regardless of audio.
#[derive(Debug, Clone)]
pub struct ParameterMapper {
    settings: MappingConfig,
    scale: ReactiveParameter,
    rotation_y: f32,
    pointer: [f32; 2],
    camera: [ReactiveParameter; 2],
}

impl Default for ParameterMapper {
    fn default() -> Self {
        Self::new(MappingConfig::default())
    }
}

impl ParameterMapper {
    pub fn new(settings: MappingConfig) -> Self {
        Self {
            scale: ReactiveParameter::new(settings.base_scale),
            rotation_y: 0.0,
            pointer: [0.0; 2],
            camera: [ReactiveParameter::new(0.0); 2],
            settings,
        }
    }

    pub fn settings(&self) -> &MappingConfig {
        &self.settings
    }

    /// Replaces every coefficient at once; takes effect on the next update.
    pub fn set_settings(&mut self, settings: MappingConfig) {
        self.settings = settings;
    }

    pub fn reactive_scale(&self) -> &ReactiveParameter {
        &self.scale
    }

    /// Runs one frame. `elapsed_seconds` is wall-clock time and only feeds the
    /// bloom breathing.
    pub fn update(&mut self, levels: &BandLevels, elapsed_seconds: f64) -> FrameParameters {
        let settings = &self.settings;
        let target = if settings.audio_reactivity_enabled {
            settings.base_scale
                + levels.kick * settings.kick_scale_factor
                + levels.snare * settings.snare_scale_factor
        } else {
            settings.base_scale
        };
        self.scale.set_target(target);
        let reactive_scale = self.scale.step(settings.scale_smoothing);

        if settings.animation_enabled {
            self.rotation_y = (self.rotation_y + settings.rotation_speed).rem_euclid(TAU);
        }

        if settings.mouse_control_enabled {
            for (axis, pointer) in self.camera.iter_mut().zip(self.pointer) {
                axis.set_target(pointer * settings.camera_range);
                axis.step(settings.camera_follow);
            }
        }

        FrameParameters {
            reactive_scale,
            bloom_intensity: self.bloom_intensity(elapsed_seconds),
            rotation_y: self.rotation_y,
            bloom_radius: self.settings.bloom_radius,
            bloom_threshold: self.settings.bloom_threshold,
            camera: self.camera_position(),
        }
    }

    pub fn camera_position(&self) -> [f32; 3] {
        [
            self.camera[0].current(),
            self.camera[1].current(),
            self.settings.camera_distance,
        ]
    }

    /// Pointer position normalised to `[-1, 1]` on both axes, y pointing up.
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        if let (Some(x), Some(y)) = (finite("pointer_x", x), finite("pointer_y", y)) {
            self.pointer = [x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0)];
        }
    }

    pub fn bloom_intensity(&self, elapsed_seconds: f64) -> f32 {
        let settings = &self.settings;
        if !settings.bloom_animation_enabled {
            return settings.base_bloom_strength;
        }
        let phase = elapsed_seconds * f64::from(settings.bloom_rate);
        settings.base_bloom_strength + phase.sin() as f32 * settings.bloom_amplitude
    }

    /// Snaps the reactive scale back to its base and clears the rotation.
    pub fn reset(&mut self) {
        self.scale.reset(self.settings.base_scale);
        self.rotation_y = 0.0;
        for axis in &mut self.camera {
            axis.reset(0.0);
        }
    }

    pub fn set_base_scale(&mut self, value: f32) {
        if let Some(value) = finite("base_scale", value) {
            self.settings.base_scale = value;
        }
    }

    pub fn set_kick_scale_factor(&mut self, value: f32) {
        if let Some(value) = finite("kick_scale_factor", value) {
            self.settings.kick_scale_factor = value;
        }
    }

    pub fn set_snare_scale_factor(&mut self, value: f32) {
        if let Some(value) = finite("snare_scale_factor", value) {
            self.settings.snare_scale_factor = value;
        }
    }

    pub fn set_scale_smoothing(&mut self, value: f32) {
        if let Some(value) = finite("scale_smoothing", value) {
            self.settings.scale_smoothing = value;
        }
    }

    pub fn set_base_bloom_strength(&mut self, value: f32) {
        if let Some(value) = finite("base_bloom_strength", value) {
            self.settings.base_bloom_strength = value;
        }
    }

    pub fn set_bloom_amplitude(&mut self, value: f32) {
        if let Some(value) = finite("bloom_amplitude", value) {
            self.settings.bloom_amplitude = value;
        }
    }

    pub fn set_bloom_rate(&mut self, value: f32) {
        if let Some(value) = finite("bloom_rate", value) {
            self.settings.bloom_rate = value;
        }
    }

    pub fn set_rotation_speed(&mut self, value: f32) {
        if let Some(value) = finite("rotation_speed", value) {
            self.settings.rotation_speed = value;
        }
    }

    pub fn set_bloom_radius(&mut self, value: f32) {
        if let Some(value) = finite("bloom_radius", value) {
            self.settings.bloom_radius = value;
        }
    }

    pub fn set_bloom_threshold(&mut self, value: f32) {
        if let Some(value) = finite("bloom_threshold", value) {
            self.settings.bloom_threshold = value;
        }
    }

    pub fn set_camera_follow(&mut self, value: f32) {
        if let Some(value) = finite("camera_follow", value) {
            self.settings.camera_follow = value;
        }
    }

    /// Turning mouse control off snaps the camera back to rest in front of
    /// the scene.
    pub fn set_mouse_control_enabled(&mut self, enabled: bool) {
        self.settings.mouse_control_enabled = enabled;
        if !enabled {
            for axis in &mut self.camera {
                axis.reset(0.0);
            }
        }
    }

    pub fn set_audio_reactivity_enabled(&mut self, enabled: bool) {
        self.settings.audio_reactivity_enabled = enabled;
    }

    pub fn set_bloom_animation_enabled(&mut self, enabled: bool) {
        self.settings.bloom_animation_enabled = enabled;
    }

    pub fn set_animation_enabled(&mut self, enabled: bool) {
        self.settings.animation_enabled = enabled;
    }
}

fn finite(name: &'static str, value: f32) -> Option<f32> {
    if value.is_finite() {
        Some(value)
    } else {
        tracing::debug!(name, value, "ignoring non-finite coefficient");
        None
    }
}
