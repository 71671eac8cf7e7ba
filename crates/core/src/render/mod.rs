use crate::{config::ParticleConfig, mapping::FrameParameters};

/// Renderer collaborator driven once per frame.
pub trait RenderSink {
    /// Uniform scale applied to the visual group on all three axes.
    fn set_group_scale(&mut self, scale: f32);
    fn set_bloom_strength(&mut self, strength: f32);
    fn set_group_rotation(&mut self, yaw: f32);
    fn set_bloom_radius(&mut self, radius: f32);
    fn set_bloom_threshold(&mut self, threshold: f32);
    /// Moves the camera; it keeps looking at the scene origin.
    fn set_camera_position(&mut self, position: [f32; 3]);

    fn apply(&mut self, params: &FrameParameters) {
        self.set_group_scale(params.reactive_scale);
        self.set_bloom_strength(params.bloom_intensity);
        self.set_group_rotation(params.rotation_y);
        self.set_bloom_radius(params.bloom_radius);
        self.set_bloom_threshold(params.bloom_threshold);
        self.set_camera_position(params.camera);
    }
}

/// Particle simulation collaborator. Only ever used as a sink.
pub trait ParticleSink {
    fn set_visible(&mut self, visible: bool);
    fn set_wind_force(&mut self, force: f32);
    fn set_particle_count(&mut self, count: u32);
    /// Advances the simulation by one frame.
    fn step(&mut self);

    fn configure(&mut self, config: &ParticleConfig) {
        self.set_visible(config.enabled);
        self.set_wind_force(config.wind_force);
        self.set_particle_count(config.particle_count);
    }
}

/// In-memory render target that keeps the most recent values. Used by the
/// headless host and as a stand-in renderer in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneState {
    pub scale: [f32; 3],
    pub bloom_strength: f32,
    pub rotation_y: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
    pub camera: [f32; 3],
    pub frames_applied: u64,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            scale: [1.0; 3],
            bloom_strength: 0.0,
            rotation_y: 0.0,
            bloom_radius: 0.0,
            bloom_threshold: 0.0,
            camera: [0.0, 0.0, 5.0],
            frames_applied: 0,
        }
    }
}

impl SceneState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderSink for SceneState {
    fn set_group_scale(&mut self, scale: f32) {
        self.scale = [scale; 3];
    }

    fn set_bloom_strength(&mut self, strength: f32) {
        self.bloom_strength = strength;
    }

    fn set_group_rotation(&mut self, yaw: f32) {
        self.rotation_y = yaw;
    }

    fn set_bloom_radius(&mut self, radius: f32) {
        self.bloom_radius = radius;
    }

    fn set_bloom_threshold(&mut self, threshold: f32) {
        self.bloom_threshold = threshold;
    }

    fn set_camera_position(&mut self, position: [f32; 3]) {
        self.camera = position;
    }

    fn apply(&mut self, params: &FrameParameters) {
        self.set_group_scale(params.reactive_scale);
        self.set_bloom_strength(params.bloom_intensity);
        self.set_group_rotation(params.rotation_y);
        self.set_bloom_radius(params.bloom_radius);
        self.set_bloom_threshold(params.bloom_threshold);
        self.set_camera_position(params.camera);
        self.frames_applied += 1;
    }
}
