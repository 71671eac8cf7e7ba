//! Per-frame pipeline: playback, band analysis and parameter mapping driven
//! from a single cooperative frame callback.

use std::fmt;

use crate::{
    analysis::{BandAnalyzer, BandLevels},
    audio::{PlaybackEngine, SampleBuffer},
    config::{AppConfig, ParticleConfig},
    control::{percent_to_seconds, PlaybackDisplay},
    mapping::{FrameParameters, ParameterMapper},
    render::{ParticleSink, RenderSink},
    source::{Decoder, SpectrumSource},
    timeline::Clock,
    LoadError, Result,
};

type BoxedParticles = Box<dyn ParticleSink + Send>;

pub struct Visualizer<C, S> {
    playback: PlaybackEngine<C>,
    spectrum: S,
    analyzer: BandAnalyzer,
    mapper: ParameterMapper,
    particles: Option<BoxedParticles>,
    particle_config: ParticleConfig,
    last_levels: BandLevels,
}

impl<C: Clock, S: SpectrumSource> Visualizer<C, S> {
    pub fn new(clock: C, spectrum: S, config: &AppConfig) -> Self {
        Self {
            playback: PlaybackEngine::with_loop(clock, config.audio.loop_enabled),
            spectrum,
            analyzer: BandAnalyzer::from_config(&config.bands),
            mapper: ParameterMapper::new(config.mapping.clone()),
            particles: None,
            particle_config: config.particles.clone(),
            last_levels: BandLevels::silent(),
        }
    }

    /// Decodes `raw` and makes it the active buffer. Decode failures are
    /// reported as load errors and leave the current playback untouched.
    pub fn load(&mut self, decoder: &dyn Decoder, raw: &[u8]) -> Result<()> {
        let decoded = decoder.decode(raw).map_err(|err| {
            tracing::warn!(%err, bytes = raw.len(), "rejected audio input");
            LoadError::from(err)
        })?;
        self.load_buffer(decoded.buffer, decoded.duration_seconds)
    }

    pub fn load_buffer(&mut self, buffer: SampleBuffer, duration_seconds: f64) -> Result<()> {
        self.playback.load(buffer, duration_seconds).map_err(|err| {
            tracing::warn!(%err, "rejected sample buffer");
            err
        })?;
        Ok(())
    }

    /// Runs one frame and pushes the resulting parameters into `renderer`.
    ///
    /// Band levels read as silence whenever the engine is not playing, even
    /// on the frame where the track ends.
    pub fn frame<R: RenderSink + ?Sized>(&mut self, renderer: &mut R) -> FrameParameters {
        let now = self.playback.clock().now();
        self.playback.advance(now);

        let playhead = self.playback.playhead();
        let playing = playhead.is_some();
        let snapshot = self.spectrum.current_snapshot(playhead);
        let levels = if playing {
            self.analyzer
                .levels(snapshot.bins, snapshot.sample_rate, snapshot.transform_size)
        } else {
            BandLevels::silent()
        };

        let params = self.mapper.update(&levels, now);
        renderer.apply(&params);

        if self.particle_config.enabled {
            if let Some(particles) = self.particles.as_mut() {
                particles.step();
            }
        }

        self.last_levels = levels;
        params
    }

    /// Play/pause button: pauses while playing, otherwise plays. Does nothing
    /// until a buffer has been loaded.
    pub fn toggle_play_pause(&mut self) {
        if !self.playback.has_buffer() {
            return;
        }
        if self.playback.is_playing() {
            self.playback.pause();
        } else {
            self.playback.play();
        }
    }

    /// Seekbar input, `0..=100` percent of the track.
    pub fn seek_to_percent(&mut self, percent: f64) {
        let target = percent_to_seconds(percent, self.playback.duration_seconds());
        self.playback.seek(target);
    }

    pub fn display(&self) -> PlaybackDisplay {
        PlaybackDisplay::new(
            self.playback.is_playing(),
            self.playback.current_position(),
            self.playback.duration_seconds(),
        )
    }

    /// Attaches the particle collaborator and pushes the current settings.
    pub fn set_particle_system(&mut self, mut particles: BoxedParticles) {
        particles.configure(&self.particle_config);
        self.particles = Some(particles);
    }

    pub fn set_particles_enabled(&mut self, enabled: bool) {
        self.particle_config.enabled = enabled;
        if let Some(particles) = self.particles.as_mut() {
            particles.set_visible(enabled);
        }
    }

    pub fn set_wind_force(&mut self, force: f32) {
        self.particle_config.wind_force = force;
        if let Some(particles) = self.particles.as_mut() {
            particles.set_wind_force(force);
        }
    }

    pub fn set_particle_count(&mut self, count: u32) {
        self.particle_config.particle_count = count;
        if let Some(particles) = self.particles.as_mut() {
            particles.set_particle_count(count);
        }
    }

    pub fn set_on_playback_ended(&mut self, handler: impl FnMut() + Send + 'static) {
        self.playback.set_on_playback_ended(handler);
    }

    pub fn playback(&self) -> &PlaybackEngine<C> {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackEngine<C> {
        &mut self.playback
    }

    pub fn mapper(&self) -> &ParameterMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut ParameterMapper {
        &mut self.mapper
    }

    pub fn analyzer(&self) -> &BandAnalyzer {
        &self.analyzer
    }

    pub fn spectrum(&self) -> &S {
        &self.spectrum
    }

    pub fn spectrum_mut(&mut self) -> &mut S {
        &mut self.spectrum
    }

    pub fn particle_config(&self) -> &ParticleConfig {
        &self.particle_config
    }

    /// Levels computed by the most recent frame.
    pub fn last_levels(&self) -> BandLevels {
        self.last_levels
    }
}

impl<C: fmt::Debug, S: fmt::Debug> fmt::Debug for Visualizer<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Visualizer")
            .field("playback", &self.playback)
            .field("spectrum", &self.spectrum)
            .field("analyzer", &self.analyzer)
            .field("mapper", &self.mapper)
            .field("particles", &self.particles.is_some())
            .field("particle_config", &self.particle_config)
            .field("last_levels", &self.last_levels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use hound::{SampleFormat, WavSpec, WavWriter};

    use super::*;
    use crate::{
        audio::PlaybackState,
        render::SceneState,
        source::{ExternalSpectrum, WavDecoder},
        timeline::ManualClock,
        VizError,
    };

    const RATE: u32 = 44_100;
    const SIZE: usize = 1024;

    fn visualizer(config: &AppConfig) -> (Visualizer<ManualClock, ExternalSpectrum>, ManualClock) {
        let clock = ManualClock::new(10.0);
        let visualizer = Visualizer::new(clock.clone(), ExternalSpectrum::new(RATE, SIZE), config);
        (visualizer, clock)
    }

    fn ten_second_buffer() -> SampleBuffer {
        SampleBuffer::new(vec![0.0_f32; 1_000], 1, 100)
    }

    fn wav_bytes(seconds: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 1_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            for _ in 0..seconds * 1_000 {
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    #[derive(Default)]
    struct RecordingParticles {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl ParticleSink for RecordingParticles {
        fn set_visible(&mut self, visible: bool) {
            self.events.lock().unwrap().push(format!("visible:{visible}"));
        }

        fn set_wind_force(&mut self, force: f32) {
            self.events.lock().unwrap().push(format!("wind:{force}"));
        }

        fn set_particle_count(&mut self, count: u32) {
            self.events.lock().unwrap().push(format!("count:{count}"));
        }

        fn step(&mut self) {
            self.events.lock().unwrap().push("step".to_string());
        }
    }

    #[test]
    fn loops_past_end_of_track() {
        let (mut viz, clock) = visualizer(&AppConfig::default());
        viz.load_buffer(ten_second_buffer(), 10.0).unwrap();
        viz.playback_mut().play();

        clock.advance(12.0);
        let mut scene = SceneState::new();
        viz.frame(&mut scene);

        assert!((viz.playback().current_position() - 2.0).abs() < 1e-9);
        assert_eq!(viz.playback().state(), PlaybackState::Playing);
        assert_eq!(scene.frames_applied, 1);
    }

    #[test]
    fn loud_kick_raises_scale() {
        let (mut viz, clock) = visualizer(&AppConfig::default());
        viz.load_buffer(ten_second_buffer(), 10.0).unwrap();
        viz.spectrum_mut().set_bins(&[255; 4]);

        let mut scene = SceneState::new();
        clock.advance(0.016);
        let params = viz.frame(&mut scene);

        assert_eq!(viz.last_levels().kick, 1.0);
        assert!((params.reactive_scale - 1.05).abs() < 1e-6);
        assert_eq!(scene.scale, [params.reactive_scale; 3]);
        assert_eq!(scene.bloom_strength, params.bloom_intensity);
    }

    #[test]
    fn camera_follows_pointer_into_scene() {
        let (mut viz, clock) = visualizer(&AppConfig::default());
        viz.mapper_mut().set_pointer(1.0, 0.0);

        let mut scene = SceneState::new();
        clock.advance(0.016);
        let params = viz.frame(&mut scene);

        assert!((scene.camera[0] - 0.25).abs() < 1e-6);
        assert_eq!(scene.camera, params.camera);
        assert_eq!(scene.bloom_radius, 0.5);
        assert_eq!(scene.bloom_threshold, 0.0);

        viz.mapper_mut().set_mouse_control_enabled(false);
        viz.frame(&mut scene);
        assert_eq!(scene.camera, [0.0, 0.0, 5.0]);
    }

    #[test]
    fn levels_are_silent_while_paused() {
        let (mut viz, clock) = visualizer(&AppConfig::default());
        viz.load_buffer(ten_second_buffer(), 10.0).unwrap();
        viz.spectrum_mut().set_bins(&[255; 512]);
        viz.toggle_play_pause();
        assert_eq!(viz.playback().state(), PlaybackState::Paused);

        clock.advance(0.5);
        let params = viz.frame(&mut SceneState::new());
        assert_eq!(viz.last_levels(), BandLevels::silent());
        assert_eq!(params.reactive_scale, 1.0);

        viz.toggle_play_pause();
        assert!(viz.playback().is_playing());
    }

    #[test]
    fn end_of_track_reaches_subscriber_within_frame() {
        let mut config = AppConfig::default();
        config.audio.loop_enabled = false;
        let (mut viz, clock) = visualizer(&config);
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        viz.set_on_playback_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        viz.load(&WavDecoder, &wav_bytes(2)).unwrap();
        viz.spectrum_mut().set_bins(&[255; 512]);

        clock.advance(2.5);
        let mut scene = SceneState::new();
        viz.frame(&mut scene);
        viz.frame(&mut scene);

        assert_eq!(ended.load(Ordering::SeqCst), 1);
        assert_eq!(viz.playback().state(), PlaybackState::Stopped);
        assert_eq!(viz.last_levels(), BandLevels::silent());
        assert_eq!(viz.display().label, "0:02 / 0:02");
    }

    #[test]
    fn failed_decode_keeps_current_playback() {
        let (mut viz, clock) = visualizer(&AppConfig::default());
        viz.load(&WavDecoder, &wav_bytes(3)).unwrap();
        clock.advance(1.0);
        viz.frame(&mut SceneState::new());

        let err = viz.load(&WavDecoder, b"garbage").unwrap_err();
        assert!(matches!(err, VizError::Load(LoadError::Decode(_))));
        assert!(viz.playback().is_playing());
        assert_eq!(viz.playback().duration_seconds(), 3.0);
        assert!((viz.playback().current_position() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn seekbar_and_display_follow_position() {
        let (mut viz, clock) = visualizer(&AppConfig::default());
        viz.load_buffer(SampleBuffer::new(vec![0.0_f32; 12_000], 1, 100), 120.0)
            .unwrap();

        viz.seek_to_percent(50.0);
        clock.advance(1.0);
        viz.frame(&mut SceneState::new());

        let display = viz.display();
        assert!(display.is_playing);
        assert_eq!(display.label, "1:01 / 2:00");
        assert!((display.percent - 61.0 / 1.2).abs() < 1e-6);
    }

    #[test]
    fn toggle_without_buffer_is_ignored() {
        let (mut viz, _) = visualizer(&AppConfig::default());
        viz.toggle_play_pause();
        assert_eq!(viz.playback().state(), PlaybackState::Stopped);
    }

    #[test]
    fn particle_sink_receives_settings_and_steps() {
        let (mut viz, _) = visualizer(&AppConfig::default());
        let particles = RecordingParticles::default();
        let events = particles.events.clone();
        viz.set_particle_system(Box::new(particles));

        viz.frame(&mut SceneState::new());
        viz.set_particles_enabled(true);
        viz.set_particle_count(150);
        viz.frame(&mut SceneState::new());

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "visible:false".to_string(),
                "wind:0.002".to_string(),
                "count:100".to_string(),
                "visible:true".to_string(),
                "count:150".to_string(),
                "step".to_string(),
            ]
        );
    }
}
