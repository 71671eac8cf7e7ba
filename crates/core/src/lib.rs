//! Core library for the Sonic Geometry installation.
//!
//! The crate holds the audio-reactive core: a playback state machine anchored
//! to a free-running clock, a stateless reduction of magnitude spectra into
//! named band levels, and a per-frame mapper that eases those levels into the
//! scale, bloom and rotation values handed to the renderer. Rendering,
//! geometry and the particle simulation stay behind the sink traits in
//! [`render`].

pub mod analysis;
pub mod audio;
pub mod config;
pub mod control;
pub mod error;
pub mod mapping;
pub mod render;
pub mod source;
pub mod timeline;
pub mod visualizer;

pub use analysis::{BandAnalyzer, BandLevels, FrequencyBand};
pub use audio::{PlaybackEngine, PlaybackState, Playhead, SampleBuffer};
pub use config::{AppConfig, AudioConfig, BandConfig, MappingConfig, ParticleConfig};
pub use control::{format_time, PlaybackDisplay};
pub use error::{DecodeError, LoadError, Result, VizError};
pub use mapping::{FrameParameters, ParameterMapper, ReactiveParameter};
pub use render::{ParticleSink, RenderSink, SceneState};
pub use source::{
    DecodedAudio, Decoder, ExternalSpectrum, FftSpectrumSource, SpectrumSnapshot, SpectrumSource,
    WavDecoder,
};
pub use timeline::{Clock, FixedStepDriver, FrameDriver, FrameTick, ManualClock, SystemClock};
pub use visualizer::Visualizer;
