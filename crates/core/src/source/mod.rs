//! Contracts for the decoder and spectral-transform collaborators, together
//! with reference implementations used by the headless host.

use std::{f32::consts::PI, fmt, io::Cursor, sync::Arc};

use hound::{SampleFormat, WavReader};
use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{
    audio::{Playhead, SampleBuffer},
    config::AudioConfig,
    DecodeError, Result, VizError,
};

/// Output of a successful decode.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub buffer: SampleBuffer,
    pub duration_seconds: f64,
}

/// Turns raw file bytes into a seekable sample buffer.
pub trait Decoder {
    fn decode(&self, raw: &[u8]) -> std::result::Result<DecodedAudio, DecodeError>;
}

/// Decoder for RIFF/WAVE input (integer PCM up to 32 bits and 32-bit float).
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl Decoder for WavDecoder {
    fn decode(&self, raw: &[u8]) -> std::result::Result<DecodedAudio, DecodeError> {
        let mut reader = WavReader::new(Cursor::new(raw))?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => {
                if spec.bits_per_sample != 32 {
                    return Err(DecodeError::Unsupported(format!(
                        "{}-bit float",
                        spec.bits_per_sample
                    )));
                }
                reader.samples::<f32>().collect::<std::result::Result<Vec<f32>, _>>()?
            }
            SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(DecodeError::Unsupported(format!(
                        "{}-bit integer",
                        spec.bits_per_sample
                    )));
                }
                let scale = 1.0 / (1_u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| value as f32 * scale))
                    .collect::<std::result::Result<Vec<f32>, _>>()?
            }
        };

        if samples.is_empty() || spec.channels == 0 {
            return Err(DecodeError::Empty);
        }

        let buffer = SampleBuffer::new(samples, spec.channels, spec.sample_rate);
        let duration_seconds = buffer.duration_seconds();
        tracing::debug!(
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            duration_seconds,
            "decoded wav stream"
        );
        Ok(DecodedAudio {
            buffer,
            duration_seconds,
        })
    }
}

/// Magnitude bins for one frame along with the transform that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectrumSnapshot<'a> {
    /// `transform_size / 2` bins scaled to `0..=255`.
    pub bins: &'a [u8],
    pub sample_rate: u32,
    pub transform_size: usize,
}

/// Supplies the magnitude snapshot for the current frame.
pub trait SpectrumSource {
    fn sample_rate(&self) -> u32;
    fn transform_size(&self) -> usize;
    /// Refreshes and returns the snapshot. `None` means nothing is playing.
    fn current_snapshot(&mut self, playhead: Option<Playhead<'_>>) -> SpectrumSnapshot<'_>;
}

/// Snapshot provided by the host as-is, for hosts whose audio stack already
/// exposes byte magnitudes.
#[derive(Debug, Clone)]
pub struct ExternalSpectrum {
    sample_rate: u32,
    transform_size: usize,
    bins: Vec<u8>,
}

impl ExternalSpectrum {
    pub fn new(sample_rate: u32, transform_size: usize) -> Self {
        Self {
            sample_rate,
            transform_size,
            bins: vec![0; transform_size / 2],
        }
    }

    /// Copies `bins` into the snapshot; extra values are dropped and missing
    /// ones read as zero.
    pub fn set_bins(&mut self, bins: &[u8]) {
        let len = self.bins.len().min(bins.len());
        self.bins.fill(0);
        self.bins[..len].copy_from_slice(&bins[..len]);
    }
}

impl SpectrumSource for ExternalSpectrum {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn transform_size(&self) -> usize {
        self.transform_size
    }

    fn current_snapshot(&mut self, _playhead: Option<Playhead<'_>>) -> SpectrumSnapshot<'_> {
        SpectrumSnapshot {
            bins: &self.bins,
            sample_rate: self.sample_rate,
            transform_size: self.transform_size,
        }
    }
}

/// Analyser over the playing buffer: Blackman-windowed real FFT of the most
/// recent `transform_size` mono samples, smoothed over time and mapped from
/// the decibel range onto bytes.
pub struct FftSpectrumSource {
    sample_rate: u32,
    transform_size: usize,
    smoothing_time_constant: f32,
    min_decibels: f32,
    max_decibels: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
    snapshot: Vec<u8>,
}

impl FftSpectrumSource {
    /// Builds an analyser. The sample rate follows whatever buffer is playing;
    /// `sample_rate` only applies until the first playhead is seen.
    pub fn new(sample_rate: u32, config: &AudioConfig) -> Result<Self> {
        let size = config.transform_size;
        if size < 2 || size % 2 != 0 {
            return Err(VizError::msg(format!(
                "transform size must be an even number of at least 2, got {size}"
            )));
        }
        if config.min_decibels >= config.max_decibels {
            return Err(VizError::msg("min_decibels must be below max_decibels"));
        }

        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let bins = size / 2;
        Ok(Self {
            sample_rate,
            transform_size: size,
            smoothing_time_constant: config.smoothing_time_constant.clamp(0.0, 1.0),
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            window: (0..size).map(|index| blackman_value(index, size)).collect(),
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
            smoothed: vec![0.0; bins],
            snapshot: vec![0; bins],
        })
    }

    fn refresh(&mut self, playhead: Option<Playhead<'_>>) {
        match playhead {
            Some(playhead) => {
                self.sample_rate = playhead.buffer.sample_rate();
                playhead
                    .buffer
                    .fill_mono_window(playhead.frame_index(), &mut self.input);
                for (sample, weight) in self.input.iter_mut().zip(&self.window) {
                    *sample *= weight;
                }
            }
            None => self.input.fill(0.0),
        }

        if let Err(err) =
            self.plan
                .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
        {
            tracing::warn!(%err, "spectral transform failed, keeping previous snapshot");
            return;
        }

        let size = self.transform_size as f32;
        let tau = self.smoothing_time_constant;
        let range = self.max_decibels - self.min_decibels;
        for ((bin, smoothed), byte) in self
            .spectrum
            .iter()
            .zip(self.smoothed.iter_mut())
            .zip(self.snapshot.iter_mut())
        {
            *smoothed = tau * *smoothed + (1.0 - tau) * bin.norm() / size;
            if !smoothed.is_finite() {
                // Non-finite input resets the bin.
                *smoothed = 0.0;
            }
            let decibels = 20.0 * smoothed.log10();
            let scaled = (MAX_BYTE / range * (decibels - self.min_decibels)).floor();
            // -inf for silent bins clamps to zero.
            *byte = scaled.clamp(0.0, MAX_BYTE) as u8;
        }
    }
}

const MAX_BYTE: f32 = 255.0;

impl SpectrumSource for FftSpectrumSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn transform_size(&self) -> usize {
        self.transform_size
    }

    fn current_snapshot(&mut self, playhead: Option<Playhead<'_>>) -> SpectrumSnapshot<'_> {
        self.refresh(playhead);
        SpectrumSnapshot {
            bins: &self.snapshot,
            sample_rate: self.sample_rate,
            transform_size: self.transform_size,
        }
    }
}

impl fmt::Debug for FftSpectrumSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftSpectrumSource")
            .field("sample_rate", &self.sample_rate)
            .field("transform_size", &self.transform_size)
            .field("smoothing_time_constant", &self.smoothing_time_constant)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}
