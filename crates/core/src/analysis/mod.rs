use serde::{Deserialize, Serialize};

use crate::config::BandConfig;

/// Largest value an 8-bit magnitude bin can hold.
pub const MAX_MAGNITUDE: f32 = 255.0;

/// Contiguous frequency range analysed as one signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl FrequencyBand {
    pub const KICK: Self = Self::new(20.0, 160.0);
    pub const SNARE: Self = Self::new(400.0, 2500.0);

    pub const fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }
}

/// Normalised band levels for a single frame, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandLevels {
    pub bass: f32,
    pub kick: f32,
    pub snare: f32,
}

impl BandLevels {
    pub fn silent() -> Self {
        Self::default()
    }
}

/// Inclusive span of snapshot bins covered by a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BinSpan {
    pub start: usize,
    pub end: usize,
}

/// Converts a frequency to the index of the bin that contains it.
pub fn bin_index(hz: f32, sample_rate: u32, transform_size: usize) -> usize {
    if sample_rate == 0 {
        return 0;
    }
    let bin = (f64::from(hz) * transform_size as f64 / f64::from(sample_rate)).floor();
    // Negative and NaN inputs saturate to zero.
    bin as usize
}

/// Resolves `band` to bin indices, both clamped to the snapshot length.
pub fn bin_span(band: FrequencyBand, sample_rate: u32, transform_size: usize, bins: usize) -> BinSpan {
    let last = bins.saturating_sub(1);
    BinSpan {
        start: bin_index(band.low_hz, sample_rate, transform_size).min(last),
        end: bin_index(band.high_hz, sample_rate, transform_size).min(last),
    }
}

/// Average magnitude of `band` in `snapshot`, normalised to `[0, 1]`.
///
/// An inverted span (start past end) reads the single bin at `start`. An
/// empty snapshot reads as silence.
pub fn band_level(snapshot: &[u8], sample_rate: u32, transform_size: usize, band: FrequencyBand) -> f32 {
    if snapshot.is_empty() {
        return 0.0;
    }
    let span = bin_span(band, sample_rate, transform_size, snapshot.len());
    if span.start > span.end {
        return f32::from(snapshot[span.start]) / MAX_MAGNITUDE;
    }
    average(&snapshot[span.start..=span.end])
}

fn average(bins: &[u8]) -> f32 {
    let sum: u32 = bins.iter().map(|&bin| u32::from(bin)).sum();
    (sum as f32 / bins.len() as f32 / MAX_MAGNITUDE).clamp(0.0, 1.0)
}

/// Stateless reduction of a magnitude snapshot into the named band levels.
#[derive(Debug, Clone, PartialEq)]
pub struct BandAnalyzer {
    kick: FrequencyBand,
    snare: FrequencyBand,
    bass_bins: usize,
}

impl Default for BandAnalyzer {
    fn default() -> Self {
        Self::from_config(&BandConfig::default())
    }
}

impl BandAnalyzer {
    pub fn from_config(config: &BandConfig) -> Self {
        Self {
            kick: config.kick,
            snare: config.snare,
            bass_bins: config.bass_bins,
        }
    }

    pub fn kick_band(&self) -> FrequencyBand {
        self.kick
    }

    pub fn snare_band(&self) -> FrequencyBand {
        self.snare
    }

    pub fn bass_bins(&self) -> usize {
        self.bass_bins
    }

    /// Average of the leading bass bins, independent of sample rate.
    pub fn bass_level(&self, snapshot: &[u8]) -> f32 {
        let bins = self.bass_bins.min(snapshot.len());
        if bins == 0 {
            return 0.0;
        }
        average(&snapshot[..bins])
    }

    pub fn kick_level(&self, snapshot: &[u8], sample_rate: u32, transform_size: usize) -> f32 {
        band_level(snapshot, sample_rate, transform_size, self.kick)
    }

    pub fn snare_level(&self, snapshot: &[u8], sample_rate: u32, transform_size: usize) -> f32 {
        band_level(snapshot, sample_rate, transform_size, self.snare)
    }

    pub fn levels(&self, snapshot: &[u8], sample_rate: u32, transform_size: usize) -> BandLevels {
        BandLevels {
            bass: self.bass_level(snapshot),
            kick: self.kick_level(snapshot, sample_rate, transform_size),
            snare: self.snare_level(snapshot, sample_rate, transform_size),
        }
    }
}
