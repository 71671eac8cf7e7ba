use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{timeline::Clock, LoadError};

/// Backwards offset applied when a seek targets the very end of the track, so
/// the resulting position stays inside `[0, duration)`.
const SEEK_END_GUARD: f64 = 1e-6;

/// Decoded, randomly seekable audio. Samples are interleaved and shared, so
/// clones are cheap and a new load never copies the previous buffer.
#[derive(Clone)]
pub struct SampleBuffer {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: impl Into<Arc<[f32]>>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            channels,
            sample_rate,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of multi-channel frames in the buffer.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / usize::from(self.channels)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / f64::from(self.sample_rate)
        }
    }

    /// Channel average of a single frame; frames past the end read as silence.
    pub fn mono_frame(&self, frame: usize) -> f32 {
        if frame >= self.frames() {
            return 0.0;
        }
        let channels = usize::from(self.channels);
        let start = frame * channels;
        let sum: f32 = self.samples[start..start + channels].iter().sum();
        sum / channels as f32
    }

    /// Fills `out` with the mono frames immediately preceding `end_frame`.
    /// Positions before the start of the buffer are zero-filled.
    pub fn fill_mono_window(&self, end_frame: usize, out: &mut [f32]) {
        let len = out.len();
        for (offset, slot) in out.iter_mut().enumerate() {
            *slot = match (end_frame + offset).checked_sub(len) {
                Some(frame) => self.mono_frame(frame),
                None => 0.0,
            };
        }
    }

    fn validate(&self) -> Result<(), LoadError> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(LoadError::InvalidFormat);
        }
        if self.is_empty() {
            return Err(LoadError::EmptyBuffer);
        }
        Ok(())
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// The logical sample cursor of a playing buffer.
#[derive(Debug, Clone, Copy)]
pub struct Playhead<'a> {
    pub buffer: &'a SampleBuffer,
    pub position_seconds: f64,
}

impl Playhead<'_> {
    pub fn frame_index(&self) -> usize {
        let frame = self.position_seconds.max(0.0) * f64::from(self.buffer.sample_rate());
        (frame as usize).min(self.buffer.frames())
    }
}

type EndedHandler = Box<dyn FnMut() + Send>;

/// Playback state machine anchored to a free-running [`Clock`].
///
/// The position is never accumulated; it is recomputed as
/// `now - reference_clock_at_start` on every [`advance`](Self::advance), so
/// seeking and resuming only move the anchor.
pub struct PlaybackEngine<C> {
    clock: C,
    buffer: Option<SampleBuffer>,
    state: PlaybackState,
    reference_clock_at_start: f64,
    paused_offset: f64,
    loop_enabled: bool,
    duration_seconds: f64,
    position: f64,
    on_playback_ended: Option<EndedHandler>,
}

impl<C: Clock> PlaybackEngine<C> {
    /// Creates an empty engine with looping enabled.
    pub fn new(clock: C) -> Self {
        Self::with_loop(clock, true)
    }

    pub fn with_loop(clock: C, loop_enabled: bool) -> Self {
        Self {
            clock,
            buffer: None,
            state: PlaybackState::Stopped,
            reference_clock_at_start: 0.0,
            paused_offset: 0.0,
            loop_enabled,
            duration_seconds: 0.0,
            position: 0.0,
            on_playback_ended: None,
        }
    }

    /// Registers the single end-of-track subscriber, replacing any previous
    /// one. It runs synchronously inside [`advance`](Self::advance) after the
    /// engine has already transitioned to [`PlaybackState::Stopped`].
    pub fn set_on_playback_ended(&mut self, handler: impl FnMut() + Send + 'static) {
        self.on_playback_ended = Some(Box::new(handler));
    }

    /// Replaces the current buffer and starts playing it from zero.
    ///
    /// Any previous playback is hard stopped. A rejected buffer leaves every
    /// piece of state untouched.
    pub fn load(&mut self, buffer: SampleBuffer, duration_seconds: f64) -> Result<(), LoadError> {
        buffer.validate()?;
        if !duration_seconds.is_finite() || duration_seconds < 0.0 {
            return Err(LoadError::InvalidDuration(duration_seconds));
        }

        if self.state != PlaybackState::Stopped {
            tracing::debug!(state = ?self.state, "hard stopping previous buffer");
        }

        tracing::info!(
            duration_seconds,
            frames = buffer.frames(),
            sample_rate = buffer.sample_rate(),
            channels = buffer.channels(),
            "loaded sample buffer"
        );

        self.buffer = Some(buffer);
        self.duration_seconds = duration_seconds;
        self.start_from(0.0);
        Ok(())
    }

    /// Loads a buffer using the duration implied by its frame count.
    pub fn load_buffer(&mut self, buffer: SampleBuffer) -> Result<(), LoadError> {
        let duration = buffer.duration_seconds();
        self.load(buffer, duration)
    }

    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Playing => {}
            PlaybackState::Paused => {
                let offset = self.paused_offset;
                tracing::debug!(offset, "resuming playback");
                self.start_from(offset);
            }
            PlaybackState::Stopped => {
                if self.buffer.is_some() {
                    tracing::debug!("restarting playback from the beginning");
                    self.start_from(0.0);
                }
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let elapsed = self.clock.now() - self.reference_clock_at_start;
        self.paused_offset = self.wrap(elapsed.max(0.0));
        self.position = self.paused_offset;
        self.state = PlaybackState::Paused;
        tracing::debug!(offset = self.paused_offset, "paused playback");
    }

    /// Moves the cursor to `time_seconds`, clamped to `[0, duration)`.
    ///
    /// Honoured while Playing or Paused; the play/pause state is preserved. A
    /// seek while Paused updates the offset playback will resume from.
    pub fn seek(&mut self, time_seconds: f64) {
        if self.state == PlaybackState::Stopped || time_seconds.is_nan() {
            return;
        }
        let target = self.clamp_seek(time_seconds);
        self.reference_clock_at_start = self.clock.now() - target;
        self.position = target;
        if self.state == PlaybackState::Paused {
            self.paused_offset = target;
        }
        tracing::debug!(target, state = ?self.state, "seeked");
    }

    pub fn set_loop(&mut self, enabled: bool) {
        let was_enabled = self.loop_enabled;
        // A paused playhead keeps its frozen offset even when it sits at the end.
        let at_end = self.buffer.is_some()
            && self.state != PlaybackState::Paused
            && self.position >= self.duration_seconds;
        self.loop_enabled = enabled;

        if enabled {
            if at_end {
                tracing::debug!("loop enabled at end of track, replaying");
                self.start_from(0.0);
            }
            return;
        }

        if self.state != PlaybackState::Playing {
            return;
        }
        if at_end {
            self.finish();
        } else if was_enabled {
            // Forget completed loop passes so the current pass plays out.
            let now = self.clock.now();
            let position = self.wrap((now - self.reference_clock_at_start).max(0.0));
            self.reference_clock_at_start = now - position;
            self.position = position;
        }
    }

    /// Hard stop. Keeps the buffer so a later [`play`](Self::play) restarts
    /// from zero; never raises the end-of-track notification.
    pub fn stop(&mut self) {
        if self.state != PlaybackState::Stopped {
            tracing::debug!("stopped playback");
        }
        self.state = PlaybackState::Stopped;
        self.position = 0.0;
        self.paused_offset = 0.0;
    }

    /// Recomputes the position for the frame observed at `now`. Called once
    /// per displayed frame; only moves while Playing.
    pub fn advance(&mut self, now: f64) -> f64 {
        if self.state != PlaybackState::Playing {
            return self.position;
        }

        let elapsed = (now - self.reference_clock_at_start).max(0.0);
        if self.loop_enabled {
            self.position = self.wrap(elapsed);
        } else if elapsed >= self.duration_seconds {
            self.finish();
        } else {
            self.position = elapsed;
        }
        self.position
    }

    /// [`advance`](Self::advance) using the engine's own clock.
    pub fn tick(&mut self) -> f64 {
        let now = self.clock.now();
        self.advance(now)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn current_position(&self) -> f64 {
        self.position
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn buffer(&self) -> Option<&SampleBuffer> {
        self.buffer.as_ref()
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The sample cursor, available only while Playing.
    pub fn playhead(&self) -> Option<Playhead<'_>> {
        match (&self.buffer, self.state) {
            (Some(buffer), PlaybackState::Playing) => Some(Playhead {
                buffer,
                position_seconds: self.position,
            }),
            _ => None,
        }
    }

    fn start_from(&mut self, offset: f64) {
        self.reference_clock_at_start = self.clock.now() - offset;
        self.paused_offset = 0.0;
        self.position = offset;
        self.state = PlaybackState::Playing;
    }

    fn finish(&mut self) {
        self.state = PlaybackState::Stopped;
        self.position = self.duration_seconds;
        tracing::info!(duration = self.duration_seconds, "playback reached end of track");
        if let Some(handler) = self.on_playback_ended.as_mut() {
            handler();
        }
    }

    fn wrap(&self, elapsed: f64) -> f64 {
        if self.duration_seconds > 0.0 {
            elapsed % self.duration_seconds
        } else {
            0.0
        }
    }

    fn clamp_seek(&self, time_seconds: f64) -> f64 {
        if time_seconds >= self.duration_seconds {
            (self.duration_seconds - SEEK_END_GUARD).max(0.0)
        } else {
            time_seconds.max(0.0)
        }
    }
}

impl<C: fmt::Debug> fmt::Debug for PlaybackEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("clock", &self.clock)
            .field("buffer", &self.buffer)
            .field("state", &self.state)
            .field("reference_clock_at_start", &self.reference_clock_at_start)
            .field("paused_offset", &self.paused_offset)
            .field("loop_enabled", &self.loop_enabled)
            .field("duration_seconds", &self.duration_seconds)
            .field("position", &self.position)
            .field("has_ended_handler", &self.on_playback_ended.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::timeline::ManualClock;

    const EPS: f64 = 1e-9;

    fn buffer_of(seconds: u32) -> SampleBuffer {
        let sample_rate = 100;
        SampleBuffer::new(vec![0.0_f32; (seconds * sample_rate) as usize], 1, sample_rate)
    }

    fn loaded_engine(loop_enabled: bool) -> (PlaybackEngine<ManualClock>, ManualClock, Arc<AtomicUsize>) {
        let clock = ManualClock::new(100.0);
        let mut engine = PlaybackEngine::with_loop(clock.clone(), loop_enabled);
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        engine.set_on_playback_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        engine.load(buffer_of(10), 10.0).unwrap();
        (engine, clock, ended)
    }

    #[test]
    fn load_starts_playing_from_zero() {
        let (engine, _, _) = loaded_engine(true);
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(engine.current_position(), 0.0);
        assert_eq!(engine.duration_seconds(), 10.0);
    }

    #[test]
    fn rejected_load_leaves_state_untouched() {
        let (mut engine, clock, _) = loaded_engine(true);
        clock.advance(3.0);
        engine.tick();

        let empty = SampleBuffer::new(Vec::<f32>::new(), 2, 44_100);
        assert!(matches!(engine.load(empty, 1.0), Err(LoadError::EmptyBuffer)));
        let no_rate = SampleBuffer::new(vec![0.0_f32; 8], 1, 0);
        assert!(matches!(engine.load(no_rate, 1.0), Err(LoadError::InvalidFormat)));
        assert!(matches!(
            engine.load(buffer_of(1), f64::NAN),
            Err(LoadError::InvalidDuration(_))
        ));

        assert!(engine.is_playing());
        assert!((engine.current_position() - 3.0).abs() < EPS);
        assert_eq!(engine.duration_seconds(), 10.0);
    }

    #[test]
    fn reload_hard_stops_and_restarts() {
        let (mut engine, clock, ended) = loaded_engine(true);
        clock.advance(4.0);
        engine.pause();

        engine.load(buffer_of(5), 5.0).unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.current_position(), 0.0);

        clock.advance(1.0);
        assert!((engine.tick() - 1.0).abs() < EPS);
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn looping_wraps_elapsed_time() {
        let (mut engine, clock, ended) = loaded_engine(true);
        let start = clock.now();

        assert!((engine.advance(start + 12.0) - 2.0).abs() < EPS);
        assert_eq!(engine.state(), PlaybackState::Playing);

        for elapsed in [0.0, 9.999, 10.0, 25.5, 1000.25] {
            let position = engine.advance(start + elapsed);
            assert!((0.0..10.0).contains(&position), "{elapsed} -> {position}");
            assert!((position - elapsed % 10.0).abs() < EPS);
        }
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn natural_end_fires_exactly_once() {
        let (mut engine, clock, ended) = loaded_engine(false);
        let start = clock.now();

        assert!((engine.advance(start + 9.5) - 9.5).abs() < EPS);
        assert_eq!(ended.load(Ordering::SeqCst), 0);

        assert_eq!(engine.advance(start + 10.0), 10.0);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        for extra in [10.5, 11.0, 30.0] {
            assert_eq!(engine.advance(start + extra), 10.0);
        }
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn end_handler_observes_stopped_engine() {
        let clock = ManualClock::new(0.0);
        let mut engine = PlaybackEngine::with_loop(clock.clone(), false);
        engine.load(buffer_of(1), 1.0).unwrap();
        clock.advance(2.0);

        let position = engine.tick();
        assert_eq!(position, 1.0);
        assert!(!engine.is_playing());
        assert!(engine.playhead().is_none());
    }

    #[test]
    fn pause_then_play_resumes_in_place() {
        let (mut engine, clock, ended) = loaded_engine(true);
        clock.advance(3.25);
        engine.tick();

        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert!((engine.current_position() - 3.25).abs() < EPS);

        clock.advance(7.0);
        assert!((engine.tick() - 3.25).abs() < EPS);

        engine.play();
        assert!((engine.tick() - 3.25).abs() < EPS);
        clock.advance(0.5);
        assert!((engine.tick() - 3.75).abs() < EPS);
        assert_eq!(ended.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pause_and_play_are_idempotent() {
        let (mut engine, clock, _) = loaded_engine(true);
        clock.advance(2.0);

        engine.pause();
        clock.advance(1.0);
        engine.pause();
        assert!((engine.current_position() - 2.0).abs() < EPS);

        engine.play();
        clock.advance(1.0);
        engine.play();
        assert!((engine.tick() - 3.0).abs() < EPS);
    }

    #[test]
    fn seek_re_anchors_position() {
        let (mut engine, clock, _) = loaded_engine(true);
        clock.advance(1.0);
        engine.seek(5.0);
        assert!((engine.tick() - 5.0).abs() < EPS);

        clock.advance(0.5);
        assert!((engine.tick() - 5.5).abs() < EPS);
        assert!(engine.is_playing());
    }

    #[test]
    fn seek_clamps_into_track() {
        let (mut engine, _, _) = loaded_engine(true);
        engine.seek(-3.0);
        assert_eq!(engine.tick(), 0.0);

        engine.seek(42.0);
        let position = engine.tick();
        assert!(position < 10.0);
        assert!(position > 9.99);

        engine.seek(f64::NAN);
        assert!((position - engine.tick()).abs() < 1e-6);
    }

    #[test]
    fn seek_while_paused_moves_resume_point() {
        let (mut engine, clock, _) = loaded_engine(true);
        clock.advance(2.0);
        engine.pause();

        engine.seek(7.0);
        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.current_position(), 7.0);

        clock.advance(4.0);
        engine.play();
        clock.advance(1.0);
        assert!((engine.tick() - 8.0).abs() < EPS);
    }

    #[test]
    fn seek_while_stopped_is_ignored() {
        let (mut engine, _, _) = loaded_engine(true);
        engine.stop();
        engine.seek(4.0);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(engine.current_position(), 0.0);

        let mut empty = PlaybackEngine::new(ManualClock::default());
        empty.seek(1.0);
        empty.play();
        assert_eq!(empty.state(), PlaybackState::Stopped);
    }

    #[test]
    fn play_after_natural_end_restarts() {
        let (mut engine, clock, ended) = loaded_engine(false);
        clock.advance(11.0);
        engine.tick();
        assert_eq!(ended.load(Ordering::SeqCst), 1);

        engine.play();
        assert!(engine.is_playing());
        assert_eq!(engine.tick(), 0.0);
    }

    #[test]
    fn enabling_loop_at_end_replays() {
        let (mut engine, clock, ended) = loaded_engine(false);
        clock.advance(10.0);
        engine.tick();
        assert_eq!(engine.state(), PlaybackState::Stopped);

        engine.set_loop(true);
        engine.set_loop(true);
        assert!(engine.is_playing());
        assert!(engine.loop_enabled());
        clock.advance(0.25);
        assert!((engine.tick() - 0.25).abs() < EPS);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabling_loop_mid_track_does_not_end() {
        let (mut engine, clock, ended) = loaded_engine(true);
        clock.advance(23.0);
        engine.tick();

        engine.set_loop(false);
        assert!(engine.is_playing());
        assert!((engine.tick() - 3.0).abs() < EPS);
        assert_eq!(ended.load(Ordering::SeqCst), 0);

        clock.advance(7.0);
        engine.tick();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabling_loop_at_end_stops_immediately() {
        let clock = ManualClock::new(0.0);
        let mut engine = PlaybackEngine::new(clock.clone());
        let ended = Arc::new(AtomicUsize::new(0));
        let counter = ended.clone();
        engine.set_on_playback_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        engine.load(buffer_of(1), 0.0).unwrap();

        engine.set_loop(false);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_duration_loops_at_origin() {
        let clock = ManualClock::new(0.0);
        let mut engine = PlaybackEngine::new(clock.clone());
        engine.load(buffer_of(1), 0.0).unwrap();
        clock.advance(5.0);
        assert_eq!(engine.tick(), 0.0);
        assert!(engine.is_playing());
    }

    #[test]
    fn enabling_loop_while_paused_keeps_pause() {
        let clock = ManualClock::new(0.0);
        let mut engine = PlaybackEngine::new(clock.clone());
        engine.load(buffer_of(1), 0.0).unwrap();
        engine.set_loop(true);
        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Paused);

        engine.set_loop(true);
        assert_eq!(engine.state(), PlaybackState::Paused);
        clock.advance(1.0);
        assert_eq!(engine.tick(), 0.0);
        assert_eq!(engine.state(), PlaybackState::Paused);

        engine.play();
        assert!(engine.is_playing());
    }

    #[test]
    fn playhead_tracks_sample_cursor() {
        let (mut engine, clock, _) = loaded_engine(true);
        clock.advance(2.5);
        engine.tick();
        let playhead = engine.playhead().expect("playing engine exposes a playhead");
        assert_eq!(playhead.frame_index(), 250);

        engine.pause();
        assert!(engine.playhead().is_none());
    }

    #[test]
    fn mono_window_zero_fills_before_start() {
        let buffer = SampleBuffer::new(vec![1.0, 3.0, 2.0, 4.0, 5.0, 7.0], 2, 10);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.mono_frame(1), 3.0);
        assert_eq!(buffer.mono_frame(3), 0.0);

        let mut window = [9.0_f32; 4];
        buffer.fill_mono_window(2, &mut window);
        assert_eq!(window, [0.0, 0.0, 2.0, 3.0]);
    }
}
