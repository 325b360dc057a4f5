use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{model::LoopRegion, time};

/// Monotonic seconds source, the engine's equivalent of an audio clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock backed implementation used outside tests.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Sample-accurate playback position bookkeeping.
///
/// While playing, track time is the pause offset plus rate-scaled
/// elapsed clock time; paused and stopped states simply hold the
/// offset (stop resets it to zero).
#[derive(Debug, Clone, Copy)]
pub struct Transport {
    state: PlaybackState,
    start_clock: f64,
    pause_offset: f64,
    playback_rate: f64,
    total_duration: f64,
}

impl Transport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            start_clock: 0.0,
            pause_offset: 0.0,
            playback_rate: 1.0,
            total_duration: 0.0,
        }
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    #[must_use]
    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn set_total_duration(&mut self, total_duration: f64) {
        self.total_duration = total_duration.max(0.0);
        self.pause_offset = self.pause_offset.min(self.total_duration);
    }

    pub fn play(&mut self, now: f64) {
        if self.state == PlaybackState::Playing {
            return;
        }
        self.start_clock = now;
        self.state = PlaybackState::Playing;
    }

    pub fn pause(&mut self, now: f64) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.pause_offset = self.current_time(now);
        self.state = PlaybackState::Paused;
    }

    pub fn stop(&mut self) {
        self.pause_offset = 0.0;
        self.state = PlaybackState::Stopped;
    }

    pub fn seek(&mut self, seconds: f64, now: f64) {
        self.pause_offset = seconds.clamp(0.0, self.total_duration);
        if self.state == PlaybackState::Playing {
            self.start_clock = now;
        }
    }

    /// Change playback speed without moving the playhead: the clock is
    /// re-anchored so already elapsed time keeps its old rate.
    pub fn set_playback_rate(&mut self, rate: f64, now: f64) {
        if self.state == PlaybackState::Playing {
            self.pause_offset = self.current_time(now);
            self.start_clock = now;
        }
        self.playback_rate = rate.max(0.01);
    }

    #[must_use]
    pub fn current_time(&self, now: f64) -> f64 {
        match self.state {
            PlaybackState::Playing => self
                .project_track_time(now)
                .clamp(0.0, self.total_duration),
            PlaybackState::Paused | PlaybackState::Stopped => self.pause_offset,
        }
    }

    /// Unclamped projection of a clock instant onto track time; the
    /// metronome scheduler uses this for beats that have not happened
    /// yet.
    #[must_use]
    pub fn project_track_time(&self, clock_time: f64) -> f64 {
        self.pause_offset + (clock_time - self.start_clock) * self.playback_rate
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

/// One scheduled metronome click, addressed in audio-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub clock_time: f64,
    pub track_time: f64,
    pub beat_in_measure: u32,
    pub frequency_hz: f32,
    pub gain: f32,
    pub duration_ms: u32,
}

pub const CLICK_DURATION_MS: u32 = 60;

/// How far ahead of the clock clicks are committed each scheduling tick.
pub const SCHEDULE_AHEAD_SECONDS: f64 = 0.1;

/// Polling cadence of the scheduler; precise timing lives in the
/// emitted clock times, not in this interval.
pub const LOOK_AHEAD_INTERVAL_SECONDS: f64 = 0.025;

/// Cadence of the loop-region boundary check while playing.
pub const LOOP_CHECK_INTERVAL_SECONDS: f64 = 0.02;

/// Look-ahead metronome scheduler.
#[derive(Debug, Clone)]
pub struct Metronome {
    pub enabled: bool,
    pub bpm: u32,
    pub beats_per_measure: u32,
    pub beat_unit: u32,
    next_beat_clock: f64,
}

impl Metronome {
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: false,
            bpm: crate::model::DEFAULT_BPM,
            beats_per_measure: crate::model::DEFAULT_BEATS_PER_MEASURE,
            beat_unit: crate::model::DEFAULT_BEAT_UNIT,
            next_beat_clock: 0.0,
        }
    }

    /// Restart scheduling from the given clock instant; the first click
    /// lands immediately.
    pub fn start(&mut self, now: f64) {
        self.next_beat_clock = now;
    }

    /// Emit every beat whose clock time falls inside the schedule-ahead
    /// window, skipping nothing and never scheduling past the end of
    /// the track.
    pub fn schedule(&mut self, transport: &Transport, now: f64) -> Vec<ClickEvent> {
        let mut events = Vec::new();
        if !self.enabled || !transport.is_playing() {
            return events;
        }

        let beat_duration = time::beat_duration(self.bpm);
        while self.next_beat_clock < now + SCHEDULE_AHEAD_SECONDS {
            let track_time = transport.project_track_time(self.next_beat_clock);
            if track_time > transport.total_duration() {
                break;
            }

            let beat_index = (track_time / beat_duration).round().max(0.0) as u64;
            let beat_in_measure = (beat_index % u64::from(self.beats_per_measure.max(1))) as u32;
            let (frequency_hz, gain) = click_tone(beat_in_measure, self.beats_per_measure);

            events.push(ClickEvent {
                clock_time: self.next_beat_clock,
                track_time,
                beat_in_measure,
                frequency_hz,
                gain,
                duration_ms: CLICK_DURATION_MS,
            });

            self.next_beat_clock += beat_duration / transport.playback_rate();
        }

        events
    }
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new()
    }
}

/// Downbeat accent, secondary accent on beat three of common time.
#[must_use]
pub fn click_tone(beat_in_measure: u32, beats_per_measure: u32) -> (f32, f32) {
    if beat_in_measure == 0 {
        (1_200.0, 0.6)
    } else if beats_per_measure == 4 && beat_in_measure == 2 {
        (1_000.0, 0.45)
    } else {
        (800.0, 0.3)
    }
}

/// If playback has crossed the loop end, where to jump back to.
#[must_use]
pub fn loop_wrap_target(region: LoopRegion, bpm: u32, current_time: f64) -> Option<f64> {
    let (start_beat, end_beat) = region.active()?;
    let beat_duration = time::beat_duration(bpm);
    if current_time >= end_beat as f64 * beat_duration {
        Some(start_beat as f64 * beat_duration)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_pause_resume_keeps_position() {
        let mut transport = Transport::new();
        transport.set_total_duration(10.0);

        transport.play(1.0);
        assert!((transport.current_time(3.0) - 2.0).abs() < 1e-9);

        transport.pause(3.0);
        assert_eq!(transport.state(), PlaybackState::Paused);
        assert!((transport.current_time(99.0) - 2.0).abs() < 1e-9);

        transport.play(100.0);
        assert!((transport.current_time(101.5) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn stop_resets_offset() {
        let mut transport = Transport::new();
        transport.set_total_duration(10.0);
        transport.play(0.0);
        transport.stop();
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.current_time(5.0), 0.0);
    }

    #[test]
    fn current_time_clamps_to_duration() {
        let mut transport = Transport::new();
        transport.set_total_duration(2.0);
        transport.play(0.0);
        assert_eq!(transport.current_time(50.0), 2.0);
    }

    #[test]
    fn rate_change_does_not_jump_position() {
        let mut transport = Transport::new();
        transport.set_total_duration(100.0);
        transport.play(0.0);
        transport.set_playback_rate(0.5, 4.0);
        assert!((transport.current_time(4.0) - 4.0).abs() < 1e-9);
        assert!((transport.current_time(6.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn metronome_accents_common_time() {
        let mut transport = Transport::new();
        transport.set_total_duration(60.0);
        transport.play(0.0);

        let mut metronome = Metronome::new();
        metronome.enabled = true;
        metronome.bpm = 120;
        metronome.start(0.0);

        // 0.5 s beats: a 1.2 s window covers beats 0, 1 and 2.
        let events = metronome.schedule(&transport, 1.1);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].beat_in_measure, 0);
        assert!((events[0].frequency_hz - 1_200.0).abs() < f32::EPSILON);
        assert_eq!(events[1].beat_in_measure, 1);
        assert!((events[1].frequency_hz - 800.0).abs() < f32::EPSILON);
        assert_eq!(events[2].beat_in_measure, 2);
        assert!((events[2].frequency_hz - 1_000.0).abs() < f32::EPSILON);
    }

    #[test]
    fn metronome_stops_at_track_end() {
        let mut transport = Transport::new();
        transport.set_total_duration(1.0);
        transport.play(0.0);

        let mut metronome = Metronome::new();
        metronome.enabled = true;
        metronome.bpm = 120;
        metronome.start(0.0);

        let events = metronome.schedule(&transport, 5.0);
        assert!(events.iter().all(|event| event.track_time <= 1.0));
    }

    #[test]
    fn loop_wraps_only_past_end() {
        let region = LoopRegion {
            start_beat: Some(4),
            end_beat: Some(8),
        };
        assert_eq!(loop_wrap_target(region, 120, 3.9), None);
        assert_eq!(loop_wrap_target(region, 120, 4.0), Some(2.0));
    }
}
