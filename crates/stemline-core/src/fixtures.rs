use std::sync::{Arc, Mutex};

use crate::{
    model::{Stem, StemPcm},
    transport::Clock,
};

/// Deterministic clock for transport and scheduler tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    seconds: Mutex<f64>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta_seconds: f64) {
        let mut seconds = self.seconds.lock().expect("clock mutex should not poison");
        *seconds += delta_seconds;
    }

    pub fn set(&self, now_seconds: f64) {
        let mut seconds = self.seconds.lock().expect("clock mutex should not poison");
        *seconds = now_seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.seconds.lock().expect("clock mutex should not poison")
    }
}

#[must_use]
pub fn stem_from_channels(name: &str, sample_rate: u32, channels: Vec<Vec<f32>>) -> Stem {
    Stem::new(
        name,
        Arc::new(StemPcm {
            sample_rate,
            channels,
        }),
    )
}

/// Mono stem holding a steady sine tone.
#[must_use]
pub fn sine_stem(name: &str, frequency_hz: f64, seconds: f64, sample_rate: u32) -> Stem {
    let frames = (seconds * f64::from(sample_rate)) as usize;
    let samples = (0..frames)
        .map(|i| {
            (i as f64 / f64::from(sample_rate) * frequency_hz * std::f64::consts::TAU).sin() as f32
        })
        .collect();
    stem_from_channels(name, sample_rate, vec![samples])
}

/// Mono stem of silence, useful for pure transport tests.
#[must_use]
pub fn silent_stem(name: &str, seconds: f64, sample_rate: u32) -> Stem {
    let frames = (seconds * f64::from(sample_rate)) as usize;
    stem_from_channels(name, sample_rate, vec![vec![0.0; frames]])
}

/// Mono stem with a short high-frequency burst on every beat of the
/// given tempo. The bursts sit well above the tempo detector's 3 kHz
/// highpass so they survive analysis intact.
#[must_use]
pub fn click_track_stem(name: &str, bpm: f64, seconds: f64, sample_rate: u32) -> Stem {
    let frames = (seconds * f64::from(sample_rate)) as usize;
    let mut samples = vec![0.0_f32; frames];

    let beat_interval = 60.0 / bpm * f64::from(sample_rate);
    let burst_len = (f64::from(sample_rate) * 0.01) as usize;
    let burst_hz = f64::from(sample_rate) / 4.0;

    let mut beat_start = 0.0_f64;
    while (beat_start as usize) < frames {
        let start = beat_start as usize;
        for i in 0..burst_len.min(frames - start) {
            let envelope = 1.0 - i as f32 / burst_len as f32;
            let phase = i as f64 / f64::from(sample_rate) * burst_hz * std::f64::consts::TAU;
            samples[start + i] = phase.sin() as f32 * envelope * 0.9;
        }
        beat_start += beat_interval;
    }

    stem_from_channels(name, sample_rate, vec![samples])
}
