use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_BPM: u32 = 120;
pub const DEFAULT_BEATS_PER_MEASURE: u32 = 4;
pub const DEFAULT_BEAT_UNIT: u32 = 4;
pub const DEFAULT_MASTER_VOLUME: f32 = 0.5;
pub const DEFAULT_STEM_VOLUME: f32 = 1.0;

/// Audible frequency range exposed to stem filter controls.
pub const MIN_FILTER_HZ: f32 = 20.0;
pub const MAX_FILTER_HZ: f32 = 20_000.0;

/// Decoded PCM for one stem: per-channel sample buffers at one rate.
#[derive(Debug, Clone, PartialEq)]
pub struct StemPcm {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl StemPcm {
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }

        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// One loaded input track participating in the mix.
#[derive(Debug, Clone)]
pub struct Stem {
    pub id: Uuid,
    pub name: String,
    pub pcm: Arc<StemPcm>,
    pub volume: f32,
    pub muted: bool,
    pub solo: bool,
    pub filter_on: bool,
    pub low_freq_hz: f32,
    pub high_freq_hz: f32,
}

impl Stem {
    #[must_use]
    pub fn new(name: impl Into<String>, pcm: Arc<StemPcm>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            pcm,
            volume: DEFAULT_STEM_VOLUME,
            muted: false,
            solo: false,
            filter_on: false,
            low_freq_hz: MIN_FILTER_HZ,
            high_freq_hz: MAX_FILTER_HZ,
        }
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.pcm.duration_seconds()
    }
}

/// On/off state of the three master output bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBands {
    pub low_on: bool,
    pub mid_on: bool,
    pub high_on: bool,
}

impl Default for OutputBands {
    fn default() -> Self {
        Self {
            low_on: true,
            mid_on: true,
            high_on: true,
        }
    }
}

impl OutputBands {
    #[must_use]
    pub fn all_on(self) -> bool {
        self.low_on && self.mid_on && self.high_on
    }
}

/// Loop boundaries in whole beats. Only a start set means the loop is
/// armed and waiting for an end beat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start_beat: Option<u64>,
    pub end_beat: Option<u64>,
}

impl LoopRegion {
    #[must_use]
    pub fn active(self) -> Option<(u64, u64)> {
        match (self.start_beat, self.end_beat) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_armed(self) -> bool {
        self.start_beat.is_some() && self.end_beat.is_none()
    }
}

/// Stem filter presets mirroring the band ranges offered in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPreset {
    Low,
    Mid,
    High,
    Full,
}

impl FilterPreset {
    #[must_use]
    pub fn range_hz(self) -> (f32, f32) {
        match self {
            Self::Low => (20.0, 300.0),
            Self::Mid => (300.0, 4_000.0),
            Self::High => (4_000.0, 20_000.0),
            Self::Full => (MIN_FILTER_HZ, MAX_FILTER_HZ),
        }
    }
}

/// Log-scale position of a frequency on a 0..=1 filter slider.
#[must_use]
pub fn frequency_to_slider(hz: f32) -> f32 {
    let span = (MAX_FILTER_HZ / MIN_FILTER_HZ).log2();
    (hz.max(MIN_FILTER_HZ) / MIN_FILTER_HZ).log2() / span
}

#[must_use]
pub fn slider_to_frequency(position: f32) -> f32 {
    MIN_FILTER_HZ * (MAX_FILTER_HZ / MIN_FILTER_HZ).powf(position.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slider_mapping_round_trips() {
        for hz in [20.0_f32, 300.0, 4_000.0, 20_000.0] {
            let restored = slider_to_frequency(frequency_to_slider(hz));
            assert!((restored - hz).abs() / hz < 1e-3);
        }
    }

    #[test]
    fn loop_region_states() {
        let mut region = LoopRegion::default();
        assert_eq!(region.active(), None);
        region.start_beat = Some(4);
        assert!(region.is_armed());
        region.end_beat = Some(8);
        assert_eq!(region.active(), Some((4, 8)));
    }
}
