use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    bands,
    model::{OutputBands, Stem, StemPcm},
};

/// Q for the master band-split crossover filters.
pub const BAND_SPLIT_Q: f32 = 0.707;

/// Q for per-stem band filters and the tempo-analysis highpass.
pub const STEM_FILTER_Q: f32 = 0.7;

/// Smoothing time constant applied to master gain moves.
pub const MASTER_GAIN_SMOOTHING_SECONDS: f32 = 0.02;

/// Smoothing time constant applied when an output band is toggled.
pub const BAND_GAIN_SMOOTHING_SECONDS: f32 = 0.01;

#[must_use]
pub fn any_solo(stems: &[Stem]) -> bool {
    stems.iter().any(|stem| stem.solo)
}

/// A stem is audible unless muted, silenced, or passed over by a solo.
#[must_use]
pub fn is_audible(stem: &Stem, any_solo: bool) -> bool {
    !stem.muted && stem.volume != 0.0 && (!any_solo || stem.solo)
}

#[must_use]
pub fn audible_stems(stems: &[Stem]) -> Vec<&Stem> {
    let solo = any_solo(stems);
    stems.iter().filter(|stem| is_audible(stem, solo)).collect()
}

#[must_use]
pub fn effective_gain(stem: &Stem, any_solo: bool) -> f32 {
    if is_audible(stem, any_solo) {
        stem.volume
    } else {
        0.0
    }
}

/// Equal-power normalization: keeps loudness stable as stems are added.
#[must_use]
pub fn compensation_gain(stems: &[Stem]) -> f32 {
    if stems.is_empty() {
        return 1.0;
    }

    let solo = any_solo(stems);
    let power: f32 = stems
        .iter()
        .filter(|stem| !stem.muted && (!solo || stem.solo))
        .map(|stem| {
            let v = stem.volume.max(0.0);
            v * v
        })
        .sum();
    1.0 / power.sqrt().max(1.0)
}

/// Master output gain: the 0..=1 user control maps to 0..=2 internally.
#[must_use]
pub fn master_gain(user_volume: f32, stems: &[Stem]) -> f32 {
    user_volume * 2.0 * compensation_gain(stems)
}

/// Volume-weighted view of one audible stem, snapshotted for analysis
/// passes so workers never touch live engine state.
#[derive(Debug, Clone)]
pub struct StemMix {
    pub pcm: Arc<StemPcm>,
    pub gain: f32,
}

#[must_use]
pub fn mix_snapshot(stems: &[Stem]) -> Vec<StemMix> {
    let solo = any_solo(stems);
    stems
        .iter()
        .filter(|stem| is_audible(stem, solo))
        .map(|stem| StemMix {
            pcm: Arc::clone(&stem.pcm),
            gain: stem.volume,
        })
        .collect()
}

/// Logical node graph the external audio renderer realizes for live
/// playback. Offline analysis renders the same topology minus the
/// master stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveGraphSpec {
    pub stems: Vec<StemNode>,
    pub master: MasterNode,
    pub band_split: BandSplitNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemNode {
    pub stem_id: Uuid,
    pub gain: f32,
    pub playback_rate: f64,
    pub filter: Option<StemFilterNode>,
}

/// Highpass into lowpass in series, bounding the stem to a band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StemFilterNode {
    pub highpass_hz: f32,
    pub lowpass_hz: f32,
    pub q: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterNode {
    pub gain: f32,
    pub smoothing_seconds: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSplitNode {
    pub low_mid_hz: f64,
    pub mid_high_hz: f64,
    pub q: f32,
    pub low_gain: f32,
    pub mid_gain: f32,
    pub high_gain: f32,
    pub smoothing_seconds: f32,
}

#[must_use]
pub fn live_graph(
    stems: &[Stem],
    user_volume: f32,
    bands: OutputBands,
    playback_rate: f64,
) -> LiveGraphSpec {
    let solo = any_solo(stems);
    let splits = bands::third_splits();
    let band_gain = |on: bool| if on { 1.0 } else { 0.0 };

    LiveGraphSpec {
        stems: stems
            .iter()
            .map(|stem| StemNode {
                stem_id: stem.id,
                gain: effective_gain(stem, solo),
                playback_rate,
                filter: stem.filter_on.then_some(StemFilterNode {
                    highpass_hz: stem.low_freq_hz,
                    lowpass_hz: stem.high_freq_hz,
                    q: STEM_FILTER_Q,
                }),
            })
            .collect(),
        master: MasterNode {
            gain: master_gain(user_volume, stems),
            smoothing_seconds: MASTER_GAIN_SMOOTHING_SECONDS,
        },
        band_split: BandSplitNode {
            low_mid_hz: splits.low_mid_hz,
            mid_high_hz: splits.mid_high_hz,
            q: BAND_SPLIT_Q,
            low_gain: band_gain(bands.low_on),
            mid_gain: band_gain(bands.mid_on),
            high_gain: band_gain(bands.high_on),
            smoothing_seconds: BAND_GAIN_SMOOTHING_SECONDS,
        },
    }
}
