use anyhow::Result;
use tracing::{debug, instrument};

use crate::{
    energy::{finalize_envelope, window_rms, window_samples},
    mix::StemMix,
    render,
};

pub const MIN_BPM: f64 = 40.0;
pub const MAX_BPM: f64 = 400.0;

/// Autocorrelation looks at the opening section only; tempo rarely
/// drifts enough in 30 s to matter and the full track is wasted work.
pub const ANALYSIS_SECONDS: f64 = 30.0;

/// Estimate the tempo of the audible mix.
///
/// Renders the mix through a transient-emphasis highpass, extracts the
/// onset envelope, and autocorrelates it over the 40-400 BPM lag range
/// with a musical prior favouring common tempi. Returns `None` when no
/// stem is audible.
#[instrument(skip(stems), fields(stems = stems.len(), total_duration))]
pub fn detect_bpm(
    stems: &[StemMix],
    sample_rate: u32,
    total_duration: f64,
) -> Result<Option<u32>> {
    if stems.is_empty() || total_duration <= 0.0 || sample_rate == 0 {
        return Ok(None);
    }

    let total_samples = (total_duration * f64::from(sample_rate)).floor() as usize;
    if total_samples == 0 {
        return Ok(None);
    }

    let rendered = render::render_transient_highpass(stems, sample_rate, total_samples)?;
    let envelope = finalize_envelope(window_rms(&rendered, window_samples(sample_rate)));
    let detected = detect_from_onsets(&envelope.onset, envelope.sample_rate_hz);
    debug!(?detected, "tempo analysis complete");
    Ok(detected)
}

/// Core autocorrelation step, separated so synthetic onset signals can
/// drive it directly.
#[must_use]
pub fn detect_from_onsets(onsets: &[f32], envelope_rate_hz: f32) -> Option<u32> {
    let rate = f64::from(envelope_rate_hz);
    if rate <= 0.0 || onsets.is_empty() {
        return None;
    }

    let min_lag = (rate * 60.0 / MAX_BPM).floor() as usize;
    let max_lag = (rate * 60.0 / MIN_BPM).ceil() as usize;
    let analyze_len = onsets.len().min((ANALYSIS_SECONDS * rate).floor() as usize);
    if min_lag == 0 || min_lag >= analyze_len {
        return None;
    }

    let top_lag = max_lag.min(analyze_len - 1);
    let mut corr = vec![0.0_f32; max_lag + 1];
    for lag in min_lag..=top_lag {
        let count = analyze_len - lag;
        let sum: f32 = (0..count).map(|i| onsets[i] * onsets[i + lag]).sum();
        corr[lag] = sum / count as f32;
    }

    let mut best_lag = min_lag;
    let mut best_score = f32::NEG_INFINITY;
    for lag in min_lag..=top_lag {
        let bpm = rate * 60.0 / lag as f64;
        let weight = if (80.0..=160.0).contains(&bpm) {
            1.3
        } else if (60.0..=200.0).contains(&bpm) {
            1.1
        } else {
            1.0
        };

        let weighted = corr[lag] * weight;
        if weighted > best_score {
            best_score = weighted;
            best_lag = lag;
        }
    }

    let best_bpm = rate * 60.0 / best_lag as f64;

    // Octave-error correction: prefer the doubled tempo when it is
    // nearly as well supported, and the halved tempo only when it lands
    // in the common range with very strong support.
    let half_lag = (best_lag as f64 / 2.0).round() as usize;
    if half_lag >= min_lag && half_lag <= max_lag {
        let half_lag_bpm = best_bpm * 2.0;
        if (80.0..=400.0).contains(&half_lag_bpm) && corr[half_lag] > corr[best_lag] * 0.8 {
            return Some(half_lag_bpm.round() as u32);
        }
    }

    let double_lag = best_lag * 2;
    if double_lag >= min_lag && double_lag <= max_lag && double_lag < analyze_len {
        let double_lag_bpm = best_bpm / 2.0;
        if (80.0..=160.0).contains(&double_lag_bpm) && corr[double_lag] > corr[best_lag] * 0.9 {
            return Some(double_lag_bpm.round() as u32);
        }
    }

    Some(best_bpm.round() as u32)
}
