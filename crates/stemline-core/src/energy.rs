use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{mix::StemMix, model::OutputBands, render};

/// RMS analysis window.
pub const ENERGY_WINDOW_MS: u32 = 5;

/// RMS and onset envelopes over the audible mix, both normalized to 0..=1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyEnvelope {
    pub rms: Vec<f32>,
    pub onset: Vec<f32>,
    pub sample_rate_hz: f32,
}

impl EnergyEnvelope {
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.rms.len()
    }
}

/// Compute the energy envelope for the audible mix.
///
/// With every output band enabled the envelope sums raw stem samples
/// directly. Once any band is bypassed the mix must be rendered through
/// the band-split graph first: direct summation cannot model the
/// filtered frequency content.
#[instrument(skip(stems), fields(stems = stems.len(), total_duration))]
pub fn compute_energy(
    stems: &[StemMix],
    sample_rate: u32,
    total_duration: f64,
    bands: OutputBands,
) -> Result<Option<EnergyEnvelope>> {
    if total_duration <= 0.0 || sample_rate == 0 {
        return Ok(None);
    }

    let window_samples = window_samples(sample_rate);
    let total_samples = (total_duration * f64::from(sample_rate)).floor() as usize;
    if window_samples == 0 || total_samples == 0 {
        return Ok(None);
    }

    let raw = if bands.all_on() {
        direct_envelope(stems, window_samples, total_samples)
    } else {
        let rendered =
            render::render_band_split(stems, sample_rate, 0.0, total_samples, bands)?;
        window_rms(&rendered, window_samples)
    };

    Ok(Some(finalize_envelope(raw)))
}

/// Per-window RMS of an already rendered mono signal.
#[must_use]
pub fn window_rms(samples: &[f32], window_samples: usize) -> Vec<f32> {
    if samples.is_empty() || window_samples == 0 {
        return Vec::new();
    }

    samples
        .chunks(window_samples)
        .map(|window| {
            let sum_sq: f32 = window.iter().map(|x| x * x).sum();
            (sum_sq / window.len() as f32).sqrt()
        })
        .collect()
}

/// Normalize a raw RMS curve and derive its onset envelope.
///
/// The onset signal is the positive-rectified first difference of the
/// normalized energy, itself renormalized; `onset[0]` carries the
/// initial energy so a track that opens loud still registers.
#[must_use]
pub fn finalize_envelope(mut rms: Vec<f32>) -> EnergyEnvelope {
    normalize_in_place(&mut rms);

    let mut onset = vec![0.0_f32; rms.len()];
    if let Some(first) = rms.first() {
        onset[0] = *first;
    }
    for i in 1..rms.len() {
        let diff = rms[i] - rms[i - 1];
        onset[i] = diff.max(0.0);
    }
    normalize_in_place(&mut onset);

    EnergyEnvelope {
        rms,
        onset,
        sample_rate_hz: 1_000.0 / ENERGY_WINDOW_MS as f32,
    }
}

/// Peak-per-bucket reduction for display at pixel resolution.
#[must_use]
pub fn downsample_peaks(values: &[f32], bucket_size: usize) -> Vec<f32> {
    if bucket_size == 0 {
        return values.to_vec();
    }

    values
        .chunks(bucket_size)
        .map(|chunk| chunk.iter().copied().fold(0.0_f32, f32::max))
        .collect()
}

#[must_use]
pub fn window_samples(sample_rate: u32) -> usize {
    (sample_rate as u64 * u64::from(ENERGY_WINDOW_MS) / 1_000) as usize
}

/// Mean-square accumulation over every audible channel sample, volume
/// applied, without channel averaging.
fn direct_envelope(stems: &[StemMix], window_samples: usize, total_samples: usize) -> Vec<f32> {
    let num_windows = total_samples.div_ceil(window_samples);
    let mut rms = vec![0.0_f32; num_windows];

    for (w, value) in rms.iter_mut().enumerate() {
        let start = w * window_samples;
        let end = (start + window_samples).min(total_samples);
        let mut sum_sq = 0.0_f64;
        let mut count = 0_u64;

        for stem in stems {
            for channel in &stem.pcm.channels {
                let channel_end = end.min(channel.len());
                if start >= channel_end {
                    continue;
                }
                for sample in &channel[start..channel_end] {
                    let weighted = sample * stem.gain;
                    sum_sq += f64::from(weighted * weighted);
                    count += 1;
                }
            }
        }

        if count > 0 {
            *value = (sum_sq / count as f64).sqrt() as f32;
        }
    }

    rms
}

fn normalize_in_place(values: &mut [f32]) {
    let max = values.iter().copied().fold(0.0_f32, f32::max);
    if max > 0.0 {
        for value in values {
            *value /= max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onset_tracks_positive_differences() {
        let envelope = finalize_envelope(vec![0.1, 0.2, 0.4, 0.8]);
        // Energy normalizes to [0.125, 0.25, 0.5, 1.0]; every diff is
        // positive so nothing is rectified away.
        assert!(envelope.onset.iter().all(|&v| v > 0.0));
        let max_diff = 0.5;
        for i in 1..envelope.rms.len() {
            let expected = (envelope.rms[i] - envelope.rms[i - 1]) / max_diff;
            assert!((envelope.onset[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn onset_rectifies_negative_differences_to_zero() {
        let envelope = finalize_envelope(vec![0.0, 1.0, 0.25, 0.5]);
        assert_eq!(envelope.onset[2], 0.0);
        assert!(envelope.onset[3] > 0.0);
    }

    #[test]
    fn silence_stays_all_zero() {
        let envelope = finalize_envelope(vec![0.0; 8]);
        assert!(envelope.rms.iter().all(|&v| v == 0.0));
        assert!(envelope.onset.iter().all(|&v| v == 0.0));
    }
}
