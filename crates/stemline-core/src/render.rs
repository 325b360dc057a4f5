use anyhow::{Result, anyhow};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};
use tracing::instrument;

use crate::{
    bands,
    mix::{BAND_SPLIT_Q, STEM_FILTER_Q, StemMix},
    model::OutputBands,
};

/// Highpass cutoff isolating hi-hat/snare transients for tempo analysis.
pub const TRANSIENT_HIGHPASS_HZ: f32 = 3_000.0;

/// Mix audible stems down to one mono channel.
///
/// Applies per-stem gain and averages each stem's channels. Master gain
/// and equal-power compensation are playback-stage concerns and are not
/// applied to analysis renders.
#[must_use]
pub fn mix_down_mono(
    stems: &[StemMix],
    sample_rate: u32,
    start_seconds: f64,
    frame_count: usize,
) -> Vec<f32> {
    let mut out = vec![0.0_f32; frame_count];
    let start_sample = (start_seconds.max(0.0) * f64::from(sample_rate)).round() as usize;

    for stem in stems {
        let channel_count = stem.pcm.channels.len();
        if channel_count == 0 {
            continue;
        }

        let scale = stem.gain / channel_count as f32;
        for channel in &stem.pcm.channels {
            if start_sample >= channel.len() {
                continue;
            }
            let copy_len = (channel.len() - start_sample).min(frame_count);
            for (frame, sample) in out[..copy_len]
                .iter_mut()
                .zip(&channel[start_sample..start_sample + copy_len])
            {
                *frame += sample * scale;
            }
        }
    }

    out
}

/// Render the audible mix through the 3-band output split.
///
/// Low, mid, and high paths run in parallel (lowpass, highpass into
/// lowpass, highpass) and sum back with 0/1 band gains, matching the
/// live graph topology.
#[instrument(skip(stems), fields(stems = stems.len(), frame_count))]
pub fn render_band_split(
    stems: &[StemMix],
    sample_rate: u32,
    start_seconds: f64,
    frame_count: usize,
    bands: OutputBands,
) -> Result<Vec<f32>> {
    let mono = mix_down_mono(stems, sample_rate, start_seconds, frame_count);
    let splits = bands::third_splits();

    let mut low = FilterChain::new(
        sample_rate,
        &[(Type::LowPass, splits.low_mid_hz as f32, BAND_SPLIT_Q)],
    )?;
    let mut mid = FilterChain::new(
        sample_rate,
        &[
            (Type::HighPass, splits.low_mid_hz as f32, BAND_SPLIT_Q),
            (Type::LowPass, splits.mid_high_hz as f32, BAND_SPLIT_Q),
        ],
    )?;
    let mut high = FilterChain::new(
        sample_rate,
        &[(Type::HighPass, splits.mid_high_hz as f32, BAND_SPLIT_Q)],
    )?;

    let band_gain = |on: bool| if on { 1.0_f32 } else { 0.0 };
    let low_gain = band_gain(bands.low_on);
    let mid_gain = band_gain(bands.mid_on);
    let high_gain = band_gain(bands.high_on);

    let mut out = Vec::with_capacity(frame_count);
    for sample in mono {
        out.push(
            low.run(sample) * low_gain + mid.run(sample) * mid_gain + high.run(sample) * high_gain,
        );
    }

    Ok(out)
}

/// Render the audible mix through the transient-emphasis highpass used
/// by the tempo detector.
#[instrument(skip(stems), fields(stems = stems.len(), frame_count))]
pub fn render_transient_highpass(
    stems: &[StemMix],
    sample_rate: u32,
    frame_count: usize,
) -> Result<Vec<f32>> {
    let mono = mix_down_mono(stems, sample_rate, 0.0, frame_count);
    let mut highpass = FilterChain::new(
        sample_rate,
        &[(Type::HighPass, TRANSIENT_HIGHPASS_HZ, STEM_FILTER_Q)],
    )?;

    Ok(mono.into_iter().map(|sample| highpass.run(sample)).collect())
}

/// Biquad stages applied in series.
struct FilterChain {
    stages: Vec<DirectForm2Transposed<f32>>,
}

impl FilterChain {
    fn new(sample_rate: u32, stages: &[(Type<f32>, f32, f32)]) -> Result<Self> {
        let fs = (sample_rate.max(1) as f32).hz();
        let stages = stages
            .iter()
            .map(|&(kind, cutoff_hz, q)| {
                let coeffs = Coefficients::<f32>::from_params(kind, fs, cutoff_hz.hz(), q)
                    .map_err(|error| {
                        anyhow!("filter design failed at {cutoff_hz} Hz: {error:?}")
                    })?;
                Ok(DirectForm2Transposed::<f32>::new(coeffs))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    fn run(&mut self, sample: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(sample, |value, stage| stage.run(value))
    }
}
