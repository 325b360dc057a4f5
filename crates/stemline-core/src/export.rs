use std::{fs, path::Path};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::{
    mix::{self, StemMix},
    model::{OutputBands, Stem},
    render,
};

/// Render the audible mix through the band-split graph into one mono
/// buffer covering the whole track, master gain applied.
#[instrument(skip(stems), fields(stems = stems.len(), total_duration))]
pub fn render_mix_samples(
    stems: &[Stem],
    sample_rate: u32,
    total_duration: f64,
    bands: OutputBands,
    master_volume: f32,
) -> Result<Vec<f32>> {
    let frame_count = (total_duration.max(0.0) * f64::from(sample_rate)).ceil() as usize;
    let snapshot: Vec<StemMix> = mix::mix_snapshot(stems);
    let mut rendered = render::render_band_split(&snapshot, sample_rate, 0.0, frame_count, bands)?;

    let gain = mix::master_gain(master_volume, stems);
    for frame in &mut rendered {
        *frame = (*frame * gain).clamp(-1.0, 1.0);
    }

    Ok(rendered)
}

/// Bounce the current mix to a 16-bit stereo WAV file.
#[instrument(skip(stems), fields(path = %path.display()))]
pub fn bounce_mix_wav(
    stems: &[Stem],
    sample_rate: u32,
    total_duration: f64,
    bands: OutputBands,
    master_volume: f32,
    path: &Path,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create wav output directory: {}",
                parent.display()
            )
        })?;
    }

    let rendered = render_mix_samples(stems, sample_rate, total_duration, bands, master_volume)?;
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create wav file: {}", path.display()))?;

    for sample in rendered {
        let quantized = (sample * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(quantized)
            .context("failed to write left channel sample")?;
        writer
            .write_sample(quantized)
            .context("failed to write right channel sample")?;
    }

    writer.finalize().context("failed to finalize wav file")?;
    info!("mix bounce completed");
    Ok(())
}
