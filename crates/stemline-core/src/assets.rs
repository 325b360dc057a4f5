use std::{collections::BTreeSet, fs::File, io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::model::StemPcm;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StemFileEntry {
    pub path: String,
    pub extension: String,
    pub size_bytes: u64,
}

/// Raw decode output before rate normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedStem {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

#[instrument(fields(path = %path.display()))]
pub fn decode_stem_file(path: &Path) -> Result<DecodedStem> {
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default audio track found in {}", path.display()))?;
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);
    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow::anyhow!(
                    "audio stream reset required for {}",
                    path.display()
                ));
            }
            Err(error) => return Err(error.into()),
        };

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => {
                continue;
            }
            Err(error) => return Err(error.into()),
        };

        sample_rate = decoded.spec().rate;
        push_channel_samples(decoded, &mut channels);
    }

    if channels.iter().all(Vec::is_empty) {
        return Err(anyhow::anyhow!(
            "decoded zero samples from {}",
            path.display()
        ));
    }

    debug!(
        sample_rate,
        channels = channels.len(),
        frames = channels.first().map_or(0, Vec::len),
        "audio decode complete"
    );

    Ok(DecodedStem {
        sample_rate,
        channels,
    })
}

/// Decode a stem and normalize it to the mix sample rate.
#[instrument(fields(path = %path.display(), target_rate))]
pub fn load_stem_pcm(path: &Path, target_rate: Option<u32>) -> Result<StemPcm> {
    let decoded = decode_stem_file(path)?;
    let target_rate = target_rate.unwrap_or(decoded.sample_rate);

    if decoded.sample_rate == target_rate {
        return Ok(StemPcm {
            sample_rate: target_rate,
            channels: decoded.channels,
        });
    }

    warn!(
        source_rate = decoded.sample_rate,
        target_rate, "stem sample rate differs from mix rate, resampling"
    );
    let ratio = f64::from(target_rate) / f64::from(decoded.sample_rate);
    let channels = decoded
        .channels
        .into_iter()
        .map(|channel| {
            let output_len = (channel.len() as f64 * ratio).round() as usize;
            resample_linear(&channel, output_len)
        })
        .collect();

    Ok(StemPcm {
        sample_rate: target_rate,
        channels,
    })
}

#[instrument(fields(directory = %directory.display()))]
pub fn scan_stem_files(directory: &Path) -> Result<Vec<StemFileEntry>> {
    if !directory.is_dir() {
        return Err(anyhow::anyhow!(
            "stem path is not a directory: {}",
            directory.display()
        ));
    }

    let extensions = supported_audio_extensions();
    let mut entries = Vec::new();

    for entry in WalkDir::new(directory).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(?error, "ignoring unreadable entry while scanning stems");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let extension = entry
            .path()
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value.to_ascii_lowercase());
        let Some(extension) = extension else {
            continue;
        };
        if !extensions.contains(extension.as_str()) {
            continue;
        }

        let size_bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        entries.push(StemFileEntry {
            path: entry.path().display().to_string(),
            extension,
            size_bytes,
        });
    }

    entries.sort_by(|left, right| left.path.cmp(&right.path));
    debug!(count = entries.len(), "stem scan complete");
    Ok(entries)
}

fn push_channel_samples(
    decoded: symphonia::core::audio::AudioBufferRef<'_>,
    channels: &mut Vec<Vec<f32>>,
) {
    let spec = *decoded.spec();
    let channel_count = spec.channels.count().max(1);
    if channels.len() < channel_count {
        channels.resize_with(channel_count, Vec::new);
    }

    let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    sample_buffer.copy_interleaved_ref(decoded);

    for frame in sample_buffer.samples().chunks(channel_count) {
        for (channel, sample) in channels.iter_mut().zip(frame.iter()) {
            channel.push(*sample);
        }
    }
}

/// Linear-interpolation resampling of one mono channel.
#[must_use]
pub fn resample_linear(input: &[f32], output_len: usize) -> Vec<f32> {
    if input.is_empty() || output_len == 0 {
        return Vec::new();
    }
    if input.len() == 1 {
        return vec![input[0]; output_len];
    }

    let ratio = (input.len() - 1) as f64 / (output_len.max(2) - 1) as f64;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;

        if idx + 1 < input.len() {
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
        } else {
            output.push(input[input.len() - 1]);
        }
    }

    output
}

fn supported_audio_extensions() -> BTreeSet<&'static str> {
    ["mp3", "wav", "ogg", "flac", "aac", "m4a", "webm"]
        .into_iter()
        .collect()
}
