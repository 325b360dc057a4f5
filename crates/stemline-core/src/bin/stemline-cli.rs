use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use serde::Serialize;
use stemline_core::{
    Engine, diagnostics::init_tracing, energy::downsample_peaks, scan_stem_files,
};

#[derive(Debug, Parser)]
#[command(name = "stemline-cli")]
#[command(about = "Headless stem mix analysis: scan, analyze, bounce")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the audio files a directory would load as stems.
    Scan {
        stem_dir: PathBuf,
    },
    /// Load a stem folder, run the analysis passes, and print a report.
    Analyze {
        stem_dir: PathBuf,

        /// Write the JSON report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Seconds to wait for analysis passes to settle.
        #[arg(long, default_value_t = 300)]
        timeout_seconds: u64,
    },
    /// Render the audible mix through the output bands into a WAV file.
    Bounce {
        stem_dir: PathBuf,

        #[arg(long, default_value = "data/bounce.wav")]
        output: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct StemReport {
    name: String,
    duration_seconds: f64,
    channels: usize,
}

#[derive(Debug, Serialize)]
struct AnalysisReport {
    sample_rate: u32,
    total_duration_seconds: f64,
    detected_bpm: Option<u32>,
    energy_windows: usize,
    energy_peaks: Vec<f32>,
    cached_spectrogram_slots: usize,
    stems: Vec<StemReport>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_tracing(&cli.log_dir)?;

    match cli.command {
        Commands::Scan { stem_dir } => {
            let entries = scan_stem_files(&stem_dir)?;
            for entry in &entries {
                println!("{:>10}  {}", entry.size_bytes, entry.path);
            }
            tracing::info!(count = entries.len(), "scan complete");
        }
        Commands::Analyze {
            stem_dir,
            output,
            timeout_seconds,
        } => {
            let mut engine = load_engine(&stem_dir)?;
            if !engine.wait_for_analysis_idle(Duration::from_secs(timeout_seconds)) {
                tracing::warn!("analysis did not settle before the timeout");
            }

            let energy_peaks = engine
                .energy_envelope()
                .map(|envelope| downsample_peaks(&envelope.rms, envelope.rms.len().div_ceil(64)))
                .unwrap_or_default();
            let report = AnalysisReport {
                sample_rate: engine.sample_rate(),
                total_duration_seconds: engine.total_duration(),
                detected_bpm: engine.detected_bpm(),
                energy_windows: engine
                    .energy_envelope()
                    .map_or(0, stemline_core::EnergyEnvelope::window_count),
                energy_peaks,
                cached_spectrogram_slots: engine.cached_slot_count(),
                stems: engine
                    .stems()
                    .iter()
                    .map(|stem| StemReport {
                        name: stem.name.clone(),
                        duration_seconds: stem.duration_seconds(),
                        channels: stem.pcm.channels.len(),
                    })
                    .collect(),
            };

            let json = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, json)?;
                    tracing::info!(path = %path.display(), "analysis report written");
                }
                None => println!("{json}"),
            }
        }
        Commands::Bounce { stem_dir, output } => {
            let engine = load_engine(&stem_dir)?;
            stemline_core::export::bounce_mix_wav(
                engine.stems(),
                engine.sample_rate(),
                engine.total_duration(),
                engine.output_bands(),
                engine.master_volume(),
                &output,
            )?;
            tracing::info!(path = %output.display(), "bounce written");
        }
    }

    Ok(())
}

fn load_engine(stem_dir: &PathBuf) -> anyhow::Result<Engine> {
    let entries = scan_stem_files(stem_dir)?;
    if entries.is_empty() {
        anyhow::bail!("no supported audio files found in {}", stem_dir.display());
    }

    let paths: Vec<PathBuf> = entries.iter().map(|entry| PathBuf::from(&entry.path)).collect();
    let mut engine = Engine::default();
    let loaded = engine.load_stems(&paths)?;
    if loaded == 0 {
        anyhow::bail!("none of the files in {} could be decoded", stem_dir.display());
    }
    Ok(engine)
}
