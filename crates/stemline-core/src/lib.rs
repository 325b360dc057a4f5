pub mod assets;
pub mod bands;
pub mod bpm;
pub mod diagnostics;
pub mod energy;
pub mod engine;
pub mod export;
pub mod fixtures;
pub mod mix;
pub mod model;
pub mod render;
pub mod spectrogram;
pub mod time;
pub mod transport;

pub use assets::{DecodedStem, StemFileEntry, decode_stem_file, load_stem_pcm, scan_stem_files};
pub use diagnostics::{
    TelemetryGuard, init_tracing, init_tracing_with_file_prefix, init_tracing_with_options,
};
pub use energy::EnergyEnvelope;
pub use engine::{Engine, EngineError, OutputBand};
pub use mix::LiveGraphSpec;
pub use model::{FilterPreset, LoopRegion, OutputBands, Stem, StemPcm};
pub use spectrogram::{ContrastRanges, SlotBins};
pub use transport::{ClickEvent, Clock, Metronome, MonotonicClock, PlaybackState, Transport};
