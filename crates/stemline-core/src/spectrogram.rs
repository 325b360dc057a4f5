use std::{collections::BTreeMap, ops::Range};

use anyhow::Result;
use num_complex::Complex32;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    bands::{self, BAND_COUNT},
    mix::StemMix,
    model::OutputBands,
    render, time,
};

/// Lookahead kept warm ahead of the playhead while playing: 8 beats of
/// 1/12-beat slots.
pub const PLAY_LOOKAHEAD_SLOTS: u64 = 96;

/// Slots rendered per offline chunk: 4 beats.
pub const CHUNK_SLOTS: u64 = 48;

pub const MIN_FFT_SIZE: usize = 256;
pub const MAX_FFT_SIZE: usize = 4_096;

pub const DB_FLOOR: f32 = -110.0;
pub const DB_CEIL: f32 = -24.0;

/// Intensity bytes for one time slot, stamped with the mix revision
/// they were computed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBins {
    pub bins: Vec<u8>,
    pub revision: u64,
}

impl SlotBins {
    #[must_use]
    pub fn silent(revision: u64) -> Self {
        Self {
            bins: vec![0; BAND_COUNT],
            revision,
        }
    }
}

/// Slot-indexed spectrogram cache.
///
/// Entries are only computed forward from the playhead; slots behind it
/// survive mix edits because that audio has already been heard.
#[derive(Debug, Default)]
pub struct SlotCache {
    slots: BTreeMap<u64, SlotBins>,
}

impl SlotCache {
    #[must_use]
    pub fn get(&self, slot: u64) -> Option<&SlotBins> {
        self.slots.get(&slot)
    }

    pub fn insert(&mut self, slot: u64, bins: SlotBins) {
        self.slots.insert(slot, bins);
    }

    /// Drop every cached slot at or after `start_slot`.
    pub fn invalidate_from(&mut self, start_slot: u64) {
        self.slots.split_off(&start_slot);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// First slot in `[from, end)` that is missing or stamped with a
    /// stale revision.
    #[must_use]
    pub fn first_stale(&self, from: u64, end: u64, revision: u64) -> Option<u64> {
        (from..end).find(|slot| {
            self.slots
                .get(slot)
                .is_none_or(|cached| cached.revision != revision)
        })
    }
}

/// One forward computation chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkPlan {
    pub start_slot: u64,
    pub end_slot: u64,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

/// Pick the next chunk of stale-or-missing slots at or after the
/// current slot. While playing the scan is capped to a short lookahead
/// window; while paused it runs to the end of the track.
#[must_use]
pub fn plan_forward_chunk(
    cache: &SlotCache,
    revision: u64,
    current_seconds: f64,
    total_duration: f64,
    bpm: u32,
    playing: bool,
) -> Option<ChunkPlan> {
    let total_slots = time::total_slots(total_duration, bpm);
    let current_slot = time::time_to_slot(current_seconds.max(0.0), bpm);
    if total_slots == 0 || current_slot >= total_slots {
        return None;
    }

    let target_end = if playing {
        total_slots.min(current_slot + PLAY_LOOKAHEAD_SLOTS)
    } else {
        total_slots
    };

    let start_slot = cache.first_stale(current_slot, target_end, revision)?;
    let end_slot = target_end.min(start_slot + CHUNK_SLOTS);
    Some(ChunkPlan {
        start_slot,
        end_slot,
        start_seconds: time::slot_to_time(start_slot, bpm),
        end_seconds: time::slot_to_time(end_slot, bpm).min(total_duration),
    })
}

/// Render the audible mix for one chunk and compute each slot's bins.
#[instrument(skip(stems, plan), fields(start_slot = plan.start_slot, end_slot = plan.end_slot))]
pub fn compute_chunk(
    stems: &[StemMix],
    sample_rate: u32,
    bands: OutputBands,
    bpm: u32,
    revision: u64,
    plan: &ChunkPlan,
) -> Result<Vec<(u64, SlotBins)>> {
    let span_seconds = plan.end_seconds - plan.start_seconds;
    let frame_count = ((span_seconds * f64::from(sample_rate)).ceil() as usize).max(1);
    let rendered =
        render::render_band_split(stems, sample_rate, plan.start_seconds, frame_count, bands)?;
    Ok(slice_into_slots(&rendered, sample_rate, bpm, revision, plan))
}

/// Compute per-slot bins from an already rendered chunk.
#[must_use]
pub fn slice_into_slots(
    rendered: &[f32],
    sample_rate: u32,
    bpm: u32,
    revision: u64,
    plan: &ChunkPlan,
) -> Vec<(u64, SlotBins)> {
    let slot_duration = time::slot_duration(bpm);
    let span_seconds = plan.end_seconds - plan.start_seconds;
    let mut computer = BinComputer::new();
    let mut out = Vec::with_capacity((plan.end_slot - plan.start_slot) as usize);

    for slot in plan.start_slot..plan.end_slot {
        let local_start = (slot - plan.start_slot) as f64 * slot_duration;
        let local_end = ((slot - plan.start_slot + 1) as f64 * slot_duration).min(span_seconds);
        let i0 = (local_start * f64::from(sample_rate)).floor().max(0.0) as usize;
        let i1 = ((local_end * f64::from(sample_rate)).ceil() as usize)
            .min(rendered.len())
            .max(i0 + 1);

        let bins = computer.bins_for_range(rendered, sample_rate, i0, i1);
        out.push((slot, SlotBins { bins, revision }));
    }

    out
}

/// FFT workspace shared across the slots of one chunk.
pub struct BinComputer {
    planner: RealFftPlanner<f32>,
    edges: [f64; BAND_COUNT + 1],
}

impl Default for BinComputer {
    fn default() -> Self {
        Self::new()
    }
}

impl BinComputer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
            edges: bands::band_edges(),
        }
    }

    /// Band intensities for the sample range `[i0, i1)`.
    ///
    /// A Hann-windowed, zero-padded frame goes through a real FFT sized
    /// to the next power of two of the range (clamped to 256..=4096);
    /// each band averages the magnitudes of the FFT bins inside its
    /// edges, converted to an approximate dBFS value and mapped from
    /// [-110, -24] dB onto 0..=255.
    #[must_use]
    pub fn bins_for_range(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        i0: usize,
        i1: usize,
    ) -> Vec<u8> {
        let slot_samples = (i1.saturating_sub(i0)).max(32);
        let fft_size = slot_samples
            .next_power_of_two()
            .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);

        let fft = self.planner.plan_fft_forward(fft_size);
        let mut input = fft.make_input_vec();
        let mut spectrum: Vec<Complex32> = fft.make_output_vec();

        let len = slot_samples.min(fft_size);
        let mut window_sum = 0.0_f32;
        for i in 0..len {
            let x = samples.get(i0 + i).copied().unwrap_or(0.0);
            let phase = std::f32::consts::TAU * i as f32 / (len.saturating_sub(1).max(1)) as f32;
            let w = 0.5 * (1.0 - (phase).cos());
            input[i] = x * w;
            window_sum += w;
        }

        if fft.process(&mut input, &mut spectrum).is_err() {
            return vec![0; BAND_COUNT];
        }

        let nyquist = f64::from(sample_rate) / 2.0;
        let freq_resolution = f64::from(sample_rate) / fft_size as f64;
        let amp_norm = window_sum.max(1e-9);
        let mut out = vec![0_u8; BAND_COUNT];

        for (band, value) in out.iter_mut().enumerate() {
            let f_lo = self.edges[band].max(1.0);
            let f_hi = self.edges[band + 1].min(nyquist);
            if f_hi <= f_lo {
                continue;
            }

            let half = fft_size / 2;
            let k0 = ((f_lo / freq_resolution).floor() as usize).clamp(1, half - 1);
            let k1 = ((f_hi / freq_resolution).ceil() as usize).clamp(k0, half - 1);

            let mut sum_mag = 0.0_f32;
            for bin in &spectrum[k0..=k1] {
                sum_mag += bin.norm();
            }
            let avg_mag = sum_mag / (k1 - k0 + 1) as f32;

            let amp = 2.0 * avg_mag / amp_norm;
            let db = 20.0 * (amp + 1e-12).log10();
            let norm = ((db - DB_FLOOR) / (DB_CEIL - DB_FLOOR)).clamp(0.0, 1.0);
            *value = (norm * 255.0).round() as u8;
        }

        out
    }
}

/// Display clip ranges derived from the intensity histograms of the
/// visible slots: a broad global range plus a per-row range blended
/// 70/30 against it so quiet rows stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContrastRanges {
    pub global_lo: u8,
    pub global_hi: u8,
    pub row_lo: Vec<u8>,
    pub row_hi: Vec<u8>,
}

const GLOBAL_LO_PERCENTILE: f64 = 0.08;
const ROW_LO_PERCENTILE: f64 = 0.14;
const HI_PERCENTILE: f64 = 0.995;
const ROW_BLEND: f64 = 0.7;
const MIN_ROW_SAMPLES: u32 = 16;

#[must_use]
pub fn contrast_ranges(
    cache: &SlotCache,
    slot_range: Range<u64>,
    band_window: Range<usize>,
) -> ContrastRanges {
    let band_start = band_window.start.min(BAND_COUNT);
    let band_end = band_window.end.min(BAND_COUNT);

    let mut global_hist = [0_u32; 256];
    let mut row_hists = vec![[0_u32; 256]; BAND_COUNT];
    let mut row_counts = [0_u32; BAND_COUNT];
    let mut sample_count = 0_u64;

    for slot in slot_range {
        let Some(cell) = cache.get(slot) else {
            continue;
        };
        for y in band_start..band_end.min(cell.bins.len()) {
            let v = cell.bins[y] as usize;
            global_hist[v] += 1;
            row_hists[y][v] += 1;
            row_counts[y] += 1;
            sample_count += 1;
        }
    }

    let (mut global_lo, mut global_hi) = if sample_count > 0 {
        percentile_range(
            &global_hist,
            sample_count,
            GLOBAL_LO_PERCENTILE,
            HI_PERCENTILE,
        )
    } else {
        (0, 255)
    };
    if global_hi <= global_lo + 6 {
        global_lo = global_lo.saturating_sub(8);
        global_hi = (global_lo + 32).min(255);
    }

    let mut row_lo = vec![0_u8; BAND_COUNT];
    let mut row_hi = vec![0_u8; BAND_COUNT];
    for y in 0..BAND_COUNT {
        if row_counts[y] < MIN_ROW_SAMPLES {
            row_lo[y] = global_lo;
            row_hi[y] = global_hi;
            continue;
        }

        let (mut lo, mut hi) = percentile_range(
            &row_hists[y],
            u64::from(row_counts[y]),
            ROW_LO_PERCENTILE,
            HI_PERCENTILE,
        );
        if hi <= lo + 10 {
            lo = lo.saturating_sub(6);
            hi = (lo + 40).min(255);
        }

        // Blend with the global range to avoid overfitting single rows.
        row_lo[y] = blend(lo, global_lo);
        row_hi[y] = blend(hi, global_hi);
    }

    ContrastRanges {
        global_lo,
        global_hi,
        row_lo,
        row_hi,
    }
}

fn percentile_range(hist: &[u32; 256], count: u64, lo_pct: f64, hi_pct: f64) -> (u8, u8) {
    let lo_target = (count as f64 * lo_pct).floor() as u64;
    let hi_target = (count as f64 * hi_pct).floor() as u64;

    let mut lo = 0_u8;
    let mut acc = 0_u64;
    for (i, &n) in hist.iter().enumerate() {
        acc += u64::from(n);
        if acc >= lo_target {
            lo = i as u8;
            break;
        }
    }

    let mut hi = 255_u8;
    acc = 0;
    for (i, &n) in hist.iter().enumerate() {
        acc += u64::from(n);
        if acc >= hi_target {
            hi = i as u8;
            break;
        }
    }

    (lo, hi)
}

fn blend(row: u8, global: u8) -> u8 {
    (f64::from(row) * ROW_BLEND + f64::from(global) * (1.0 - ROW_BLEND)).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_cache(slots: u64, revision: u64) -> SlotCache {
        let mut cache = SlotCache::default();
        for slot in 0..slots {
            cache.insert(slot, SlotBins::silent(revision));
        }
        cache
    }

    #[test]
    fn invalidate_from_keeps_earlier_slots() {
        let mut cache = filled_cache(20, 1);
        cache.invalidate_from(10);
        assert!(cache.get(9).is_some());
        assert!(cache.get(10).is_none());
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn first_stale_skips_fresh_entries() {
        let mut cache = filled_cache(4, 2);
        cache.insert(2, SlotBins::silent(1));
        assert_eq!(cache.first_stale(0, 8, 2), Some(2));
        cache.insert(2, SlotBins::silent(2));
        assert_eq!(cache.first_stale(0, 4, 2), None);
        assert_eq!(cache.first_stale(0, 8, 2), Some(4));
    }

    #[test]
    fn playing_plan_caps_lookahead() {
        let cache = SlotCache::default();
        // 120 BPM: slot duration is 1/24 s, so 60 s holds 1440 slots.
        let plan = plan_forward_chunk(&cache, 1, 0.0, 60.0, 120, true)
            .expect("plan should exist for an empty cache");
        assert_eq!(plan.start_slot, 0);
        assert_eq!(plan.end_slot, CHUNK_SLOTS);

        let paused = plan_forward_chunk(&cache, 1, 59.9, 60.0, 120, false)
            .expect("plan should exist near the end while paused");
        assert!(paused.end_slot <= 1_440);
        assert!(paused.end_seconds <= 60.0);
    }

    #[test]
    fn caught_up_cache_yields_no_plan() {
        let cache = filled_cache(1_440, 7);
        assert_eq!(plan_forward_chunk(&cache, 7, 0.0, 60.0, 120, false), None);
    }

    #[test]
    fn tone_lands_in_matching_band() {
        let sample_rate = 8_000_u32;
        // Band 33 center: 27.5 * 2^(33/12) ≈ 185 Hz.
        let center = bands::band_center(33);
        let samples: Vec<f32> = (0..4_096)
            .map(|i| {
                (f64::from(i as u32) / f64::from(sample_rate) * center * std::f64::consts::TAU)
                    .sin() as f32
            })
            .collect();

        let mut computer = BinComputer::new();
        let bins = computer.bins_for_range(&samples, sample_rate, 0, 4_096);
        let peak_band = bins
            .iter()
            .enumerate()
            .max_by_key(|&(_, &v)| v)
            .map(|(band, _)| band)
            .expect("bins should not be empty");
        assert!(
            (32..=34).contains(&peak_band),
            "expected peak near band 33, got {peak_band}"
        );
        assert!(bins[peak_band] > 128);
    }

    #[test]
    fn contrast_widens_degenerate_ranges() {
        let cache = filled_cache(64, 1);
        let ranges = contrast_ranges(&cache, 0..64, 0..BAND_COUNT);
        // All-zero bins collapse the histogram; the widening rule keeps
        // a usable span.
        assert!(ranges.global_hi >= ranges.global_lo + 6);
        assert_eq!(ranges.row_lo.len(), BAND_COUNT);
    }
}
