use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    assets, bands, bpm as bpm_detector,
    energy::{self, EnergyEnvelope},
    mix::{self, LiveGraphSpec},
    model::{
        DEFAULT_MASTER_VOLUME, FilterPreset, LoopRegion, MAX_FILTER_HZ, MIN_FILTER_HZ,
        OutputBands, Stem,
    },
    spectrogram::{self, ChunkPlan, ContrastRanges, SlotBins, SlotCache},
    time,
    transport::{
        ClickEvent, Clock, LOOK_AHEAD_INTERVAL_SECONDS, LOOP_CHECK_INTERVAL_SECONDS, Metronome,
        MonotonicClock, PlaybackState, Transport, loop_wrap_target,
    },
};

/// Coalescing window for energy recomputation after mix edits.
pub const ENERGY_DEBOUNCE_SECONDS: f64 = 0.08;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("stem not found: {0}")]
    StemNotFound(Uuid),
    #[error("no stems loaded")]
    NoStemsLoaded,
    #[error("invalid loop range {start_beat}..{end_beat}")]
    InvalidLoopRange { start_beat: u64, end_beat: u64 },
    #[error("bpm must be positive")]
    InvalidBpm,
    #[error("invalid filter range {low_hz}..{high_hz}")]
    InvalidFilterRange { low_hz: f32, high_hz: f32 },
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputBand {
    Low,
    Mid,
    High,
}

/// Completed analysis pass, published by a worker thread.
enum PassResult {
    Spectrogram {
        token: u64,
        revision: u64,
        slots: Vec<(u64, SlotBins)>,
        error: Option<String>,
    },
    Energy {
        revision: u64,
        envelope: Option<EnergyEnvelope>,
        error: Option<String>,
    },
    Bpm {
        bpm: Option<u32>,
        error: Option<String>,
    },
}

/// The engine context: every piece of mutable mix, transport, and
/// analysis state lives here, mutated from one logical control thread.
/// Long-running analysis passes run on worker threads against
/// immutable snapshots and publish back through a channel drained by
/// `tick`.
pub struct Engine {
    clock: Arc<dyn Clock>,
    stems: Vec<Stem>,
    sample_rate: u32,
    total_duration: f64,
    master_volume: f32,
    bands: OutputBands,
    mix_revision: u64,
    transport: Transport,
    metronome: Metronome,
    loop_region: LoopRegion,
    slot_cache: SlotCache,
    energy: Option<EnergyEnvelope>,
    detected_bpm: Option<u32>,
    spectro_epoch: Arc<AtomicU64>,
    spectro_in_flight: bool,
    energy_in_flight: bool,
    energy_dirty_at: Option<f64>,
    bpm_in_flight: bool,
    results_tx: Sender<PassResult>,
    results_rx: Receiver<PassResult>,
    last_loop_check: f64,
    last_metronome_tick: f64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicClock::new()))
    }
}

impl Engine {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (results_tx, results_rx) = unbounded();
        Self {
            clock,
            stems: Vec::new(),
            sample_rate: 0,
            total_duration: 0.0,
            master_volume: DEFAULT_MASTER_VOLUME,
            bands: OutputBands::default(),
            mix_revision: 0,
            transport: Transport::new(),
            metronome: Metronome::new(),
            loop_region: LoopRegion::default(),
            slot_cache: SlotCache::default(),
            energy: None,
            detected_bpm: None,
            spectro_epoch: Arc::new(AtomicU64::new(0)),
            spectro_in_flight: false,
            energy_in_flight: false,
            energy_dirty_at: None,
            bpm_in_flight: false,
            results_tx,
            results_rx,
            last_loop_check: 0.0,
            last_metronome_tick: 0.0,
        }
    }

    // ----- accessors -------------------------------------------------

    #[must_use]
    pub fn stems(&self) -> &[Stem] {
        &self.stems
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    #[must_use]
    pub fn mix_revision(&self) -> u64 {
        self.mix_revision
    }

    #[must_use]
    pub fn output_bands(&self) -> OutputBands {
        self.bands
    }

    #[must_use]
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    #[must_use]
    pub fn bpm(&self) -> u32 {
        self.metronome.bpm
    }

    #[must_use]
    pub fn detected_bpm(&self) -> Option<u32> {
        self.detected_bpm
    }

    #[must_use]
    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    #[must_use]
    pub fn playback_state(&self) -> PlaybackState {
        self.transport.state()
    }

    #[must_use]
    pub fn playback_rate(&self) -> f64 {
        self.transport.playback_rate()
    }

    #[must_use]
    pub fn current_track_time(&self) -> f64 {
        self.transport.current_time(self.clock.now())
    }

    #[must_use]
    pub fn spectrogram_slot(&self, slot: u64) -> Option<&SlotBins> {
        self.slot_cache.get(slot)
    }

    #[must_use]
    pub fn cached_slot_count(&self) -> usize {
        self.slot_cache.len()
    }

    #[must_use]
    pub fn energy_envelope(&self) -> Option<&EnergyEnvelope> {
        self.energy.as_ref()
    }

    /// The logical graph the external audio renderer must realize for
    /// live playback of the current mix.
    #[must_use]
    pub fn live_graph(&self) -> LiveGraphSpec {
        mix::live_graph(
            &self.stems,
            self.master_volume,
            self.bands,
            self.transport.playback_rate(),
        )
    }

    #[must_use]
    pub fn visible_band_window(&self) -> std::ops::Range<usize> {
        bands::visible_band_window(self.bands)
    }

    #[must_use]
    pub fn contrast_ranges(&self, slot_range: std::ops::Range<u64>) -> ContrastRanges {
        spectrogram::contrast_ranges(&self.slot_cache, slot_range, self.visible_band_window())
    }

    // ----- loading ---------------------------------------------------

    /// Replace the loaded stem set wholesale. Files that fail to decode
    /// are skipped; the rest load at the first stem's sample rate.
    #[instrument(skip(self, paths), fields(files = paths.len()))]
    pub fn load_stems(&mut self, paths: &[PathBuf]) -> Result<usize, EngineError> {
        let mut stems = Vec::new();
        let mut mix_rate = 0_u32;

        for path in paths {
            let target_rate = (mix_rate != 0).then_some(mix_rate);
            match assets::load_stem_pcm(path, target_rate) {
                Ok(pcm) => {
                    if mix_rate == 0 {
                        mix_rate = pcm.sample_rate;
                    }
                    stems.push(Stem::new(stem_name(path), Arc::new(pcm)));
                }
                Err(error) => {
                    warn!(path = %path.display(), ?error, "skipping undecodable stem");
                }
            }
        }

        Ok(self.load_stem_set(stems))
    }

    /// Install already decoded stems, replacing the current set.
    #[instrument(skip(self, stems), fields(stems = stems.len()))]
    pub fn load_stem_set(&mut self, stems: Vec<Stem>) -> usize {
        self.stop();
        self.reset_analysis_state();
        self.sample_rate = stems.first().map_or(0, |stem| stem.pcm.sample_rate);
        self.stems = stems
            .into_iter()
            .map(|stem| self.conform_stem_rate(stem))
            .collect();

        self.total_duration = self
            .stems
            .iter()
            .map(Stem::duration_seconds)
            .fold(0.0, f64::max);
        self.transport.set_total_duration(self.total_duration);

        info!(
            stems = self.stems.len(),
            sample_rate = self.sample_rate,
            total_duration = self.total_duration,
            "stems loaded"
        );

        if !self.stems.is_empty() {
            // Immediate recompute on load; the debounce only matters for
            // bursts of mix edits.
            self.energy_dirty_at = Some(self.clock.now());
            self.request_bpm_detection();
        }

        self.stems.len()
    }

    fn conform_stem_rate(&self, mut stem: Stem) -> Stem {
        let source_rate = stem.pcm.sample_rate;
        if source_rate == self.sample_rate || self.sample_rate == 0 {
            return stem;
        }

        warn!(
            stem = %stem.name,
            source_rate,
            mix_rate = self.sample_rate,
            "resampling stem to the mix rate"
        );
        let ratio = f64::from(self.sample_rate) / f64::from(source_rate);
        let channels = stem
            .pcm
            .channels
            .iter()
            .map(|channel| {
                let output_len = (channel.len() as f64 * ratio).round() as usize;
                assets::resample_linear(channel, output_len)
            })
            .collect();
        stem.pcm = Arc::new(crate::model::StemPcm {
            sample_rate: self.sample_rate,
            channels,
        });
        stem
    }

    // ----- mix mutators ----------------------------------------------

    #[instrument(skip(self), fields(stem_id = %stem_id, volume))]
    pub fn set_volume(&mut self, stem_id: Uuid, volume: f32) -> Result<(), EngineError> {
        self.stem_mut(stem_id)?.volume = volume.clamp(0.0, 1.0);
        self.mix_state_changed();
        Ok(())
    }

    #[instrument(skip(self), fields(stem_id = %stem_id, muted))]
    pub fn set_mute(&mut self, stem_id: Uuid, muted: bool) -> Result<(), EngineError> {
        self.stem_mut(stem_id)?.muted = muted;
        self.mix_state_changed();
        Ok(())
    }

    #[instrument(skip(self), fields(stem_id = %stem_id, solo))]
    pub fn set_solo(&mut self, stem_id: Uuid, solo: bool) -> Result<(), EngineError> {
        self.stem_mut(stem_id)?.solo = solo;
        self.mix_state_changed();
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn mute_all(&mut self) {
        for stem in &mut self.stems {
            stem.muted = true;
        }
        self.mix_state_changed();
    }

    #[instrument(skip(self))]
    pub fn unmute_all(&mut self) {
        for stem in &mut self.stems {
            stem.muted = false;
        }
        self.mix_state_changed();
    }

    #[instrument(skip(self))]
    pub fn clear_solo(&mut self) {
        for stem in &mut self.stems {
            stem.solo = false;
        }
        self.mix_state_changed();
    }

    #[instrument(skip(self), fields(stem_id = %stem_id, enabled))]
    pub fn set_stem_filter_enabled(
        &mut self,
        stem_id: Uuid,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.stem_mut(stem_id)?.filter_on = enabled;
        self.mix_state_changed();
        Ok(())
    }

    #[instrument(skip(self), fields(stem_id = %stem_id, low_hz, high_hz))]
    pub fn set_stem_filter_range(
        &mut self,
        stem_id: Uuid,
        low_hz: f32,
        high_hz: f32,
    ) -> Result<(), EngineError> {
        if !(MIN_FILTER_HZ..=MAX_FILTER_HZ).contains(&low_hz) || high_hz < low_hz {
            return Err(EngineError::InvalidFilterRange { low_hz, high_hz });
        }

        let stem = self.stem_mut(stem_id)?;
        stem.low_freq_hz = low_hz;
        stem.high_freq_hz = high_hz.min(MAX_FILTER_HZ);
        self.mix_state_changed();
        Ok(())
    }

    #[instrument(skip(self), fields(stem_id = %stem_id, preset = ?preset))]
    pub fn apply_filter_preset(
        &mut self,
        stem_id: Uuid,
        preset: FilterPreset,
    ) -> Result<(), EngineError> {
        let (low_hz, high_hz) = preset.range_hz();
        let stem = self.stem_mut(stem_id)?;
        stem.filter_on = true;
        stem.low_freq_hz = low_hz;
        stem.high_freq_hz = high_hz;
        self.mix_state_changed();
        Ok(())
    }

    #[instrument(skip(self), fields(band = ?band, enabled))]
    pub fn set_output_band_enabled(&mut self, band: OutputBand, enabled: bool) {
        match band {
            OutputBand::Low => self.bands.low_on = enabled,
            OutputBand::Mid => self.bands.mid_on = enabled,
            OutputBand::High => self.bands.high_on = enabled,
        }
        self.mix_state_changed();
    }

    /// Master volume shapes playback only, never analysis, so it does
    /// not touch the mix revision.
    #[instrument(skip(self), fields(volume))]
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    // ----- tempo & metronome -----------------------------------------

    /// Changing tempo changes slot geometry, so the whole cache is
    /// rebuilt rather than invalidated forward.
    #[instrument(skip(self), fields(bpm))]
    pub fn set_bpm(&mut self, bpm: u32) -> Result<(), EngineError> {
        if bpm == 0 {
            return Err(EngineError::InvalidBpm);
        }

        self.metronome.bpm = bpm;
        self.slot_cache.clear();
        self.spectro_epoch.fetch_add(1, Ordering::SeqCst);
        info!("tempo changed, spectrogram cache rebuilt");
        Ok(())
    }

    #[instrument(skip(self), fields(beats_per_measure, beat_unit))]
    pub fn set_time_signature(&mut self, beats_per_measure: u32, beat_unit: u32) {
        self.metronome.beats_per_measure = beats_per_measure.max(1);
        self.metronome.beat_unit = beat_unit.max(1);
    }

    #[instrument(skip(self), fields(enabled))]
    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.metronome.enabled = enabled;
        if enabled && self.transport.is_playing() {
            self.metronome.start(self.clock.now());
        }
    }

    /// Kick off tempo detection on the audible mix. Coalesced: a pass
    /// already in flight absorbs the request.
    #[instrument(skip(self))]
    pub fn request_bpm_detection(&mut self) {
        if self.bpm_in_flight || self.stems.is_empty() {
            return;
        }
        self.bpm_in_flight = true;

        let stems = mix::mix_snapshot(&self.stems);
        let sample_rate = self.sample_rate;
        let total_duration = self.total_duration;
        let tx = self.results_tx.clone();
        std::thread::spawn(move || {
            let result = bpm_detector::detect_bpm(&stems, sample_rate, total_duration);
            let message = match result {
                Ok(bpm) => PassResult::Bpm { bpm, error: None },
                Err(error) => PassResult::Bpm {
                    bpm: None,
                    error: Some(error.to_string()),
                },
            };
            let _ = tx.send(message);
        });
    }

    // ----- transport -------------------------------------------------

    #[instrument(skip(self))]
    pub fn play(&mut self) {
        if self.stems.is_empty() {
            return;
        }
        let now = self.clock.now();
        self.transport.play(now);
        self.last_loop_check = now;
        self.last_metronome_tick = now;
        if self.metronome.enabled {
            self.metronome.start(now);
        }
        info!("playback started");
    }

    #[instrument(skip(self))]
    pub fn pause(&mut self) {
        self.transport.pause(self.clock.now());
        info!("playback paused");
    }

    #[instrument(skip(self))]
    pub fn stop(&mut self) {
        self.transport.stop();
        info!("playback stopped");
    }

    /// Seek to an absolute track time. Forward caches re-validate on
    /// the next tick because the scan starts from the new playhead.
    #[instrument(skip(self), fields(seconds))]
    pub fn seek(&mut self, seconds: f64) {
        let now = self.clock.now();
        self.transport.seek(seconds, now);
        if self.transport.is_playing() && self.metronome.enabled {
            self.metronome.start(now);
        }
        debug!(position = self.transport.current_time(now), "seek applied");
    }

    #[instrument(skip(self), fields(rate))]
    pub fn set_playback_rate(&mut self, rate: f64) {
        self.transport.set_playback_rate(rate, self.clock.now());
    }

    // ----- loop region -----------------------------------------------

    /// Beat-click loop building: arm a start, then an end; a click at
    /// or before the armed start moves it, a click with both set
    /// re-arms.
    #[instrument(skip(self), fields(beat))]
    pub fn toggle_loop_beat(&mut self, beat: u64) {
        self.loop_region = match (self.loop_region.start_beat, self.loop_region.end_beat) {
            (None, _) => LoopRegion {
                start_beat: Some(beat),
                end_beat: None,
            },
            (Some(start), None) if beat <= start => LoopRegion {
                start_beat: Some(beat),
                end_beat: None,
            },
            (Some(start), None) => LoopRegion {
                start_beat: Some(start),
                end_beat: Some(beat),
            },
            (Some(_), Some(_)) => LoopRegion {
                start_beat: Some(beat),
                end_beat: None,
            },
        };
        debug!(region = ?self.loop_region, "loop region updated");
    }

    #[instrument(skip(self), fields(start_beat, end_beat))]
    pub fn set_loop_region(&mut self, start_beat: u64, end_beat: u64) -> Result<(), EngineError> {
        if end_beat <= start_beat {
            return Err(EngineError::InvalidLoopRange {
                start_beat,
                end_beat,
            });
        }

        self.loop_region = LoopRegion {
            start_beat: Some(start_beat),
            end_beat: Some(end_beat),
        };
        info!("loop region set");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn clear_loop(&mut self) {
        self.loop_region = LoopRegion::default();
    }

    /// Snap an arbitrary time to the nearest beat for loop building.
    #[must_use]
    pub fn snap_time_to_beat(&self, seconds: f64) -> u64 {
        time::snap_time_to_beat(seconds, self.metronome.bpm, self.total_duration)
    }

    // ----- cooperative scheduling ------------------------------------

    /// Drive the engine from the host's frame loop. Drains finished
    /// analysis passes, enforces end-of-track and loop boundaries,
    /// schedules metronome clicks, and keeps the spectrogram cache
    /// filling forward. Returns the clicks to hand to the audio
    /// renderer.
    pub fn tick(&mut self) -> Vec<ClickEvent> {
        let now = self.clock.now();
        self.drain_pass_results();

        if self.transport.is_playing()
            && self.total_duration > 0.0
            && self.transport.current_time(now) >= self.total_duration
        {
            if let Some((start_beat, _)) = self.loop_region.active() {
                self.seek(time::beats_to_seconds(start_beat, self.metronome.bpm));
            } else {
                self.stop();
            }
        }

        if self.transport.is_playing() && now - self.last_loop_check >= LOOP_CHECK_INTERVAL_SECONDS
        {
            self.last_loop_check = now;
            let current = self.transport.current_time(now);
            if let Some(target) = loop_wrap_target(self.loop_region, self.metronome.bpm, current) {
                self.seek(target);
            }
        }

        let mut clicks = Vec::new();
        if self.metronome.enabled
            && self.transport.is_playing()
            && now - self.last_metronome_tick >= LOOK_AHEAD_INTERVAL_SECONDS
        {
            self.last_metronome_tick = now;
            clicks = self.metronome.schedule(&self.transport, now);
        }

        if let Some(deadline) = self.energy_dirty_at {
            if now >= deadline && !self.energy_in_flight {
                self.energy_dirty_at = None;
                self.spawn_energy_pass();
            }
        }

        self.advance_spectrogram();
        clicks
    }

    /// Block until no analysis pass is in flight and the spectrogram is
    /// caught up with its lookahead target. Used by headless front ends
    /// and tests; playback stays live because track time derives from
    /// the clock, not from ticking.
    pub fn wait_for_analysis_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.tick();
            if self.analysis_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[must_use]
    pub fn analysis_idle(&self) -> bool {
        !self.spectro_in_flight
            && !self.energy_in_flight
            && !self.bpm_in_flight
            && self.energy_dirty_at.is_none()
            && self.next_chunk_plan().is_none()
    }

    // ----- internals -------------------------------------------------

    fn stem_mut(&mut self, stem_id: Uuid) -> Result<&mut Stem, EngineError> {
        self.stems
            .iter_mut()
            .find(|stem| stem.id == stem_id)
            .ok_or(EngineError::StemNotFound(stem_id))
    }

    /// Every mutation that changes the audible signal funnels through
    /// here: bump the revision, drop forward slots, debounce an energy
    /// recompute.
    fn mix_state_changed(&mut self) {
        self.mix_revision += 1;
        let now = self.clock.now();

        if self.total_duration > 0.0 {
            let current_slot =
                time::time_to_slot(self.transport.current_time(now), self.metronome.bpm);
            self.slot_cache.invalidate_from(current_slot);
        }

        self.energy_dirty_at = Some(now + ENERGY_DEBOUNCE_SECONDS);
        debug!(
            revision = self.mix_revision,
            "mix state changed, forward caches invalidated"
        );
    }

    fn reset_analysis_state(&mut self) {
        self.slot_cache.clear();
        self.spectro_epoch.fetch_add(1, Ordering::SeqCst);
        self.energy = None;
        self.energy_dirty_at = None;
        self.detected_bpm = None;
        self.total_duration = 0.0;
        self.transport.set_total_duration(0.0);
        self.loop_region = LoopRegion::default();
    }

    fn next_chunk_plan(&self) -> Option<ChunkPlan> {
        if self.stems.is_empty() || self.total_duration <= 0.0 {
            return None;
        }

        spectrogram::plan_forward_chunk(
            &self.slot_cache,
            self.mix_revision,
            self.transport.current_time(self.clock.now()),
            self.total_duration,
            self.metronome.bpm,
            self.transport.is_playing(),
        )
    }

    fn advance_spectrogram(&mut self) {
        if self.spectro_in_flight {
            return;
        }
        let Some(plan) = self.next_chunk_plan() else {
            return;
        };

        let stems = mix::mix_snapshot(&self.stems);
        let revision = self.mix_revision;

        // Nothing audible: fill the chunk with silent bins directly.
        if stems.is_empty() {
            for slot in plan.start_slot..plan.end_slot {
                self.slot_cache.insert(slot, SlotBins::silent(revision));
            }
            return;
        }

        let token = self.spectro_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.spectro_in_flight = true;

        let sample_rate = self.sample_rate;
        let bands = self.bands;
        let bpm = self.metronome.bpm;
        let epoch = Arc::clone(&self.spectro_epoch);
        let tx = self.results_tx.clone();
        std::thread::spawn(move || {
            let outcome = spectrogram::compute_chunk(&stems, sample_rate, bands, bpm, revision, &plan);
            let message = match outcome {
                // A newer pass owns the cache now; publish an empty,
                // already-stale result so the in-flight flag clears.
                Ok(_) if epoch.load(Ordering::SeqCst) != token => PassResult::Spectrogram {
                    token,
                    revision,
                    slots: Vec::new(),
                    error: None,
                },
                Ok(slots) => PassResult::Spectrogram {
                    token,
                    revision,
                    slots,
                    error: None,
                },
                Err(error) => PassResult::Spectrogram {
                    token,
                    revision,
                    slots: Vec::new(),
                    error: Some(error.to_string()),
                },
            };
            let _ = tx.send(message);
        });
    }

    fn spawn_energy_pass(&mut self) {
        if self.stems.is_empty() || self.total_duration <= 0.0 {
            self.energy = None;
            return;
        }
        self.energy_in_flight = true;

        let stems = mix::mix_snapshot(&self.stems);
        let sample_rate = self.sample_rate;
        let total_duration = self.total_duration;
        let bands = self.bands;
        let revision = self.mix_revision;
        let tx = self.results_tx.clone();
        std::thread::spawn(move || {
            let outcome = energy::compute_energy(&stems, sample_rate, total_duration, bands);
            let message = match outcome {
                Ok(envelope) => PassResult::Energy {
                    revision,
                    envelope,
                    error: None,
                },
                Err(error) => PassResult::Energy {
                    revision,
                    envelope: None,
                    error: Some(error.to_string()),
                },
            };
            let _ = tx.send(message);
        });
    }

    fn drain_pass_results(&mut self) {
        while let Ok(result) = self.results_rx.try_recv() {
            match result {
                PassResult::Spectrogram {
                    token,
                    revision,
                    slots,
                    error,
                } => {
                    self.spectro_in_flight = false;
                    if let Some(error) = error {
                        // Cache stays unfilled here; the next tick
                        // plans the same chunk again.
                        warn!(%error, "spectrogram chunk render failed");
                        continue;
                    }
                    if token != self.spectro_epoch.load(Ordering::SeqCst) {
                        debug!(token, "discarding superseded spectrogram pass");
                        continue;
                    }
                    if revision != self.mix_revision {
                        debug!(revision, "discarding stale-revision spectrogram pass");
                        continue;
                    }
                    for (slot, bins) in slots {
                        self.slot_cache.insert(slot, bins);
                    }
                }
                PassResult::Energy {
                    revision,
                    envelope,
                    error,
                } => {
                    self.energy_in_flight = false;
                    if let Some(error) = error {
                        warn!(%error, "energy analysis failed");
                        continue;
                    }
                    if revision != self.mix_revision {
                        debug!(revision, "discarding stale-revision energy envelope");
                        continue;
                    }
                    self.energy = envelope;
                }
                PassResult::Bpm { bpm, error } => {
                    self.bpm_in_flight = false;
                    if let Some(error) = error {
                        warn!(%error, "tempo detection failed");
                        continue;
                    }
                    if let Some(bpm) = bpm {
                        info!(bpm, "tempo detected");
                        self.detected_bpm = Some(bpm);
                        self.metronome.bpm = bpm;
                        self.slot_cache.clear();
                        self.spectro_epoch.fetch_add(1, Ordering::SeqCst);
                    } else {
                        self.detected_bpm = None;
                    }
                }
            }
        }
    }
}

fn stem_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("stem")
        .to_string()
}
