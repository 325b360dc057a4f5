/// Spectrogram slots subdivide each beat; one slot is 1/12 beat.
pub const SLOTS_PER_BEAT: u32 = 12;

#[must_use]
pub fn beat_duration(bpm: u32) -> f64 {
    60.0 / f64::from(bpm.max(1))
}

#[must_use]
pub fn beats_to_seconds(beat: u64, bpm: u32) -> f64 {
    beat as f64 * beat_duration(bpm)
}

#[must_use]
pub fn slot_duration(bpm: u32) -> f64 {
    beat_duration(bpm) / f64::from(SLOTS_PER_BEAT)
}

#[must_use]
pub fn time_to_slot(seconds: f64, bpm: u32) -> u64 {
    if seconds <= 0.0 {
        return 0;
    }

    (seconds / slot_duration(bpm)).floor() as u64
}

#[must_use]
pub fn slot_to_time(slot: u64, bpm: u32) -> f64 {
    slot as f64 * slot_duration(bpm)
}

#[must_use]
pub fn total_slots(duration_seconds: f64, bpm: u32) -> u64 {
    if duration_seconds <= 0.0 {
        return 0;
    }

    (duration_seconds / slot_duration(bpm)).ceil() as u64
}

#[must_use]
pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    if seconds <= 0.0 || sample_rate == 0 {
        return 0;
    }

    (seconds * f64::from(sample_rate)).floor() as usize
}

/// Snap an arbitrary time to the nearest whole beat, clamped to the track.
#[must_use]
pub fn snap_time_to_beat(seconds: f64, bpm: u32, duration_seconds: f64) -> u64 {
    let beat_dur = beat_duration(bpm);
    let beat = (seconds / beat_dur).round().max(0.0) as u64;
    let last_beat = (duration_seconds / beat_dur).ceil().max(0.0) as u64;
    beat.min(last_beat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_round_trip_is_stable() {
        let bpm = 128;
        let slot = 1_234;
        let seconds = slot_to_time(slot, bpm);
        assert_eq!(time_to_slot(seconds + 1e-9, bpm), slot);
    }

    #[test]
    fn slot_duration_is_a_twelfth_of_a_beat() {
        assert!((slot_duration(120) - 0.5 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn beat_snapping_clamps_to_track_end() {
        // 4 s at 120 BPM holds exactly 8 beats.
        assert_eq!(snap_time_to_beat(1.26, 120, 4.0), 3);
        assert_eq!(snap_time_to_beat(99.0, 120, 4.0), 8);
        assert_eq!(snap_time_to_beat(-1.0, 120, 4.0), 0);
    }
}
