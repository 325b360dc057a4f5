use std::ops::Range;

use crate::model::OutputBands;

/// Number of frequency bands in the note-centered analysis layout.
pub const BAND_COUNT: usize = 66;

/// Lowest band center: A0, the bottom key of a piano.
pub const PIANO_A0_HZ: f64 = 27.5;

/// Band edges for the 66-band piano-spaced layout.
///
/// Centers sit a semitone apart starting at A0; edges are the geometric
/// mean of adjacent centers, with the outermost edges extended half a
/// semitone past the first and last centers.
#[must_use]
pub fn band_edges() -> [f64; BAND_COUNT + 1] {
    let semitone = 2.0_f64.powf(1.0 / 12.0);
    let half_semitone = 2.0_f64.powf(1.0 / 24.0);
    let mut edges = [0.0; BAND_COUNT + 1];

    for i in 0..BAND_COUNT {
        let center = PIANO_A0_HZ * semitone.powi(i as i32);
        if i == 0 {
            edges[0] = center / half_semitone;
        }
        if i < BAND_COUNT - 1 {
            let next_center = PIANO_A0_HZ * semitone.powi(i as i32 + 1);
            edges[i + 1] = (center * next_center).sqrt();
        } else {
            edges[BAND_COUNT] = center * half_semitone;
        }
    }

    edges
}

#[must_use]
pub fn band_center(index: usize) -> f64 {
    PIANO_A0_HZ * 2.0_f64.powf(index as f64 / 12.0)
}

/// Crossover points splitting the band layout into equal thirds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThirdSplits {
    pub low_mid_hz: f64,
    pub mid_high_hz: f64,
    pub low_mid_band: usize,
    pub mid_high_band: usize,
}

#[must_use]
pub fn third_splits() -> ThirdSplits {
    let edges = band_edges();
    let low_mid_band = BAND_COUNT / 3;
    let mid_high_band = 2 * BAND_COUNT / 3;
    ThirdSplits {
        low_mid_hz: edges[low_mid_band],
        mid_high_hz: edges[mid_high_band],
        low_mid_band,
        mid_high_band,
    }
}

/// Display row range for the current output-band toggles.
///
/// Low+high with mid bypassed keeps the full range visible so the gap
/// reads as a gap rather than a rescaled axis.
#[must_use]
pub fn visible_band_window(bands: OutputBands) -> Range<usize> {
    let ThirdSplits {
        low_mid_band: i1,
        mid_high_band: i2,
        ..
    } = third_splits();

    match (bands.low_on, bands.mid_on, bands.high_on) {
        (true, false, true) | (true, true, true) | (false, false, false) => 0..BAND_COUNT,
        (true, true, false) => 0..i2,
        (false, true, true) => i1..BAND_COUNT,
        (true, false, false) => 0..i1,
        (false, true, false) => i1..i2,
        (false, false, true) => i2..BAND_COUNT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_are_strictly_increasing() {
        let edges = band_edges();
        for pair in edges.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn interior_edge_ratio_is_one_semitone() {
        let edges = band_edges();
        let semitone = 2.0_f64.powf(1.0 / 12.0);
        for b in 1..BAND_COUNT - 1 {
            let ratio = edges[b + 1] / edges[b];
            assert!((ratio - semitone).abs() < 1e-9, "band {b}: ratio {ratio}");
        }
    }

    #[test]
    fn third_splits_land_on_band_boundaries() {
        let splits = third_splits();
        assert_eq!(splits.low_mid_band, 22);
        assert_eq!(splits.mid_high_band, 44);
        assert!(splits.low_mid_hz > band_center(21));
        assert!(splits.mid_high_hz < band_center(45));
    }
}
