use proptest::prelude::*;
use stemline_core::{
    OutputBands,
    bands::{BAND_COUNT, PIANO_A0_HZ, band_edges, third_splits, visible_band_window},
};

#[test]
fn edges_bracket_the_piano_anchor() {
    let edges = band_edges();
    assert!(edges[0] < PIANO_A0_HZ);
    assert!(edges[1] > PIANO_A0_HZ);
    assert_eq!(edges.len(), BAND_COUNT + 1);
}

#[test]
fn outer_edges_extend_half_a_semitone() {
    let edges = band_edges();
    let half_semitone = 2.0_f64.powf(1.0 / 24.0);
    assert!((edges[0] * half_semitone - PIANO_A0_HZ).abs() < 1e-9);

    let top_center = PIANO_A0_HZ * 2.0_f64.powf((BAND_COUNT as f64 - 1.0) / 12.0);
    assert!((edges[BAND_COUNT] / half_semitone - top_center).abs() < 1e-6);
}

#[test]
fn split_frequencies_are_ordered() {
    let splits = third_splits();
    assert!(splits.low_mid_hz < splits.mid_high_hz);
    assert!(splits.low_mid_hz > 80.0 && splits.low_mid_hz < 120.0);
    assert!(splits.mid_high_hz > 300.0 && splits.mid_high_hz < 400.0);
}

#[test]
fn visible_window_follows_band_toggles() {
    let splits = third_splits();
    let window = |low_on, mid_on, high_on| {
        visible_band_window(OutputBands {
            low_on,
            mid_on,
            high_on,
        })
    };

    assert_eq!(window(true, true, true), 0..BAND_COUNT);
    // A gap in the middle keeps the full axis.
    assert_eq!(window(true, false, true), 0..BAND_COUNT);
    assert_eq!(window(true, true, false), 0..splits.mid_high_band);
    assert_eq!(window(false, true, true), splits.low_mid_band..BAND_COUNT);
    assert_eq!(window(true, false, false), 0..splits.low_mid_band);
    assert_eq!(
        window(false, true, false),
        splits.low_mid_band..splits.mid_high_band
    );
    assert_eq!(window(false, false, true), splits.mid_high_band..BAND_COUNT);
    assert_eq!(window(false, false, false), 0..BAND_COUNT);
}

proptest! {
    #[test]
    fn adjacent_interior_edges_keep_the_semitone_ratio(band in 1usize..BAND_COUNT - 1) {
        let edges = band_edges();
        let ratio = edges[band + 1] / edges[band];
        let semitone = 2.0_f64.powf(1.0 / 12.0);
        prop_assert!((ratio - semitone).abs() < 1e-9);
    }

    #[test]
    fn every_edge_pair_is_increasing(band in 0usize..BAND_COUNT) {
        let edges = band_edges();
        prop_assert!(edges[band] < edges[band + 1]);
    }
}
