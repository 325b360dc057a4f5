use stemline_core::{
    bpm::detect_bpm,
    fixtures::{click_track_stem, silent_stem},
    mix::mix_snapshot,
};

#[test]
fn click_track_at_120_detects_within_tolerance() {
    let sample_rate = 16_000_u32;
    let stem = click_track_stem("clicks", 120.0, 32.0, sample_rate);
    let snapshot = mix_snapshot(std::slice::from_ref(&stem));

    let detected = detect_bpm(&snapshot, sample_rate, 32.0)
        .expect("analysis should succeed")
        .expect("click track should yield a tempo");
    assert!(
        (118..=122).contains(&detected),
        "expected 120 +/- 2, got {detected}"
    );
}

#[test]
fn slower_click_track_prefers_the_doubled_octave() {
    let sample_rate = 16_000_u32;
    // 70 BPM clicks correlate at both 70 and 140; the musical prior
    // sits in the 80-160 window.
    let stem = click_track_stem("clicks", 70.0, 32.0, sample_rate);
    let snapshot = mix_snapshot(std::slice::from_ref(&stem));

    let detected = detect_bpm(&snapshot, sample_rate, 32.0)
        .expect("analysis should succeed")
        .expect("click track should yield a tempo");
    assert!(
        detected == 70 || detected == 140,
        "expected 70 or its octave, got {detected}"
    );
}

#[test]
fn inaudible_mix_returns_none() {
    let sample_rate = 16_000_u32;
    let mut stem = click_track_stem("clicks", 120.0, 10.0, sample_rate);
    stem.muted = true;

    let snapshot = mix_snapshot(std::slice::from_ref(&stem));
    assert!(snapshot.is_empty());
    let detected = detect_bpm(&snapshot, sample_rate, 10.0).expect("analysis should succeed");
    assert_eq!(detected, None);
}

#[test]
fn silence_detects_some_tempo_without_panicking() {
    let sample_rate = 16_000_u32;
    let stem = silent_stem("pad", 10.0, sample_rate);
    let snapshot = mix_snapshot(std::slice::from_ref(&stem));

    // A flat onset envelope has no meaningful correlation peak; the
    // detector may return anything in range but must not fail.
    let detected = detect_bpm(&snapshot, sample_rate, 10.0).expect("analysis should succeed");
    if let Some(bpm) = detected {
        assert!((40..=400).contains(&bpm));
    }
}
