use stemline_core::{
    energy::{ENERGY_WINDOW_MS, compute_energy, downsample_peaks, finalize_envelope},
    fixtures::stem_from_channels,
    mix::mix_snapshot,
    model::OutputBands,
};

#[test]
fn monotone_energy_keeps_every_onset_positive() {
    // Strictly increasing energy: no diff gets rectified away.
    let raw: Vec<f32> = (1..=64).map(|i| i as f32 / 64.0).collect();
    let envelope = finalize_envelope(raw);

    assert!(envelope.onset.iter().all(|&v| v > 0.0));
    let max_diff = envelope
        .rms
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold(0.0_f32, f32::max);
    for i in 1..envelope.rms.len() {
        let expected = (envelope.rms[i] - envelope.rms[i - 1]) / max_diff;
        assert!(
            (envelope.onset[i] - expected).abs() < 1e-5,
            "window {i}: onset {} expected {expected}",
            envelope.onset[i]
        );
    }
}

#[test]
fn envelope_normalizes_to_unit_peak() {
    let sample_rate = 8_000_u32;
    // One loud second, one quiet second.
    let mut samples = vec![0.5_f32; sample_rate as usize];
    samples.extend(vec![0.05_f32; sample_rate as usize]);
    let stem = stem_from_channels("pad", sample_rate, vec![samples]);

    let envelope = compute_energy(
        &mix_snapshot(&[stem]),
        sample_rate,
        2.0,
        OutputBands::default(),
    )
    .expect("energy analysis should succeed")
    .expect("envelope should exist for a two second track");

    let expected_windows = (2_000 / ENERGY_WINDOW_MS) as usize;
    assert_eq!(envelope.window_count(), expected_windows);

    let peak = envelope.rms.iter().copied().fold(0.0_f32, f32::max);
    assert!((peak - 1.0).abs() < 1e-6);

    // The quiet half sits a decade below the loud half.
    let loud = envelope.rms[10];
    let quiet = envelope.rms[expected_windows - 10];
    assert!((loud / quiet - 10.0).abs() < 0.5);
}

#[test]
fn volume_scales_the_direct_envelope_uniformly() {
    let sample_rate = 8_000_u32;
    let samples = vec![0.5_f32; sample_rate as usize];
    let stem = stem_from_channels("pad", sample_rate, vec![samples]);

    let mut snapshot = mix_snapshot(std::slice::from_ref(&stem));
    let full = compute_energy(&snapshot, sample_rate, 1.0, OutputBands::default())
        .expect("analysis should succeed")
        .expect("envelope should exist");

    snapshot[0].gain = 0.25;
    let quarter = compute_energy(&snapshot, sample_rate, 1.0, OutputBands::default())
        .expect("analysis should succeed")
        .expect("envelope should exist");

    // Normalization hides a uniform gain change.
    assert_eq!(full.rms.len(), quarter.rms.len());
    for (a, b) in full.rms.iter().zip(quarter.rms.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn band_bypass_switches_to_the_filtered_path() {
    let sample_rate = 8_000_u32;
    // 30 Hz fundamental lives entirely in the low band.
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| (f64::from(i) / f64::from(sample_rate) * 30.0 * std::f64::consts::TAU).sin() as f32)
        .collect();
    let stem = stem_from_channels("sub", sample_rate, vec![samples]);
    let snapshot = mix_snapshot(std::slice::from_ref(&stem));

    let unfiltered = compute_energy(&snapshot, sample_rate, 2.0, OutputBands::default())
        .expect("analysis should succeed")
        .expect("envelope should exist");

    let low_off = OutputBands {
        low_on: false,
        ..OutputBands::default()
    };
    let filtered = compute_energy(&snapshot, sample_rate, 2.0, low_off)
        .expect("analysis should succeed")
        .expect("envelope should exist");

    // Both normalize to 1.0, so compare shape stability instead: the
    // filtered envelope must exist and cover the same windows.
    assert_eq!(unfiltered.window_count(), filtered.window_count());
    assert!((filtered.rms.iter().copied().fold(0.0_f32, f32::max) - 1.0).abs() < 1e-6);
}

#[test]
fn peak_downsampling_keeps_transients() {
    let mut values = vec![0.1_f32; 100];
    values[57] = 1.0;
    let peaks = downsample_peaks(&values, 10);
    assert_eq!(peaks.len(), 10);
    assert_eq!(peaks[5], 1.0);
}
