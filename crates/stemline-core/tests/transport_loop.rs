use std::{sync::Arc, time::Duration};

use stemline_core::{
    Clock, Engine, PlaybackState,
    fixtures::{ManualClock, silent_stem},
};

fn engine_at_120(clock: &Arc<ManualClock>, seconds: f64) -> Engine {
    let mut engine = Engine::new(Arc::clone(clock) as Arc<dyn Clock>);
    engine.load_stem_set(vec![silent_stem("pad", seconds, 8_000)]);
    // Let the load-time analysis settle, then pin the tempo the test
    // depends on (auto-detection is free to disagree about silence).
    assert!(engine.wait_for_analysis_idle(Duration::from_secs(120)));
    engine.set_bpm(120).expect("tempo should be accepted");
    engine
}

#[test]
fn loop_region_wraps_on_the_next_check_tick() {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine_at_120(&clock, 5.0);

    engine
        .set_loop_region(4, 8)
        .expect("loop region should be accepted");
    engine.play();
    assert_eq!(engine.playback_state(), PlaybackState::Playing);

    // Beat 8 at 120 BPM is 4.0 s; land just past it.
    clock.set(4.01);
    engine.tick();

    assert_eq!(engine.playback_state(), PlaybackState::Playing);
    let position = engine.current_track_time();
    assert!(
        (position - 2.0).abs() < 1e-6,
        "expected wrap to beat 4 (2.0 s), got {position}"
    );
}

#[test]
fn armed_loop_without_end_never_wraps() {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine_at_120(&clock, 5.0);

    engine.toggle_loop_beat(4);
    assert!(engine.loop_region().is_armed());
    engine.play();

    clock.set(3.0);
    engine.tick();
    assert!((engine.current_track_time() - 3.0).abs() < 1e-6);
}

#[test]
fn toggle_loop_beat_walks_the_arming_states() {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine_at_120(&clock, 5.0);

    engine.toggle_loop_beat(4);
    assert_eq!(engine.loop_region().start_beat, Some(4));
    assert_eq!(engine.loop_region().end_beat, None);

    // Clicking at or before the armed start moves the start.
    engine.toggle_loop_beat(2);
    assert_eq!(engine.loop_region().start_beat, Some(2));

    engine.toggle_loop_beat(6);
    assert_eq!(engine.loop_region().active(), Some((2, 6)));

    // A third click re-arms.
    engine.toggle_loop_beat(3);
    assert!(engine.loop_region().is_armed());

    engine.clear_loop();
    assert_eq!(engine.loop_region().active(), None);
}

#[test]
fn reaching_the_end_without_a_loop_stops_playback() {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine_at_120(&clock, 5.0);

    engine.play();
    clock.set(5.5);
    engine.tick();

    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert_eq!(engine.current_track_time(), 0.0);
}

#[test]
fn reaching_the_end_with_a_loop_wraps_to_its_start() {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine_at_120(&clock, 5.0);

    engine
        .set_loop_region(2, 100)
        .expect("loop region should be accepted");
    engine.play();
    clock.set(5.2);
    engine.tick();

    assert_eq!(engine.playback_state(), PlaybackState::Playing);
    assert!((engine.current_track_time() - 1.0).abs() < 1e-6);
}

#[test]
fn metronome_clicks_come_back_from_tick() {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine_at_120(&clock, 5.0);

    engine.set_metronome_enabled(true);
    clock.set(10.0);
    engine.play();

    clock.set(10.03);
    let clicks = engine.tick();
    assert_eq!(clicks.len(), 1, "only beat 0 fits the 100 ms window");
    assert_eq!(clicks[0].beat_in_measure, 0);
    assert!((clicks[0].clock_time - 10.0).abs() < 1e-9);
    assert!((clicks[0].frequency_hz - 1_200.0).abs() < f32::EPSILON);

    // Advance past the next beat; the scheduler catches up from where
    // it left off.
    clock.set(10.46);
    let clicks = engine.tick();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].beat_in_measure, 1);
    assert!((clicks[0].clock_time - 10.5).abs() < 1e-9);
}

#[test]
fn seek_clamps_and_keeps_pause_state() {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine_at_120(&clock, 5.0);

    engine.seek(99.0);
    assert_eq!(engine.playback_state(), PlaybackState::Stopped);
    assert!((engine.current_track_time() - 5.0).abs() < 1e-9);

    engine.seek(-3.0);
    assert_eq!(engine.current_track_time(), 0.0);
}

#[test]
fn playback_rate_changes_keep_the_playhead_continuous() {
    let clock = Arc::new(ManualClock::new());
    let mut engine = engine_at_120(&clock, 5.0);

    engine.play();
    clock.set(2.0);
    engine.set_playback_rate(0.5);
    assert!((engine.current_track_time() - 2.0).abs() < 1e-9);

    clock.set(4.0);
    assert!((engine.current_track_time() - 3.0).abs() < 1e-9);
}
