//! Integration tests: config persistence round-trips.

use selkie::config::LipSyncConfig;

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("nested").join("config.toml");

    let mut config = LipSyncConfig::default();
    config.classifier.silence_floor = 0.07;
    config.scheduler.smoothing = 0.65;
    config.bands.high.high_hz = 5_000.0;
    config.phonemizer.min_event_ms = 45.0;

    config.save_to_file(&path).expect("save config");
    assert!(path.exists());

    let loaded = LipSyncConfig::from_file(&path).expect("load config");
    assert!((loaded.classifier.silence_floor - 0.07).abs() < f32::EPSILON);
    assert!((loaded.scheduler.smoothing - 0.65).abs() < f32::EPSILON);
    assert!((loaded.bands.high.high_hz - 5_000.0).abs() < f32::EPSILON);
    assert!((loaded.phonemizer.min_event_ms - 45.0).abs() < f32::EPSILON);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "[scheduler]\nfinal_fade_ms = 450.0\n").expect("write partial config");

    let loaded = LipSyncConfig::from_file(&path).expect("load partial config");
    assert!((loaded.scheduler.final_fade_ms - 450.0).abs() < f32::EPSILON);
    // Everything else stays at defaults.
    let defaults = LipSyncConfig::default();
    assert!((loaded.classifier.silence_floor - defaults.classifier.silence_floor).abs() < f32::EPSILON);
    assert!((loaded.bands.low.low_hz - defaults.bands.low.low_hz).abs() < f32::EPSILON);
}

#[test]
fn invalid_toml_is_a_config_error() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "not valid toml {{{").expect("write bad config");

    let result = LipSyncConfig::from_file(&path);
    assert!(matches!(result, Err(selkie::LipSyncError::Config(_))));
}
