//! E2E tests for persistent configuration
//!
//! Tests config file round-trip, defaults, and how configuration changes
//! reach a running engine.

use driftmeasure::config::RunConfig;
use driftmeasure::{DriftConfig, DriftError, DriftMeasure, StreamFormat, UndetectedPeakHandling};
use std::time::Duration;

fn pulse(frames: usize) -> Vec<f32> {
    let mut data = vec![0.0f32; frames * 2];
    data[24000 * 2] = 0.9;
    data[24048 * 2 + 1] = 0.8;
    data
}

#[test]
fn test_defaults() {
    let config = RunConfig::default();
    assert_eq!(config.sample_rate, 96000);
    assert_eq!(config.channels, 2);

    let analysis = &config.analysis;
    assert_eq!(analysis.window_size(), Duration::from_millis(500));
    assert_eq!(analysis.pulse_length(), Duration::from_micros(2000));
    approx::assert_relative_eq!(analysis.peak_threshold, 0.6);
    assert_eq!(analysis.reference_channel, 0);
    assert_eq!(
        analysis.undetected_peak_handling,
        UndetectedPeakHandling::NoValue
    );
    assert_eq!(analysis.undetected_peak_fill_value, 0);
    assert!(!analysis.omit_output_if_no_peaks);
}

#[test]
fn test_config_file_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drift.json");
    std::fs::write(
        &path,
        r#"{
            "sample_rate": 48000,
            "undetected_peak_handling": "fill-value",
            "undetected_peak_fill_value": -1
        }"#,
    )
    .unwrap();

    let config = RunConfig::load(&path).unwrap();
    let engine = DriftMeasure::new(config.analysis).unwrap();
    engine
        .set_format(StreamFormat::interleaved(config.channels, config.sample_rate))
        .unwrap();

    let mut data = pulse(48000);
    data[24048 * 2 + 1] = 0.0;
    let mut records: Vec<String> = Vec::new();
    engine.process(&data, &mut records).unwrap();
    assert_eq!(records, vec!["500000000,-1\n"]);
}

#[test]
fn test_save_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drift.json");

    let mut config = RunConfig::default();
    config.analysis.undetected_peak_handling = UndetectedPeakHandling::LastValue;
    config.analysis.reference_channel = 1;
    config.save(&path).unwrap();

    let json = std::fs::read_to_string(&path).unwrap();
    assert!(
        json.contains("\"last-value\""),
        "Policy should be stored in kebab-case: {}",
        json
    );
    assert_eq!(RunConfig::load(&path).unwrap(), config);
}

#[test]
fn test_unknown_policy_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drift.json");
    std::fs::write(&path, r#"{"undetected_peak_handling": "guess"}"#).unwrap();

    let err = RunConfig::load(&path).unwrap_err();
    assert!(err.to_string().contains("could not parse config file"));
}

#[test]
fn test_policy_from_str() {
    assert_eq!(
        "last-value".parse::<UndetectedPeakHandling>().unwrap(),
        UndetectedPeakHandling::LastValue
    );
    assert!(matches!(
        "last".parse::<UndetectedPeakHandling>(),
        Err(DriftError::InvalidValue(_))
    ));
}

#[test]
fn test_out_of_range_values_rejected() {
    let bad_threshold = DriftConfig {
        peak_threshold: 1.5,
        ..Default::default()
    };
    assert!(matches!(
        DriftMeasure::new(bad_threshold),
        Err(DriftError::InvalidValue(_))
    ));

    let engine = DriftMeasure::new(DriftConfig::default()).unwrap();
    let result = engine.update_config(|c| c.window_size_ns = 0);
    assert!(matches!(result, Err(DriftError::InvalidValue(_))));
    assert_eq!(
        engine.config(),
        DriftConfig::default(),
        "Rejected update must not be applied"
    );
}

/// Threshold changes discard history; fill value changes do not
#[test]
fn test_config_change_flush_rules() {
    let engine = DriftMeasure::new(DriftConfig::default()).unwrap();
    engine
        .set_format(StreamFormat::interleaved(2, 48000))
        .unwrap();

    let data = pulse(48000);
    let mut records: Vec<String> = Vec::new();
    engine.process(&data[..30000 * 2], &mut records).unwrap();
    let held = engine.history_span().unwrap();

    engine
        .update_config(|c| c.undetected_peak_fill_value = 9)
        .unwrap();
    assert_eq!(engine.history_span().unwrap(), held);

    engine.update_config(|c| c.peak_threshold = 0.5).unwrap();
    assert_eq!(engine.history_span().unwrap(), (0, 0));
}

#[test]
fn test_format_change_resizes_datasets() {
    let engine = DriftMeasure::new(DriftConfig::default()).unwrap();
    engine
        .set_format(StreamFormat::interleaved(4, 48000))
        .unwrap();
    assert_eq!(engine.last_dataset().unwrap().drifts.len(), 3);

    engine
        .set_format(StreamFormat::interleaved(2, 48000))
        .unwrap();
    assert_eq!(engine.last_dataset().unwrap().drifts.len(), 1);
}

#[test]
fn test_invalid_format_rejected() {
    let engine = DriftMeasure::new(DriftConfig::default()).unwrap();

    let err = engine
        .set_format(StreamFormat::interleaved(1, 48000))
        .unwrap_err();
    assert!(matches!(err, DriftError::Format(_)));
    assert!(engine.format().is_none());

    let mut records: Vec<String> = Vec::new();
    assert_eq!(
        engine.process(&[0.0; 4], &mut records),
        Err(DriftError::NotNegotiated)
    );
}
