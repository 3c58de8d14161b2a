//! Config Validation Tests
//!
//! Typo detection and hyperparameter range validation, exercised
//! independently from the rest of the pipeline.

use cpu_anomaly::config::validation::{
    known_config_keys, suggest_correction, validate_ranges, validate_unknown_keys,
};
use cpu_anomaly::config::{ConfigError, DetectorConfig};
use cpu_anomaly::{ExecutionTarget, RecurrentMode, TestNormalization};

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_learning_rate_warns_with_suggestion() {
    let toml_str = r#"
[training]
learning_rat = 0.05
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("learning_rat"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("training.learning_rate"),
        "Should suggest the correct spelling"
    );
}

#[test]
fn typo_in_section_name_warns() {
    let toml_str = r#"
[treshold]
multiplier = 2.5
"#;
    let warnings = validate_unknown_keys(toml_str);
    // Both the table and its child are unknown
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].suggestion.as_deref(), Some("threshold"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[training]
epochs = 20
batch_size = 32
learning_rate = 0.005
split_fraction = 0.75

[threshold]
multiplier = 2.5

[model]
feature_count = 1
recurrent_mode = "batch_sequence"

[normalization]
test_policy = "reuse_training"

[runtime]
seed = 7
execution = "cpu_parallel"
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());

    let config = DetectorConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.training.epochs, 20);
    assert_eq!(config.training.batch_size, 32);
    assert_eq!(config.threshold.multiplier, 2.5);
    assert_eq!(config.model.recurrent_mode, RecurrentMode::BatchSequence);
    assert_eq!(config.normalization.test_policy, TestNormalization::ReuseTraining);
    assert_eq!(config.runtime.execution, ExecutionTarget::CpuParallel);
    assert_eq!(config.runtime.seed, 7);
}

#[test]
fn far_off_key_gets_no_suggestion() {
    let known = known_config_keys();
    assert_eq!(suggest_correction("completely_unrelated_key", &known), None);
}

#[test]
fn unknown_keys_do_not_fail_the_load() {
    let config = DetectorConfig::from_toml_str("[training]\nepoks = 3\n").unwrap();
    assert_eq!(config.training.epochs, 15, "Unknown key must not override anything");
}

#[test]
fn partial_config_fills_defaults() {
    let config = DetectorConfig::from_toml_str("[threshold]\nmultiplier = 4.0\n").unwrap();
    assert_eq!(config.threshold.multiplier, 4.0);
    assert_eq!(config.training, DetectorConfig::default().training);
}

// ============================================================================
// Range Validation
// ============================================================================

#[test]
fn defaults_pass_validation() {
    let (errors, warnings) = validate_ranges(&DetectorConfig::default());
    assert!(errors.is_empty(), "{errors:?}");
    assert!(warnings.is_empty());
}

#[test]
fn every_range_error_is_collected() {
    let mut config = DetectorConfig::default();
    config.training.epochs = 0;
    config.training.batch_size = 0;
    config.training.learning_rate = -1.0;
    config.training.split_fraction = 1.0;
    config.threshold.multiplier = f64::NAN;
    config.model.feature_count = 0;

    let (errors, _) = validate_ranges(&config);
    assert_eq!(errors.len(), 6, "{errors:?}");

    match config.validate() {
        Err(ConfigError::Validation(errs)) => assert_eq!(errs.len(), 6),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn large_learning_rate_only_warns() {
    let mut config = DetectorConfig::default();
    config.training.learning_rate = 5.0;
    let (errors, warnings) = validate_ranges(&config);
    assert!(errors.is_empty());
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "training.learning_rate");
}

#[test]
fn out_of_range_file_is_rejected() {
    let toml_str = "[training]\nsplit_fraction = 0.0\n";
    assert!(matches!(
        DetectorConfig::from_toml_str(toml_str),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn unknown_enum_value_is_a_parse_error() {
    let toml_str = "[runtime]\nexecution = \"gpu\"\n";
    assert!(matches!(
        DetectorConfig::from_toml_str(toml_str),
        Err(ConfigError::Parse(..))
    ));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detector.toml");

    let mut config = DetectorConfig::default();
    config.training.epochs = 3;
    config.model.recurrent_mode = RecurrentMode::BatchSequence;
    config.save_to_file(&path).unwrap();

    assert_eq!(DetectorConfig::load_from_file(&path).unwrap(), config);
}
