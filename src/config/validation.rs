//! Config validation: unknown-key detection with Levenshtein suggestions
//! and hyperparameter range checks.
//!
//! Two-pass parse: the raw TOML is first walked as a `toml::Value` tree and
//! compared against the known key set, producing "did you mean?" warnings.
//! Serde deserialization and range validation follow. Unknown keys never
//! fail a load.

use std::collections::HashSet;

use super::DetectorConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of `DetectorConfig`.
///
/// Kept by hand in step with detector_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "training",
        "training.epochs",
        "training.batch_size",
        "training.learning_rate",
        "training.split_fraction",
        "threshold",
        "threshold.multiplier",
        "model",
        "model.feature_count",
        "model.recurrent_mode",
        "normalization",
        "normalization.test_policy",
        "runtime",
        "runtime.seed",
        "runtime.execution",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively collect dotted key paths from a `toml::Value` tree.
///
/// `{ a = { b = 1, c = 2 } }` yields `["a", "a.b", "a.c"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a.chars().count();
    let b_len = b_chars.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

/// Warnings for every unknown key in a raw TOML document.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // serde reports the parse error
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Check hyperparameter ranges.
///
/// Returns (errors, warnings): errors make the run impossible, warnings
/// flag values that are legal but almost certainly a mistake.
pub fn validate_ranges(config: &DetectorConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let t = &config.training;
    if t.epochs == 0 {
        errors.push("training.epochs must be > 0".to_string());
    }
    if t.batch_size == 0 {
        errors.push("training.batch_size must be > 0".to_string());
    }
    if !t.learning_rate.is_finite() || t.learning_rate <= 0.0 {
        errors.push(format!(
            "training.learning_rate = {} must be a positive finite number",
            t.learning_rate
        ));
    } else if t.learning_rate > 1.0 {
        warnings.push(ValidationWarning {
            field: "training.learning_rate".to_string(),
            message: format!(
                "training.learning_rate = {} is unusually large for SGD",
                t.learning_rate
            ),
            suggestion: None,
        });
    }
    if !(t.split_fraction > 0.0 && t.split_fraction < 1.0) {
        errors.push(format!(
            "training.split_fraction = {} must lie strictly between 0 and 1",
            t.split_fraction
        ));
    }

    let m = config.threshold.multiplier;
    if !m.is_finite() {
        errors.push(format!("threshold.multiplier = {m} must be finite"));
    } else if m <= 0.0 {
        warnings.push(ValidationWarning {
            field: "threshold.multiplier".to_string(),
            message: format!(
                "threshold.multiplier = {m} puts the threshold at or below the mean training error"
            ),
            suggestion: None,
        });
    }

    if config.model.feature_count == 0 {
        errors.push("model.feature_count must be > 0".to_string());
    }

    (errors, warnings)
}
