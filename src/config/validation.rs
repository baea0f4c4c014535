//! Unknown-key detection with "did you mean?" suggestions
//!
//! Two-pass parse: the raw TOML is first walked as a `toml::Value` tree and
//! every dotted key path is compared against the known layout, then normal
//! serde deserialization runs. Unknown keys only produce warnings; serde's
//! `#[serde(default)]` would otherwise drop a typo silently.

/// A non-fatal config warning.
#[derive(Debug, Clone, PartialEq, Eq)]
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

/// Fixed key paths. Sensor-type and machine-id segments under
/// `[thresholds]` are free-form and checked structurally instead.
const KNOWN_KEYS: &[&str] = &[
    "model",
    "model.backend",
    "model.path",
    "model.n_estimators",
    "model.contamination",
    "model.max_samples",
    "model.seed",
    "features",
    "features.rolling_window",
    "prediction",
    "prediction.min_timesteps",
    "prediction.trend_window",
    "prediction.anomaly_window",
    "prediction.high_confidence_timesteps",
    "thresholds",
    "thresholds.defaults",
    "thresholds.machines",
];

const BOUND_KEYS: [&str; 2] = ["min", "max"];

fn is_known_key(path: &str) -> bool {
    if KNOWN_KEYS.contains(&path) {
        return true;
    }
    let parts: Vec<&str> = path.split('.').collect();
    match parts.as_slice() {
        ["thresholds", "defaults", _] => true,
        ["thresholds", "defaults", _, bound] => BOUND_KEYS.contains(bound),
        ["thresholds", "machines", _] | ["thresholds", "machines", _, _] => true,
        ["thresholds", "machines", _, _, bound] => BOUND_KEYS.contains(bound),
        _ => false,
    }
}

/// Recursively collect all dotted key paths of a TOML tree.
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

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, if any.
pub fn suggest_correction(unknown: &str) -> Option<String> {
    KNOWN_KEYS
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| (*k).to_string())
}

/// Warnings for every unknown key in a raw TOML document.
///
/// Unparseable input yields no warnings; serde reports the parse error.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !is_known_key(key))
        .map(|key| ValidationWarning {
            message: format!("Unknown config key '{key}'"),
            suggestion: suggest_correction(&key),
            field: key,
        })
        .collect()
}
