//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! The raw TOML is first parsed into `toml::Value`, the key tree is walked and
//! compared against the known field names, and any stray key produces a
//! warning with a "did you mean?" suggestion. Warnings never break a config.

use std::collections::HashSet;

/// A non-fatal config warning (typo, unknown section).
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
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

/// Tables whose children are free-form (metric names).
const OPEN_TABLES: &[&str] = &["pipeline.field_map"];

/// Every valid dotted key path for `ServiceConfig`.
///
/// Maintained by hand to match the structs in `service_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [paths]
        "paths",
        "paths.data_file",
        "paths.output_dir",
        // [analysis]
        "analysis",
        "analysis.command",
        "analysis.args",
        "analysis.timeout_secs",
        "analysis.artifacts",
        "analysis.sample_command",
        "analysis.start_date",
        "analysis.end_date",
        // [render]
        "render",
        "render.width",
        "render.height",
        "render.font_path",
        "render.overlays",
        "render.background",
        // [remote]
        "remote",
        "remote.config_url",
        "remote.config_file",
        "remote.request_timeout_secs",
        // [server]
        "server",
        "server.addr",
        // [pipeline]
        "pipeline",
        "pipeline.channel_id",
        "pipeline.read_key",
        "pipeline.write_key",
        "pipeline.poll_interval_ms",
        "pipeline.field_map",
    ];
    keys.iter().copied().collect()
}

/// Walk a TOML value and return all dotted key paths.
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
            if v.is_table() && !OPEN_TABLES.contains(&path.as_str()) {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
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
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

/// Warn about keys in `raw_toml` that the config structs do not know.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors surface from serde later
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typo_suggests_correction() {
        let warnings = validate_unknown_keys("[analysis]\ntimeout_sec = 5\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "analysis.timeout_sec");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("analysis.timeout_secs"));
    }

    #[test]
    fn test_field_map_children_are_free_form() {
        let warnings = validate_unknown_keys("[pipeline.field_map]\npm25 = \"field3\"\n");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_unrelated_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("[completely_unrelated_section]\nx = 1\n");
        assert!(!warnings.is_empty());
        assert!(warnings[0].suggestion.is_none());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
