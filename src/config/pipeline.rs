//! Pipeline configuration - channel identity, credentials, polling, field map
//!
//! [`PipelineConfig`] is owned by the reactive store; everything else works on
//! cloned snapshots. Changes are expressed as a [`PipelineConfigPatch`] and
//! merged with [`PipelineConfig::merged`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::defaults::MIN_POLL_INTERVAL_MS;

/// Sensor metrics carried by the telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Pm25,
    Pm10,
    Temperature,
    Humidity,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Pm25,
        Metric::Pm10,
        Metric::Temperature,
        Metric::Humidity,
    ];

    /// Canonical column name used when the mapped field is absent.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Metric::Pm25 => "pm25",
            Metric::Pm10 => "pm10",
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Default channel layout: field1..field4.
pub fn default_field_map() -> BTreeMap<Metric, String> {
    BTreeMap::from([
        (Metric::Humidity, "field1".to_string()),
        (Metric::Temperature, "field2".to_string()),
        (Metric::Pm25, "field3".to_string()),
        (Metric::Pm10, "field4".to_string()),
    ])
}

fn default_poll_interval_ms() -> u64 {
    super::defaults::DEFAULT_POLL_INTERVAL_MS
}

/// Telemetry channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub read_key: String,
    #[serde(default)]
    pub write_key: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_field_map")]
    pub field_map: BTreeMap<Metric, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            read_key: String::new(),
            write_key: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            field_map: default_field_map(),
        }
    }
}

impl PipelineConfig {
    /// Check the invariants a snapshot must hold. Returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            errors.push(format!(
                "poll_interval_ms must be >= {MIN_POLL_INTERVAL_MS}, got {}",
                self.poll_interval_ms
            ));
        }
        for (metric, field) in &self.field_map {
            if field.trim().is_empty() {
                errors.push(format!("field_map.{metric} must not be empty"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Apply a patch on top of this config, returning the new value.
    ///
    /// `Some` fields replace; `field_map` entries merge key-wise.
    pub fn merged(&self, patch: &PipelineConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(ref v) = patch.channel_id {
            next.channel_id = v.clone();
        }
        if let Some(ref v) = patch.read_key {
            next.read_key = v.clone();
        }
        if let Some(ref v) = patch.write_key {
            next.write_key = v.clone();
        }
        if let Some(v) = patch.poll_interval_ms {
            next.poll_interval_ms = v;
        }
        if let Some(ref map) = patch.field_map {
            for (metric, field) in map {
                next.field_map.insert(*metric, field.clone());
            }
        }
        next
    }

    /// External column name for `metric`, falling back to the canonical name.
    pub fn field_name(&self, metric: Metric) -> &str {
        self.field_map
            .get(&metric)
            .map(String::as_str)
            .unwrap_or_else(|| metric.canonical_name())
    }

    /// Copy with credentials blanked, for logs and API responses.
    pub fn redacted(&self) -> Self {
        let mask = |s: &str| if s.is_empty() { String::new() } else { "***".to_string() };
        Self {
            read_key: mask(&self.read_key),
            write_key: mask(&self.write_key),
            ..self.clone()
        }
    }

    /// Names of the top-level fields that differ between two snapshots.
    pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.channel_id != other.channel_id {
            changed.push("channel_id");
        }
        if self.read_key != other.read_key {
            changed.push("read_key");
        }
        if self.write_key != other.write_key {
            changed.push("write_key");
        }
        if self.poll_interval_ms != other.poll_interval_ms {
            changed.push("poll_interval_ms");
        }
        if self.field_map != other.field_map {
            changed.push("field_map");
        }
        changed
    }
}

/// Partial configuration submitted through `update`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_map: Option<BTreeMap<Metric, String>>,
}

impl PipelineConfigPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn poll_interval(ms: u64) -> Self {
        Self {
            poll_interval_ms: Some(ms),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_short_poll_interval_invalid() {
        let cfg = PipelineConfig {
            poll_interval_ms: 999,
            ..Default::default()
        };
        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("poll_interval_ms"));
    }

    #[test]
    fn test_merge_replaces_and_merges_map() {
        let base = PipelineConfig::default();
        let patch = PipelineConfigPatch {
            channel_id: Some("42".to_string()),
            field_map: Some(BTreeMap::from([(Metric::Pm25, "field7".to_string())])),
            ..Default::default()
        };
        let next = base.merged(&patch);
        assert_eq!(next.channel_id, "42");
        assert_eq!(next.field_name(Metric::Pm25), "field7");
        // Untouched entries survive
        assert_eq!(next.field_name(Metric::Humidity), "field1");
        assert_eq!(next.poll_interval_ms, base.poll_interval_ms);
        assert_eq!(base.changed_fields(&next), vec!["channel_id", "field_map"]);
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let base = PipelineConfig::default();
        assert!(PipelineConfigPatch::default().is_empty());
        assert_eq!(base.merged(&PipelineConfigPatch::default()), base);
    }

    #[test]
    fn test_redacted_hides_keys() {
        let cfg = PipelineConfig {
            read_key: "secret".to_string(),
            ..Default::default()
        };
        let red = cfg.redacted();
        assert_eq!(red.read_key, "***");
        assert_eq!(red.write_key, "");
    }

    #[test]
    fn test_patch_json_omits_unset_fields() {
        let json = serde_json::to_string(&PipelineConfigPatch::poll_interval(5000)).unwrap();
        assert_eq!(json, r#"{"poll_interval_ms":5000}"#);
    }
}
