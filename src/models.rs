use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One front/back photograph pair, owned by the caller for the duration of
/// a processing run. Read-only to the pipeline.
#[derive(Debug, Clone)]
pub struct ImageSet {
    pub front: PathBuf,
    pub back: PathBuf,
}

/// The four JPEG variants written for one [`ImageSet`]. Written once per
/// index, overwritten on reprocessing of the same index.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedImages {
    pub front: PathBuf,
    pub back: PathBuf,
    pub vision: PathBuf,
    pub final_square: PathBuf,
}

/// Open-ended field map produced by the vision extractor. Intentionally
/// schema-loose: required presence varies by product type, so callers
/// validate the minimum keys at the category/CSV boundary instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedMetadata(pub BTreeMap<String, Value>);

impl ExtractedMetadata {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map.into_iter().collect())),
            _ => None,
        }
    }

    /// String view of a field; numbers are rendered, everything else is None.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// First non-empty value among several candidate spellings
    /// (extractor output capitalizes inconsistently across prompts).
    pub fn get_any(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.get_str(key))
            .find(|value| !value.trim().is_empty())
    }
}

/// Marketplace taxonomy ids attached by the category mapper. Empty strings
/// are a valid terminal outcome when nothing matches.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CategoryAssignment {
    pub category_id: String,
    pub subcategory_id: String,
}

/// Public URL per uploaded image role, produced once per image set.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogUrls {
    pub front: String,
    pub back: String,
    pub final_square: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

/// Outcome of one fully processed image set.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub label: String,
    pub index: usize,
    pub stages: Vec<StageReport>,
}

/// Aggregate counters for a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_string_coercion() {
        let meta = ExtractedMetadata::from_value(json!({
            "Title": "Vintage Postcard",
            "Year": 1912,
            "Posted": true,
            "specs": {"watt": 400},
        }))
        .expect("object");
        assert_eq!(meta.get_str("Title").as_deref(), Some("Vintage Postcard"));
        assert_eq!(meta.get_str("Year").as_deref(), Some("1912"));
        assert_eq!(meta.get_str("Posted").as_deref(), Some("true"));
        assert_eq!(meta.get_str("specs"), None);
    }

    #[test]
    fn metadata_get_any_prefers_first_non_empty() {
        let meta = ExtractedMetadata::from_value(json!({
            "title": "",
            "Title": "Real Title",
        }))
        .expect("object");
        assert_eq!(meta.get_any(&["title", "Title"]).as_deref(), Some("Real Title"));
        assert_eq!(meta.get_any(&["missing"]), None);
    }

    #[test]
    fn metadata_from_non_object_is_none() {
        assert!(ExtractedMetadata::from_value(json!("just a string")).is_none());
        assert!(ExtractedMetadata::from_value(json!([1, 2])).is_none());
    }
}
