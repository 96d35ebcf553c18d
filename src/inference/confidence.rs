//! Confidence Lookup
//!
//! The confidence reported with a prediction comes either from a static
//! per-label table (precomputed accuracy figures) or from the model's own
//! softmax probability for the predicted class.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::{ClassifierError, Result};

/// Where the `confidence` field of a response comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceSource {
    /// Static per-label table
    #[default]
    Table,
    /// Softmax probability of the predicted class
    Softmax,
}

impl FromStr for ConfidenceSource {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(ConfidenceSource::Table),
            "softmax" => Ok(ConfidenceSource::Softmax),
            other => Err(ClassifierError::Config(format!(
                "unknown confidence source '{}' (expected table or softmax)",
                other
            ))),
        }
    }
}

impl fmt::Display for ConfidenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceSource::Table => write!(f, "table"),
            ConfidenceSource::Softmax => write!(f, "softmax"),
        }
    }
}

/// Static label → confidence mapping
///
/// Stored as a flat JSON object, e.g. `{"Asia": 0.91, "Europe": 0.87}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfidenceTable {
    entries: HashMap<String, f64>,
}

impl ConfidenceTable {
    pub fn new(entries: HashMap<String, f64>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Confidence for `label`; exactly `0.0` when the label has no entry
    pub fn lookup(&self, label: &str) -> f64 {
        self.entries.get(label).copied().unwrap_or(0.0)
    }

    /// Labels with no entry, in the order given
    pub fn missing_labels<'a>(&self, labels: &'a [String]) -> Vec<&'a str> {
        labels
            .iter()
            .filter(|l| !self.entries.contains_key(l.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ConfidenceTable {
        ConfidenceTable::new(HashMap::from([
            ("Asia".to_string(), 0.91),
            ("Europe".to_string(), 0.87),
        ]))
    }

    #[test]
    fn test_lookup_present_and_absent() {
        let table = table();
        assert_eq!(table.lookup("Asia"), 0.91);
        assert_eq!(table.lookup("Atlantis"), 0.0);
        assert_eq!(ConfidenceTable::default().lookup("Asia"), 0.0);
    }

    #[test]
    fn test_missing_labels() {
        let labels = vec!["Asia".to_string(), "Japan".to_string(), "Europe".to_string()];
        assert_eq!(table().missing_labels(&labels), vec!["Japan"]);
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confidence.json");
        std::fs::write(&path, r#"{"Oceania": 0.5}"#).unwrap();

        let table = ConfidenceTable::load(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("Oceania"), 0.5);
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!("Softmax".parse::<ConfidenceSource>().unwrap(), ConfidenceSource::Softmax);
        assert!("random".parse::<ConfidenceSource>().is_err());
        assert_eq!(ConfidenceSource::default(), ConfidenceSource::Table);
    }
}
