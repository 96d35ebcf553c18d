//! Label List
//!
//! Newline-delimited class names. Line `i` names output `i` of the model.

use std::path::Path;

use crate::utils::error::{ClassifierError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelList {
    labels: Vec<String>,
}

impl LabelList {
    /// Build from names already in output order
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(ClassifierError::Labels("label list is empty".to_string()));
        }
        Ok(Self { labels })
    }

    /// Read a label file; every line is one label, trimmed of surrounding whitespace
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClassifierError::Labels(format!("cannot read {:?}: {}", path, e)))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Self::new(contents.lines().map(|l| l.trim().to_string()).collect())
    }

    /// Write one label per line with a trailing newline
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut contents = self.labels.join("\n");
        contents.push('\n');
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_lines() {
        let labels = LabelList::parse("Africa\n  Asia \r\nEurope\n").unwrap();
        assert_eq!(labels.names(), &["Africa", "Asia", "Europe"]);
        assert_eq!(labels.get(1), Some("Asia"));
        assert_eq!(labels.get(3), None);
    }

    #[test]
    fn test_empty_file_is_an_error() {
        assert!(LabelList::parse("").is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_names.txt");
        let labels = LabelList::new(vec!["Japan".into(), "Oceania".into()]).unwrap();

        labels.save(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Japan\nOceania\n");
        assert_eq!(LabelList::load(&path).unwrap(), labels);
    }

    #[test]
    fn test_missing_file() {
        let err = LabelList::load(Path::new("/nonexistent/class_names.txt")).unwrap_err();
        assert!(matches!(err, ClassifierError::Labels(_)));
    }
}
