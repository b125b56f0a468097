use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::docx::PartKind;
use crate::error::{Error, Result};
use crate::matcher::DirectiveKind;

/// Key used to merge placeholder names: trimmed, case-insensitive.
pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Clone, Debug, Serialize)]
pub struct PlaceholderLocation {
    pub file_path: PathBuf,
    pub file_name: String,
    pub occurrence_count: usize,
    pub context_snippet: String,
    pub part: PartKind,
}

#[derive(Clone, Debug, Serialize)]
pub struct Placeholder {
    pub name: String,
    /// The token as first seen, e.g. `{{image:LOGO|width:200}}`.
    pub pattern: String,
    pub kind: DirectiveKind,
    pub occurrences: Vec<PlaceholderLocation>,
    pub total_occurrences: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScanError {
    pub file_path: PathBuf,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlaceholderScanResult {
    pub placeholders: Vec<Placeholder>,
    pub total_files_scanned: usize,
    pub total_occurrences: usize,
    pub errors: Vec<ScanError>,
    pub is_successful: bool,
    pub scan_duration: Duration,
    pub cancelled: bool,
}

impl PlaceholderScanResult {
    pub fn placeholder(&self, name: &str) -> Option<&Placeholder> {
        let key = normalize_name(name);
        self.placeholders
            .iter()
            .find(|p| normalize_name(&p.name) == key)
    }
}

/// Placeholder name to replacement value. For image placeholders the value
/// is a path to the image file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ReplacementMap {
    mappings: BTreeMap<String, String>,
    normalized: HashMap<String, String>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.normalized
            .entry(normalize_name(&name))
            .or_insert_with(|| name.clone());
        self.mappings.insert(name, value.into());
    }

    /// Exact key first, then the trimmed case-insensitive key.
    pub fn get(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.mappings.get(name) {
            return Some(v);
        }
        let key = self.normalized.get(&normalize_name(name))?;
        self.mappings.get(key).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.mappings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InputValidation("replacement map is empty".into()));
        }
        if self.mappings.keys().any(|k| k.trim().is_empty()) {
            return Err(Error::InputValidation(
                "replacement map contains an empty key".into(),
            ));
        }
        Ok(())
    }
}

impl From<BTreeMap<String, String>> for ReplacementMap {
    fn from(mappings: BTreeMap<String, String>) -> Self {
        mappings.into_iter().collect()
    }
}

impl From<ReplacementMap> for BTreeMap<String, String> {
    fn from(map: ReplacementMap) -> Self {
        map.mappings
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ReplacementMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ReplacementMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FileReplaceResult {
    pub file_path: PathBuf,
    pub is_success: bool,
    pub replacement_count: usize,
    pub error_message: Option<String>,
    /// Placeholders that could not be replaced while the rest of the file was.
    pub match_errors: Vec<String>,
    pub backup_path: Option<PathBuf>,
}

impl FileReplaceResult {
    pub(crate) fn failed(file_path: PathBuf, error: &Error) -> Self {
        Self {
            file_path,
            is_success: false,
            replacement_count: 0,
            error_message: Some(error.to_string()),
            match_errors: Vec::new(),
            backup_path: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchReplaceResult {
    pub file_results: Vec<FileReplaceResult>,
    pub total_replacements: usize,
    pub has_errors: bool,
    pub cancelled: bool,
}

impl BatchReplaceResult {
    pub(crate) fn from_files(file_results: Vec<FileReplaceResult>, cancelled: bool) -> Self {
        let total_replacements = file_results.iter().map(|r| r.replacement_count).sum();
        let has_errors = file_results
            .iter()
            .any(|r| !r.is_success || !r.match_errors.is_empty());
        Self {
            file_results,
            total_replacements,
            has_errors,
            cancelled,
        }
    }
}

/// Dry run of a replace call.
#[derive(Clone, Debug, Serialize)]
pub struct PreviewResult {
    pub files_to_process: Vec<PathBuf>,
    pub placeholders_to_replace: Vec<Placeholder>,
}

/// Native size and format of an image, probed from its bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: image::ImageFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_falls_back_to_case_insensitive_trimmed_key() {
        let map: ReplacementMap = [("Client Name", "Ann")].into_iter().collect();
        assert_eq!(map.get("Client Name"), Some("Ann"));
        assert_eq!(map.get(" client name "), Some("Ann"));
        assert_eq!(map.get("client"), None);
    }

    #[test]
    fn validation_rejects_empty_map_and_empty_keys() {
        assert!(matches!(ReplacementMap::new().validate(), Err(Error::InputValidation(_))));
        let map: ReplacementMap = [("  ", "x")].into_iter().collect();
        assert!(matches!(map.validate(), Err(Error::InputValidation(_))));
    }
}
