//! Exchanging entries as JSON files.
//!
//! Imports are validated record by record. Whatever passes replaces the whole
//! collection; whatever fails is reported with its index.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::data::{now_iso, Entry};
use super::library::Library;
use crate::error::{StoreError, ValidationError, ValidationKind};

const REQUIRED_KEYS: [&str; 5] = ["title", "description", "poster_path", "screenshots_paths", "tags"];

/// Summary of an import
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Check one record and turn it into an [`Entry`]
pub fn validate_record(index: usize, value: &Value) -> Result<Entry, ValidationError> {
    let fail = |kind| ValidationError { index, kind };

    let Some(record) = value.as_object() else {
        return Err(fail(ValidationKind::NotAnObject));
    };

    // A title that is present but unusable is reported as such, even when
    // other keys are missing as well
    if let Some(title) = record.get("title") {
        if !title.as_str().is_some_and(|t| !t.trim().is_empty()) {
            return Err(fail(ValidationKind::InvalidTitle));
        }
    }

    let missing: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|key| !record.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(fail(ValidationKind::MissingKeys(missing)));
    }

    let title = string_field(record, "title").ok_or(fail(ValidationKind::InvalidTitle))?;
    let description =
        string_field(record, "description").ok_or(fail(ValidationKind::InvalidDescription))?;
    let poster_path =
        string_field(record, "poster_path").ok_or(fail(ValidationKind::InvalidPosterPath))?;
    let screenshots_paths = string_list(record, "screenshots_paths")
        .ok_or(fail(ValidationKind::InvalidScreenshots))?;
    let tags = string_list(record, "tags").ok_or(fail(ValidationKind::InvalidTags))?;

    let added_date = string_field(record, "added_date").unwrap_or_else(now_iso);

    Ok(Entry {
        title,
        description,
        poster_path,
        screenshots_paths,
        tags,
        added_date,
    })
}

fn string_field(record: &Map<String, Value>, key: &str) -> Option<String> {
    record.get(key)?.as_str().map(str::to_string)
}

fn string_list(record: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    record
        .get(key)?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

impl Library {
    /// Validate `data` (a JSON array of records) and, if anything is valid,
    /// replace the collection with the valid records.
    pub fn import_value(&mut self, data: &Value) -> Result<ImportReport, StoreError> {
        let records = data.as_array().ok_or(StoreError::NotAList)?;

        let mut valid = Vec::new();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();
        for (index, record) in records.iter().enumerate() {
            match validate_record(index, record) {
                Ok(entry) if !seen.insert(entry.title.clone()) => {
                    let duplicate = ValidationError {
                        index,
                        kind: ValidationKind::DuplicateTitle,
                    };
                    errors.push(duplicate.to_string());
                }
                Ok(entry) => valid.push(entry),
                Err(e) => errors.push(e.to_string()),
            }
        }

        let imported = valid.len();
        if imported > 0 {
            self.replace_all(valid)?;
        }

        let report = ImportReport {
            imported,
            skipped: records.len() - imported,
            errors,
        };
        tracing::info!(
            "📥 Import: {} imported, {} skipped",
            report.imported,
            report.skipped
        );
        Ok(report)
    }

    /// Read a JSON file and import it
    pub fn import_path(&mut self, path: &Path) -> Result<ImportReport, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        let data: Value = serde_json::from_str(&text)?;
        self.import_value(&data)
    }
}

/// Write `entries` as pretty JSON. A `.json` extension is added if the path
/// lacks one; the path actually written is returned.
pub fn export_entries(entries: &[Entry], path: &Path) -> Result<PathBuf, StoreError> {
    let path = if path.extension().is_some_and(|ext| ext == "json") {
        path.to_path_buf()
    } else {
        let mut with_ext = path.as_os_str().to_owned();
        with_ext.push(".json");
        PathBuf::from(with_ext)
    };

    let json = serde_json::to_string_pretty(entries)?;
    fs::write(&path, json).map_err(|e| StoreError::io(&path, e))?;

    tracing::info!("📤 Exported {} entries to {}", entries.len(), path.display());
    Ok(path)
}
