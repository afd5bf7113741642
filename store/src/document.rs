use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::error::StoreError;
use crate::records::Assessment;
use crate::records::AssessmentVersion;
use crate::records::Feedback;
use crate::records::Project;
use crate::records::PromptTemplate;

pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// In-memory image of the store file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreDocument {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
    #[serde(default)]
    pub assessments: BTreeMap<String, Assessment>,
    #[serde(default)]
    pub versions: BTreeMap<String, AssessmentVersion>,
    #[serde(default)]
    pub feedback: BTreeMap<String, Feedback>,
    #[serde(default)]
    pub prompt_templates: BTreeMap<String, PromptTemplate>,
    /// Top-level keys this build does not know about.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            projects: BTreeMap::new(),
            assessments: BTreeMap::new(),
            versions: BTreeMap::new(),
            feedback: BTreeMap::new(),
            prompt_templates: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Load the document at `path`. A missing or blank file is an empty store.
pub(crate) fn load(path: &Path) -> Result<StoreDocument> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StoreDocument::default());
        }
        Err(err) => return Err(err.into()),
    };
    if raw.trim().is_empty() {
        return Ok(StoreDocument::default());
    }

    let value: Value = serde_json::from_str(&raw)?;
    if !value.is_object() {
        return Err(StoreError::Corrupt(format!(
            "{} does not contain a JSON object",
            path.display()
        )));
    }
    Ok(serde_json::from_value(value)?)
}

/// Persist atomically: write a uniquely named temp file next to `path`, flush
/// it, then rename it over `path`.
pub(crate) fn persist(path: &Path, doc: &StoreDocument) -> Result<()> {
    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let json = serde_json::to_string_pretty(doc)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty_document() {
        let tmp = TempDir::new().unwrap();
        let doc = load(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(doc, StoreDocument::default());
    }

    #[test]
    fn blank_file_is_empty_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        fs::write(&path, "  \n").unwrap();
        assert_eq!(load(&path).unwrap(), StoreDocument::default());
    }

    #[test]
    fn non_object_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(load(&path), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn unknown_keys_survive_rewrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.json");
        fs::write(&path, r#"{"schema_version": 1, "audit": {"owner": "grc"}}"#).unwrap();

        let doc = load(&path).unwrap();
        persist(&path, &doc).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["audit"]["owner"], "grc");
        assert!(raw["projects"].is_object());
    }

    #[test]
    fn persist_leaves_no_tmp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("store.json");
        persist(&path, &StoreDocument::default()).unwrap();
        persist(&path, &StoreDocument::default()).unwrap();
        assert!(path.exists());

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("store.json")]);
    }
}
