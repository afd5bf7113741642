use std::cmp::Reverse;
use std::sync::LazyLock;

use chrono::Utc;
use regex_lite::Regex;
use tracing::info;

use crate::AssessmentStore;
use crate::document::StoreDocument;
use crate::error::Result;
use crate::error::StoreError;
use crate::records::PromptTemplate;
use crate::records::PromptTemplateVersion;
use crate::sha256_hex;
use crate::validation;

/// Name of the built-in system prompt. Never store-managed.
pub const RESERVED_TEMPLATE_NAME: &str = "default";

#[allow(clippy::expect_used)]
static TEMPLATE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,79}$").expect("valid template name regex")
});

/// Check a template name and return it trimmed.
pub fn validate_template_name(name: &str) -> Result<String> {
    let name = name.trim();
    if !TEMPLATE_NAME.is_match(name) {
        return Err(StoreError::invalid(format!(
            "invalid template name {name:?}: use 1-80 characters from [A-Za-z0-9._-] starting with a letter or digit"
        )));
    }
    if name.eq_ignore_ascii_case(RESERVED_TEMPLATE_NAME) {
        return Err(StoreError::invalid(format!(
            "template name {RESERVED_TEMPLATE_NAME:?} is reserved"
        )));
    }
    Ok(name.to_string())
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(StoreError::invalid("template content must not be blank"));
    }
    validation::bounded("content", content, validation::MAX_TEMPLATE_CHARS)
}

#[derive(Clone, Copy)]
enum WriteMode {
    Create,
    Update,
    Upsert,
}

impl AssessmentStore {
    /// Create a template at version 1. Fails if the name is taken.
    pub fn create_prompt_template(
        &self,
        name: &str,
        content: &str,
        notes: Option<&str>,
    ) -> Result<PromptTemplate> {
        self.write_template(name, content, notes, WriteMode::Create)
    }

    /// Append a content version to an existing template.
    pub fn update_prompt_template(
        &self,
        name: &str,
        content: &str,
        notes: Option<&str>,
    ) -> Result<PromptTemplate> {
        self.write_template(name, content, notes, WriteMode::Update)
    }

    /// Create the template or append a version to it.
    pub fn upsert_prompt_template(
        &self,
        name: &str,
        content: &str,
        notes: Option<&str>,
    ) -> Result<PromptTemplate> {
        self.write_template(name, content, notes, WriteMode::Upsert)
    }

    fn write_template(
        &self,
        name: &str,
        content: &str,
        notes: Option<&str>,
        mode: WriteMode,
    ) -> Result<PromptTemplate> {
        let name = validate_template_name(name)?;
        validate_content(content)?;
        let notes = validation::optional_text("notes", notes, validation::MAX_COMMENT_CHARS)?;

        let template = self.transact(|doc| {
            let exists = doc.prompt_templates.contains_key(&name);
            match mode {
                WriteMode::Create if exists => {
                    return Err(StoreError::AlreadyExists {
                        kind: "prompt template",
                        id: name,
                    });
                }
                WriteMode::Update if !exists => {
                    return Err(StoreError::not_found("prompt template", name));
                }
                _ => {}
            }
            Ok(append_version(doc, name, content, notes))
        })?;
        self.bump_template_generation();
        Ok(template)
    }

    pub fn get_prompt_template(&self, name: &str) -> Result<Option<PromptTemplate>> {
        self.read(|doc| Ok(doc.prompt_templates.get(name).cloned()))
    }

    /// Templates, most recently updated first.
    pub fn list_prompt_templates(&self) -> Result<Vec<PromptTemplate>> {
        self.read(|doc| {
            let mut templates: Vec<PromptTemplate> =
                doc.prompt_templates.values().cloned().collect();
            templates.sort_by_key(|r| Reverse(r.updated_at));
            Ok(templates)
        })
    }
}

fn append_version(
    doc: &mut StoreDocument,
    name: String,
    content: &str,
    notes: Option<String>,
) -> PromptTemplate {
    let now = Utc::now();
    let template = doc
        .prompt_templates
        .entry(name.clone())
        .or_insert_with(|| PromptTemplate {
            name: name.clone(),
            created_at: now,
            updated_at: now,
            current_version: 0,
            versions: Vec::new(),
        });

    let version = template.versions.len() as u32 + 1;
    template.versions.push(PromptTemplateVersion {
        version,
        created_at: now,
        sha256: sha256_hex(content),
        notes,
        content: content.to_string(),
    });
    template.current_version = version;
    template.updated_at = now;
    info!(template = %name, version, "prompt template version written");
    template.clone()
}
