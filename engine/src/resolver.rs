//! System-prompt variant resolution.
//!
//! The namespace merges `*.txt` files from the configured variants directory
//! with store-managed templates (templates win on a name clash). `default`
//! always resolves to [`SYSTEM_PROMPT`]. The merged map is built lazily and
//! cached under a stamp made of the resolver's own generation and the store's
//! template generation. A template write through any store handle, or a call
//! to [`PromptResolver::invalidate`], changes the stamp and the next lookup
//! rebuilds.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use chrono::DateTime;
use chrono::Utc;
use oasis_store::AssessmentStore;
use oasis_store::PromptTemplate;
use oasis_store::RESERVED_TEMPLATE_NAME;
use oasis_store::sha256_hex;
use serde::Serialize;
use strum_macros::Display;
use tracing::debug;
use tracing::warn;

use crate::errors::EngineError;
use crate::errors::Result;
use crate::prompts::SYSTEM_PROMPT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VariantSource {
    Builtin,
    Store,
}

/// A resolved system prompt and its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub name: String,
    pub text: String,
    pub sha256: String,
}

impl ResolvedPrompt {
    pub fn is_default(&self) -> bool {
        self.name == RESERVED_TEMPLATE_NAME
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantHistoryEntry {
    pub version: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub sha256: String,
    pub notes: Option<String>,
}

/// Admin view of one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantDetail {
    pub name: String,
    pub source: VariantSource,
    /// Editable through the template operations.
    pub managed: bool,
    pub current_version: u32,
    pub updated_at: Option<DateTime<Utc>>,
    pub content: String,
    pub history: Vec<VariantHistoryEntry>,
}

#[derive(Debug, Clone)]
enum Variant {
    Builtin(String),
    Store(PromptTemplate),
}

impl Variant {
    fn content(&self) -> Option<&str> {
        match self {
            Self::Builtin(text) => Some(text),
            Self::Store(template) => template.latest().map(|v| v.content.as_str()),
        }
    }
}

type VariantMap = BTreeMap<String, Variant>;

/// (resolver generation, store template generation)
type Stamp = (u64, u64);

struct CachedVariants {
    stamp: Stamp,
    map: Arc<VariantMap>,
}

pub struct PromptResolver {
    store: AssessmentStore,
    builtin_dir: Option<PathBuf>,
    generation: AtomicU64,
    cache: RwLock<Option<CachedVariants>>,
}

impl PromptResolver {
    pub fn new(store: AssessmentStore, builtin_dir: Option<PathBuf>) -> Self {
        Self {
            store,
            builtin_dir,
            generation: AtomicU64::new(0),
            cache: RwLock::new(None),
        }
    }

    /// Resolve `name` to its system prompt. Blank or `default` selects the
    /// built-in prompt.
    pub fn resolve(&self, name: Option<&str>) -> Result<ResolvedPrompt> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let Some(name) = name.filter(|n| *n != RESERVED_TEMPLATE_NAME) else {
            return Ok(ResolvedPrompt {
                name: RESERVED_TEMPLATE_NAME.to_string(),
                text: SYSTEM_PROMPT.to_string(),
                sha256: sha256_hex(SYSTEM_PROMPT),
            });
        };

        let variants = self.variants()?;
        let text = variants
            .get(name)
            .and_then(Variant::content)
            .ok_or_else(|| EngineError::UnknownVariant(name.to_string()))?;
        Ok(ResolvedPrompt {
            name: name.to_string(),
            text: text.to_string(),
            sha256: sha256_hex(text),
        })
    }

    /// Drop the cached namespace; the next lookup rebuilds it.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::AcqRel);
        *cache = None;
        debug!("prompt variant cache invalidated");
    }

    /// Every resolvable name, sorted, including `default`.
    pub fn variant_names(&self) -> Result<Vec<String>> {
        let variants = self.variants()?;
        let mut names: Vec<String> = variants.keys().cloned().collect();
        names.push(RESERVED_TEMPLATE_NAME.to_string());
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn describe(&self, name: &str) -> Result<VariantDetail> {
        let name = name.trim();
        if name.is_empty() || name == RESERVED_TEMPLATE_NAME {
            return Ok(builtin_detail(RESERVED_TEMPLATE_NAME, SYSTEM_PROMPT));
        }

        let variants = self.variants()?;
        match variants.get(name) {
            Some(Variant::Builtin(text)) => Ok(builtin_detail(name, text)),
            Some(Variant::Store(template)) => Ok(template_detail(template)),
            None => Err(EngineError::UnknownVariant(name.to_string())),
        }
    }

    pub fn create_template(
        &self,
        name: &str,
        content: &str,
        notes: Option<&str>,
    ) -> Result<PromptTemplate> {
        let template = self.store.create_prompt_template(name, content, notes);
        self.after_write(template)
    }

    pub fn update_template(
        &self,
        name: &str,
        content: &str,
        notes: Option<&str>,
    ) -> Result<PromptTemplate> {
        let template = self.store.update_prompt_template(name, content, notes);
        self.after_write(template)
    }

    pub fn upsert_template(
        &self,
        name: &str,
        content: &str,
        notes: Option<&str>,
    ) -> Result<PromptTemplate> {
        let template = self.store.upsert_prompt_template(name, content, notes);
        self.after_write(template)
    }

    fn after_write(
        &self,
        result: oasis_store::Result<PromptTemplate>,
    ) -> Result<PromptTemplate> {
        let template = result?;
        self.invalidate();
        Ok(template)
    }

    fn stamp(&self) -> Stamp {
        (
            self.generation.load(Ordering::Acquire),
            self.store.template_generation(),
        )
    }

    fn variants(&self) -> Result<Arc<VariantMap>> {
        let stamp = self.stamp();
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|cached| cached.stamp == stamp)
        {
            return Ok(Arc::clone(&cached.map));
        }

        let map = Arc::new(self.build_variants()?);
        self.store_if_current(stamp, &map);
        Ok(map)
    }

    /// Cache `map` only if nothing invalidated it while it was being built.
    fn store_if_current(&self, stamp: Stamp, map: &Arc<VariantMap>) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if self.stamp() != stamp {
            debug!("prompt variant rebuild raced a write; not cached");
            return;
        }
        *cache = Some(CachedVariants {
            stamp,
            map: Arc::clone(map),
        });
    }

    fn build_variants(&self) -> Result<VariantMap> {
        let mut map = match &self.builtin_dir {
            Some(dir) => load_builtin_variants(dir)?,
            None => VariantMap::new(),
        };
        for template in self.store.list_prompt_templates()? {
            map.insert(template.name.clone(), Variant::Store(template));
        }
        debug!(variants = map.len(), "prompt variant cache rebuilt");
        Ok(map)
    }
}

fn load_builtin_variants(dir: &Path) -> Result<VariantMap> {
    let mut map = VariantMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(dir = %dir.display(), "prompt variants directory missing");
            return Ok(map);
        }
        Err(err) => {
            return Err(EngineError::config_with_source(
                format!("failed to read prompt variants in {}", dir.display()),
                err,
            ));
        }
    };

    for entry in entries {
        let path = entry
            .map_err(|e| EngineError::config_with_source("failed to list prompt variants", e))?
            .path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let Some(name) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != RESERVED_TEMPLATE_NAME)
        else {
            continue;
        };
        let content = std::fs::read_to_string(&path).map_err(|e| {
            EngineError::config_with_source(format!("failed to read {}", path.display()), e)
        })?;
        let content = content.trim();
        if !content.is_empty() {
            map.insert(name.to_string(), Variant::Builtin(content.to_string()));
        }
    }
    Ok(map)
}

fn builtin_detail(name: &str, text: &str) -> VariantDetail {
    let sha256 = sha256_hex(text);
    VariantDetail {
        name: name.to_string(),
        source: VariantSource::Builtin,
        managed: false,
        current_version: 1,
        updated_at: None,
        content: text.to_string(),
        history: vec![VariantHistoryEntry {
            version: 1,
            created_at: None,
            sha256,
            notes: None,
        }],
    }
}

fn template_detail(template: &PromptTemplate) -> VariantDetail {
    VariantDetail {
        name: template.name.clone(),
        source: VariantSource::Store,
        managed: true,
        current_version: template.current_version,
        updated_at: Some(template.updated_at),
        content: template
            .latest()
            .map(|v| v.content.clone())
            .unwrap_or_default(),
        history: template
            .versions
            .iter()
            .map(|v| VariantHistoryEntry {
                version: v.version,
                created_at: Some(v.created_at),
                sha256: v.sha256.clone(),
                notes: v.notes.clone(),
            })
            .collect(),
    }
}
