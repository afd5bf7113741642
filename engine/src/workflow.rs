//! Generate-then-persist orchestration over the store.

use oasis_protocol::ResolvedMode;
use oasis_protocol::RiskRequest;
use oasis_protocol::RiskResponse;
use oasis_protocol::RunMode;
use oasis_store::AssessmentStore;
use oasis_store::AssessmentVersion;
use oasis_store::NewVersion;
use serde::Serialize;
use tracing::info;

use crate::config::EngineConfig;
use crate::errors::Result;
use crate::pipeline::generate_with_prompt;
use crate::prompts::build_user_prompt;
use crate::provider::PromptPair;
use crate::resolver::PromptResolver;
use crate::resolver::ResolvedPrompt;

/// Per-run options for [`Engine::run_assessment`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    pub model_override: Option<String>,
    /// Blank or absent selects `default`.
    pub prompt_variant: Option<String>,
    /// Falls back to the request's own flag.
    pub rag_enabled: Option<bool>,
}

/// Outcome of [`Engine::test_run_variant`]; nothing is persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantTestRun {
    pub prompt_variant: String,
    pub system_prompt_sha256: String,
    pub user_prompt: String,
    pub trace_id: String,
    pub resolved_mode: ResolvedMode,
    pub resolved_model: String,
    pub response: RiskResponse,
}

pub struct Engine {
    config: EngineConfig,
    store: AssessmentStore,
    resolver: PromptResolver,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let store = AssessmentStore::open(&config.store_path);
        Self::with_store(config, store)
    }

    pub fn with_store(config: EngineConfig, store: AssessmentStore) -> Self {
        let resolver = PromptResolver::new(store.clone(), config.prompt_variants_dir.clone());
        Self {
            config,
            store,
            resolver,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &AssessmentStore {
        &self.store
    }

    pub fn resolver(&self) -> &PromptResolver {
        &self.resolver
    }

    /// Generate a response for `request` and persist it as the next version
    /// of `assessment_id`. Nothing is written unless generation succeeds.
    pub async fn run_assessment(
        &self,
        assessment_id: &str,
        request: RiskRequest,
        options: RunOptions,
    ) -> Result<AssessmentVersion> {
        // Fail fast before paying for a generation.
        self.store.get_assessment(assessment_id)?;

        let (resolved, prompt) = self.render(options.prompt_variant.as_deref(), &request)?;
        let generation = generate_with_prompt(
            &self.config,
            &prompt,
            options.mode,
            options.model_override.as_deref(),
        )
        .await?;

        let rag_enabled = options.rag_enabled.or(request.rag_enabled);
        let version = self.store.create_version(
            assessment_id,
            NewVersion {
                trace_id: generation.trace_id,
                mode: options.mode,
                resolved_mode: generation.resolved_mode,
                llm_provider: generation.provider,
                llm_model: generation.resolved_model,
                prompt_variant: resolved.name,
                system_prompt_sha256: resolved.sha256,
                user_prompt: prompt.user,
                rag_enabled,
                request,
                response: generation.response,
            },
        )?;
        info!(
            assessment_id,
            version_id = %version.version_id,
            version_number = version.version_number,
            trace_id = %version.trace_id,
            "assessment run stored"
        );
        Ok(version)
    }

    /// Run `variant` against `request` without persisting anything.
    pub async fn test_run_variant(
        &self,
        variant: &str,
        request: &RiskRequest,
        mode: RunMode,
        model_override: Option<&str>,
    ) -> Result<VariantTestRun> {
        let (resolved, prompt) = self.render(Some(variant), request)?;
        let generation = generate_with_prompt(&self.config, &prompt, mode, model_override).await?;
        Ok(VariantTestRun {
            prompt_variant: resolved.name,
            system_prompt_sha256: resolved.sha256,
            user_prompt: prompt.user,
            trace_id: generation.trace_id,
            resolved_mode: generation.resolved_mode,
            resolved_model: generation.resolved_model,
            response: generation.response,
        })
    }

    fn render(
        &self,
        variant: Option<&str>,
        request: &RiskRequest,
    ) -> Result<(ResolvedPrompt, PromptPair)> {
        let resolved = self.resolver.resolve(variant)?;
        let prompt = PromptPair {
            system: resolved.text.clone(),
            user: build_user_prompt(request),
        };
        Ok((resolved, prompt))
    }
}
