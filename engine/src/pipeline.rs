//! Mode resolution, provider selection and the `generate` entry point.

use oasis_protocol::ResolvedMode;
use oasis_protocol::RiskRequest;
use oasis_protocol::RiskResponse;
use oasis_protocol::RunMode;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::errors::Result;
use crate::prompts::SYSTEM_PROMPT;
use crate::prompts::build_user_prompt;
use crate::provider::LiveProvider;
use crate::provider::MockProvider;
use crate::provider::PromptPair;
use crate::provider::Provider;

const SUPPORTED_PROVIDERS: &[&str] = &["openai"];

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub mode: RunMode,
    /// Replaces the configured model for live runs.
    pub model_override: Option<String>,
    /// Replaces the built-in system prompt.
    pub system_prompt_override: Option<String>,
}

/// A validated response with the provenance of the run that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub response: RiskResponse,
    pub trace_id: String,
    pub resolved_mode: ResolvedMode,
    pub resolved_model: String,
    /// Configured provider name, recorded even for mock runs.
    pub provider: String,
}

pub fn new_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Pick the provider for `mode`. Live runs need a supported provider name
/// and a credential; mock runs need neither.
pub fn select_provider(
    config: &EngineConfig,
    mode: RunMode,
    model_override: Option<&str>,
) -> Result<Provider> {
    match mode.resolve(config.mock_mode) {
        ResolvedMode::Mock => Ok(Provider::Mock(MockProvider)),
        ResolvedMode::Live => {
            let name = config.llm_provider.trim().to_ascii_lowercase();
            if !SUPPORTED_PROVIDERS.contains(&name.as_str()) {
                return Err(EngineError::UnsupportedProvider(config.llm_provider.clone()));
            }
            let model = model_override
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(&config.llm_model);
            Ok(Provider::Live(LiveProvider::new(config, model)?))
        }
    }
}

/// Render prompts for `request` and generate.
pub async fn generate(
    config: &EngineConfig,
    request: &RiskRequest,
    options: &GenerateOptions,
) -> Result<Generation> {
    let system = options
        .system_prompt_override
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(SYSTEM_PROMPT);
    let prompt = PromptPair {
        system: system.to_string(),
        user: build_user_prompt(request),
    };
    generate_with_prompt(
        config,
        &prompt,
        options.mode,
        options.model_override.as_deref(),
    )
    .await
}

/// Generate from already rendered prompts.
pub async fn generate_with_prompt(
    config: &EngineConfig,
    prompt: &PromptPair,
    mode: RunMode,
    model_override: Option<&str>,
) -> Result<Generation> {
    let provider = select_provider(config, mode, model_override)?;
    let trace_id = new_trace_id();
    info!(
        trace_id = %trace_id,
        requested_mode = %mode,
        resolved_mode = %provider.resolved_mode(),
        model = provider.model(),
        "generation started"
    );

    let response = provider.generate(prompt, &trace_id).await?;
    info!(
        trace_id = %trace_id,
        risks = response.risks.len(),
        "generation finished"
    );

    Ok(Generation {
        response,
        resolved_mode: provider.resolved_mode(),
        resolved_model: provider.model().to_string(),
        provider: config.llm_provider.clone(),
        trace_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::missing_sections;
    use pretty_assertions::assert_eq;

    fn request() -> RiskRequest {
        RiskRequest::new("Retail banking", "Operational")
    }

    #[tokio::test]
    async fn mock_run_is_complete_and_traced() {
        let config = EngineConfig::default();
        let generation = generate(&config, &request(), &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(generation.resolved_mode, ResolvedMode::Mock);
        assert_eq!(generation.resolved_model, "mock");
        assert_eq!(generation.provider, "openai");
        assert_eq!(generation.response.trace_id, generation.trace_id);
        assert!(missing_sections(&generation.response).is_empty());
    }

    #[tokio::test]
    async fn trace_ids_are_unique_per_run() {
        let config = EngineConfig::default();
        let options = GenerateOptions::default();
        let a = generate(&config, &request(), &options).await.unwrap();
        let b = generate(&config, &request(), &options).await.unwrap();
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn live_without_key_is_a_credential_error() {
        let config = EngineConfig::default();
        assert!(matches!(
            select_provider(&config, RunMode::Live, None),
            Err(EngineError::MissingCredential(_))
        ));
    }

    #[test]
    fn unsupported_provider_only_matters_for_live_runs() {
        let config = EngineConfig {
            llm_provider: "anthropic".to_string(),
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            select_provider(&config, RunMode::Live, None),
            Err(EngineError::UnsupportedProvider(name)) if name == "anthropic"
        ));
        assert!(matches!(
            select_provider(&config, RunMode::Mock, None),
            Ok(Provider::Mock(_))
        ));
    }

    #[test]
    fn model_override_applies_to_resolved_live_runs() {
        let config = EngineConfig {
            mock_mode: false,
            llm_provider: " OpenAI ".to_string(),
            openai_api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let provider = select_provider(&config, RunMode::Auto, Some("gpt-4.1")).unwrap();
        assert_eq!(provider.resolved_mode(), ResolvedMode::Live);
        assert_eq!(provider.model(), "gpt-4.1");

        let provider = select_provider(&config, RunMode::Live, Some("  ")).unwrap();
        assert_eq!(provider.model(), "gpt-4o-mini");

        let provider = select_provider(&config, RunMode::Mock, Some("gpt-4.1")).unwrap();
        assert_eq!(provider.model(), "mock");
    }
}
