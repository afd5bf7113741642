//! Generation providers.
//!
//! A closed set: [`Provider::Mock`] answers from a canned, schema-complete
//! register without touching the network, and [`Provider::Live`] drives an
//! OpenAI-compatible chat-completion endpoint through the repair loop.

mod live;
mod mock;
mod schema;

pub use live::LiveProvider;
pub use live::ParamSet;
pub use mock::MockProvider;
pub use mock::mock_response;
pub use schema::TOOL_NAME;
pub use schema::risk_assessment_schema;

use oasis_protocol::ResolvedMode;
use oasis_protocol::RiskResponse;
use serde::Serialize;
use strum_macros::Display;

use crate::errors::Result;
use crate::repair;

/// Rendered prompts for one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Function call returned by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
}

/// One assistant reply as returned by the endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_call: Option<ToolCall>,
    pub finish_reason: Option<String>,
}

impl Completion {
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("length")
    }

    /// Arguments of the expected function call, if the model made one.
    pub fn tool_arguments(&self) -> Option<&str> {
        self.tool_call
            .as_ref()
            .filter(|call| call.name == TOOL_NAME)
            .map(|call| call.arguments.as_str())
    }

    /// The text a repair round replays as the assistant's previous turn.
    pub fn payload(&self) -> &str {
        self.tool_arguments()
            .or(self.content.as_deref())
            .unwrap_or_default()
    }
}

/// Anything that can answer a chat conversation with one completion.
pub(crate) trait ChatCompletions {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion>;
}

pub enum Provider {
    Mock(MockProvider),
    Live(LiveProvider),
}

impl Provider {
    pub fn resolved_mode(&self) -> ResolvedMode {
        match self {
            Self::Mock(_) => ResolvedMode::Mock,
            Self::Live(_) => ResolvedMode::Live,
        }
    }

    /// Model name recorded on versions.
    pub fn model(&self) -> &str {
        match self {
            Self::Mock(_) => MockProvider::MODEL,
            Self::Live(provider) => provider.model(),
        }
    }

    /// Produce a validated, complete response carrying `trace_id`.
    pub async fn generate(&self, prompt: &PromptPair, trace_id: &str) -> Result<RiskResponse> {
        match self {
            Self::Mock(provider) => Ok(provider.generate(trace_id)),
            Self::Live(provider) => repair::generate_with_repair(provider, prompt, trace_id).await,
        }
    }
}
