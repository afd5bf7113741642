//! OpenAI-compatible chat-completion client.
//!
//! Every request forces a call to [`TOOL_NAME`] so the model answers with
//! schema-shaped arguments. Two recoveries are built in:
//!
//! - parameter rejection: the primary [`ParamSet`] is swapped for the
//!   alternate one and the request is sent once more;
//! - truncation: a `length` finish with a token cap applied is retried once
//!   without the cap.
//!
//! Anything else surfaces unchanged.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tracing::info;
use tracing::warn;

use super::ChatCompletions;
use super::ChatMessage;
use super::Completion;
use super::ToolCall;
use super::schema::TOOL_NAME;
use super::schema::risk_assessment_schema;
use crate::config::EngineConfig;
use crate::errors::ApiError;
use crate::errors::EngineError;
use crate::errors::Result;

/// Optional sampling and token-limit parameters for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSet {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl ParamSet {
    fn without_cap(self) -> Self {
        Self {
            max_tokens: None,
            ..self
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    param: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub struct LiveProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl LiveProvider {
    /// Build a client for `model`. Fails when no API key is configured.
    pub fn new(cfg: &EngineConfig, model: impl Into<String>) -> Result<Self> {
        let api_key = cfg
            .api_key()
            .ok_or(EngineError::MissingCredential("OPENAI_API_KEY"))?
            .to_string();
        let model = model.into().trim().to_string();
        if model.is_empty() {
            return Err(EngineError::config("LLM model is not configured"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(ApiError::from)?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                cfg.openai_base_url.trim_end_matches('/')
            ),
            api_key,
            model,
            temperature: cfg.temperature,
            max_output_tokens: cfg.max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Reasoning model families reject custom temperatures and prefer no
    /// explicit token cap.
    fn is_reasoning_family(&self) -> bool {
        let model = self.model.to_ascii_lowercase();
        ["gpt-5", "o1", "o3", "o4"]
            .iter()
            .any(|prefix| model.starts_with(prefix))
    }

    /// `[primary, alternate]` parameter sets for this model.
    pub fn parameter_sets(&self) -> [ParamSet; 2] {
        if self.is_reasoning_family() {
            [
                ParamSet {
                    temperature: None,
                    max_tokens: None,
                },
                ParamSet {
                    temperature: None,
                    max_tokens: Some(self.max_output_tokens),
                },
            ]
        } else {
            [
                ParamSet {
                    temperature: Some(self.temperature),
                    max_tokens: Some(self.max_output_tokens),
                },
                ParamSet {
                    temperature: None,
                    max_tokens: None,
                },
            ]
        }
    }

    fn build_request_body(&self, messages: &[ChatMessage], params: ParamSet) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "tools": [{
                "type": "function",
                "function": {
                    "name": TOOL_NAME,
                    "description": "Submit the structured risk assessment.",
                    "parameters": risk_assessment_schema(),
                }
            }],
            "tool_choice": {
                "type": "function",
                "function": { "name": TOOL_NAME }
            }
        });
        if let Some(temp) = params.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: ParamSet,
    ) -> std::result::Result<Completion, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| ApiError::Parse("API key is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, auth_value);

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&self.build_request_body(messages, params))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => ApiError::ApiResponse {
                    status: status.as_u16(),
                    message: body.error.message,
                    error_type: body.error.error_type,
                    code: body.error.code,
                    param: body.error.param,
                },
                Err(_) => ApiError::ApiResponse {
                    status: status.as_u16(),
                    message: text,
                    error_type: None,
                    code: None,
                    param: None,
                },
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::Parse(format!("invalid chat completion body: {e}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Parse("chat completion has no choices".to_string()))?;

        Ok(Completion {
            content: choice.message.content,
            tool_call: choice
                .message
                .tool_calls
                .into_iter()
                .next()
                .map(|call| ToolCall {
                    name: call.function.name,
                    arguments: call.function.arguments,
                }),
            finish_reason: choice.finish_reason,
        })
    }
}

impl ChatCompletions for LiveProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let [primary, alternate] = self.parameter_sets();
        info!(model = %self.model, ?primary, "sending chat completion");

        let (completion, params) = match self.send(messages, primary).await {
            Ok(completion) => (completion, primary),
            Err(err) if err.is_parameter_rejection() => {
                warn!(
                    model = %self.model,
                    error = %err,
                    ?alternate,
                    "endpoint rejected parameters; retrying with alternate set"
                );
                (self.send(messages, alternate).await?, alternate)
            }
            Err(err) => return Err(err.into()),
        };

        if !completion.is_truncated() {
            return Ok(completion);
        }
        if params.max_tokens.is_none() {
            return Err(EngineError::Truncated);
        }

        warn!(
            model = %self.model,
            max_tokens = ?params.max_tokens,
            "completion truncated; retrying without token cap"
        );
        let retry = self.send(messages, params.without_cap()).await?;
        if retry.is_truncated() {
            return Err(EngineError::Truncated);
        }
        Ok(retry)
    }
}
