use serde::Deserialize;
use serde::Serialize;

/// Structured risk-assessment request submitted by an analyst.
///
/// Only `business_type` and `risk_domain` are required; every other field
/// refines the rendered prompt and is omitted from serialized output when
/// unset so stored payloads stay minimal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskRequest {
    pub business_type: String,
    pub risk_domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_horizon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_controls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objectives: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_outputs: Option<String>,
    /// Follow-up instructions from a previous run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinements: Option<String>,
    /// Free-form steering tokens such as `tone=regulatory`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub control_tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_tuning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_enabled: Option<bool>,
}

impl RiskRequest {
    pub fn new(business_type: impl Into<String>, risk_domain: impl Into<String>) -> Self {
        Self {
            business_type: business_type.into(),
            risk_domain: risk_domain.into(),
            ..Default::default()
        }
    }
}
