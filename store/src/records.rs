use chrono::DateTime;
use chrono::Utc;
use oasis_protocol::ResolvedMode;
use oasis_protocol::RiskRequest;
use oasis_protocol::RiskResponse;
use oasis_protocol::RunMode;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An assessment groups the immutable versions generated for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub assessment_id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Request the assessment was created from.
    pub payload: RiskRequest,
    #[serde(default)]
    pub version_count: u32,
    /// Version ids in creation order.
    #[serde(default)]
    pub version_ids: Vec<String>,
    #[serde(default)]
    pub latest_version_id: Option<String>,
}

/// Listing row for an assessment with its latest version's provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSummary {
    pub assessment_id: String,
    pub project_id: String,
    pub title: String,
    pub version_count: u32,
    pub latest_version_id: Option<String>,
    pub latest_version_number: Option<u32>,
    pub latest_trace_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable generation result with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentVersion {
    pub version_id: String,
    pub assessment_id: String,
    pub version_number: u32,
    pub created_at: DateTime<Utc>,
    pub trace_id: String,
    pub mode: RunMode,
    pub resolved_mode: ResolvedMode,
    pub llm_provider: String,
    pub llm_model: String,
    pub prompt_variant: String,
    pub system_prompt_sha256: String,
    pub user_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_enabled: Option<bool>,
    pub request: RiskRequest,
    pub response: RiskResponse,
    #[serde(default)]
    pub feedback_ids: Vec<String>,
}

/// Inputs for [`crate::AssessmentStore::create_version`].
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub trace_id: String,
    pub mode: RunMode,
    pub resolved_mode: ResolvedMode,
    pub llm_provider: String,
    pub llm_model: String,
    pub prompt_variant: String,
    pub system_prompt_sha256: String,
    pub user_prompt: String,
    pub rag_enabled: Option<bool>,
    pub request: RiskRequest,
    pub response: RiskResponse,
}

/// Reviewer feedback attached to a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub feedback_id: String,
    pub assessment_id: String,
    pub version_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_edits: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewFeedback {
    pub rating: Option<u8>,
    pub flags: Vec<String>,
    pub comment: Option<String>,
    pub recommended_edits: Option<serde_json::Value>,
    pub reviewer: Option<String>,
}

/// Result of attaching feedback.
///
/// `reassigned_from` is set when the caller named an assessment that does
/// not own the version; the stored record carries the owning assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackReceipt {
    pub feedback: Feedback,
    pub reassigned_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplateVersion {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub content: String,
}

/// Named system-prompt template with its full edit history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_version: u32,
    #[serde(default)]
    pub versions: Vec<PromptTemplateVersion>,
}

impl PromptTemplate {
    pub fn latest(&self) -> Option<&PromptTemplateVersion> {
        self.versions
            .iter()
            .find(|v| v.version == self.current_version)
            .or_else(|| self.versions.last())
    }
}
