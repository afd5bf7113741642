//! Completeness checks and reply classification.

use oasis_protocol::RiskResponse;

use crate::errors::EngineError;
use crate::normalize::normalize_completion;
use crate::provider::Completion;

/// `<risk_id>.<field>` for every empty list field on every risk.
pub fn missing_sections(response: &RiskResponse) -> Vec<String> {
    response
        .risks
        .iter()
        .flat_map(|risk| {
            risk.empty_list_fields()
                .into_iter()
                .map(move |field| format!("{}.{field}", risk.risk_id))
        })
        .collect()
}

/// Classification of one provider reply.
#[derive(Debug)]
pub enum Outcome {
    Accepted(RiskResponse),
    /// No strategy produced JSON.
    Unparsable { detail: String },
    /// JSON with the wrong shape.
    SchemaViolation { missing: Vec<String>, detail: String },
    /// Well-formed but some risks lack required sections.
    Incomplete {
        response: RiskResponse,
        missing: Vec<String>,
    },
}

impl Outcome {
    /// Normalize and check a completion.
    pub fn classify(completion: &Completion, trace_id: &str) -> Self {
        match normalize_completion(completion, trace_id) {
            Ok(response) => {
                let missing = missing_sections(&response);
                if missing.is_empty() {
                    Self::Accepted(response)
                } else {
                    Self::Incomplete { response, missing }
                }
            }
            Err(EngineError::SchemaViolation { missing, detail }) => {
                Self::SchemaViolation { missing, detail }
            }
            Err(err) => Self::Unparsable {
                detail: err.to_string(),
            },
        }
    }

    /// Sections still missing, as far as this reply shows.
    pub fn missing(&self) -> &[String] {
        match self {
            Self::Accepted(_) | Self::Unparsable { .. } => &[],
            Self::SchemaViolation { missing, .. } | Self::Incomplete { missing, .. } => missing,
        }
    }

    /// Short label for logs and error reasons.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Accepted(_) => "accepted",
            Self::Unparsable { .. } => "unparsable",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::Incomplete { .. } => "incomplete",
        }
    }

    /// Human-readable problems, one per line, for the corrective prompt.
    pub fn violations(&self) -> Vec<String> {
        match self {
            Self::Accepted(_) => Vec::new(),
            Self::Unparsable { detail } => {
                vec![format!("The reply was not valid JSON ({detail}).")]
            }
            Self::SchemaViolation { missing, detail } => {
                let mut lines = vec![format!("The reply did not match the schema ({detail}).")];
                lines.extend(missing.iter().map(|key| format!("Missing top-level key: {key}")));
                lines
            }
            Self::Incomplete { missing, .. } => missing
                .iter()
                .map(|section| format!("Empty or missing list: {section}"))
                .collect(),
        }
    }
}
