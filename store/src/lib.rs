//! File-backed versioned store for projects, assessments, generated versions,
//! reviewer feedback and store-managed prompt templates.
//!
//! The whole store is a single JSON document. Every operation runs one
//! read-modify-write cycle under a process-wide lock and persists through a
//! uniquely named temp file followed by an atomic rename, so readers never
//! observe a partially written document. There is no cross-process locking: two
//! processes writing the same file can lose each other's updates.
//!
//! ## Layout
//!
//! ```text
//! {
//!   "schema_version": 1,
//!   "projects":         { <project_id>:    Project },
//!   "assessments":      { <assessment_id>: Assessment },
//!   "versions":         { <version_id>:    AssessmentVersion },
//!   "feedback":         { <feedback_id>:   Feedback },
//!   "prompt_templates": { <name>:          PromptTemplate }
//! }
//! ```
//!
//! Unknown top-level keys are carried through every rewrite untouched.

mod document;
mod error;
mod records;
mod store;
mod templates;
mod validation;

pub use document::SCHEMA_VERSION;
pub use document::StoreDocument;
pub use error::Result;
pub use error::StoreError;
pub use records::Assessment;
pub use records::AssessmentSummary;
pub use records::AssessmentVersion;
pub use records::Feedback;
pub use records::FeedbackReceipt;
pub use records::NewFeedback;
pub use records::NewVersion;
pub use records::Project;
pub use records::PromptTemplate;
pub use records::PromptTemplateVersion;
pub use store::AssessmentStore;
pub use templates::RESERVED_TEMPLATE_NAME;
pub use templates::validate_template_name;

use sha2::Digest;
use sha2::Sha256;

/// Upper bound for any caller-supplied list cap.
pub const MAX_LIST_LIMIT: usize = 200;

/// Clamp a caller-supplied list cap into `1..=MAX_LIST_LIMIT`.
///
/// `None` means "as many as allowed".
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Lowercase hex SHA-256 of `text`.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
