//! Shared data types for the oasis risk-assessment engine.
//!
//! Everything here is plain serde data: the request an analyst submits, the
//! structured response the engine guarantees, and the run-mode vocabulary
//! recorded as provenance on every stored version.

pub mod mode;
pub mod request;
pub mod response;

pub use mode::ResolvedMode;
pub use mode::RunMode;
pub use request::RiskRequest;
pub use response::ControlMapping;
pub use response::RISK_LIST_FIELDS;
pub use response::Rating;
pub use response::RiskItem;
pub use response::RiskResponse;
pub use response::SourceReference;
pub use response::VulnerabilitySummary;
