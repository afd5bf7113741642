//! Risk-assessment generation engine.
//!
//! Turns a [`RiskRequest`](oasis_protocol::RiskRequest) into a validated
//! [`RiskResponse`](oasis_protocol::RiskResponse) and records it as an
//! immutable version in the [`oasis_store`] document.
//!
//! ```text
//! PromptResolver -> Provider (mock | live) -> normalize -> validate
//!                                 ^                          |
//!                                 +---- one repair round ----+
//! ```
//!
//! [`Engine::run_assessment`] persists only after the pipeline has produced
//! a complete response; every failure leaves the store untouched.

pub mod config;
pub mod errors;
pub mod export;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod repair;
pub mod resolver;
pub mod validate;
pub mod workflow;

pub use config::EngineConfig;
pub use errors::ApiError;
pub use errors::EngineError;
pub use errors::ErrorCategory;
pub use errors::Result;
pub use export::Export;
pub use export::ExportFormat;
pub use export::export_version;
pub use pipeline::GenerateOptions;
pub use pipeline::Generation;
pub use pipeline::generate;
pub use resolver::PromptResolver;
pub use resolver::ResolvedPrompt;
pub use validate::missing_sections;
pub use workflow::Engine;
pub use workflow::RunOptions;
pub use workflow::VariantTestRun;
