//! Markdown, CSV and JSON renderings of a stored version.

use std::sync::LazyLock;

use oasis_protocol::RiskItem;
use oasis_protocol::SourceReference;
use oasis_store::AssessmentStore;
use oasis_store::AssessmentVersion;
use oasis_store::StoreError;
use regex_lite::Regex;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;

use crate::errors::EngineError;
use crate::errors::Result;

const CSV_COLUMNS: [&str; 11] = [
    "risk_id",
    "risk_title",
    "cause",
    "impact",
    "likelihood",
    "inherent_rating",
    "residual_rating",
    "controls",
    "mitigations",
    "kpis",
    "assumptions",
];

const MAX_FILENAME_CHARS: usize = 80;

#[allow(clippy::expect_used)]
static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid filename regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExportFormat {
    #[default]
    Markdown,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown; charset=utf-8",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
        }
    }
}

/// A rendered export ready to be written or served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

/// Render `version_id` of `assessment_id`. A version owned by another
/// assessment is reported as not found.
pub fn export_version(
    store: &AssessmentStore,
    assessment_id: &str,
    version_id: &str,
    format: ExportFormat,
) -> Result<Export> {
    let assessment = store.get_assessment(assessment_id)?;
    let version = store.get_version(version_id)?;
    if version.assessment_id != assessment_id {
        return Err(EngineError::NotFound {
            kind: "version",
            id: version_id.to_string(),
        });
    }

    let title = match assessment.title.trim() {
        "" => "assessment",
        title => title,
    };
    let body = match format {
        ExportFormat::Markdown => render_markdown(title, &version),
        ExportFormat::Csv => render_csv(&version),
        ExportFormat::Json => serde_json::to_string_pretty(&version.response)
            .map_err(|e| EngineError::from(StoreError::from(e)))?,
    };
    Ok(Export {
        filename: format!(
            "{}.{}",
            safe_filename(&format!("{title}_v{}", version.version_number)),
            format.extension()
        ),
        content_type: format.content_type(),
        body,
    })
}

/// Collapse runs of characters outside `[A-Za-z0-9._-]` to `_`, cap the
/// length and fall back to `export` when nothing usable is left.
pub fn safe_filename(value: &str) -> String {
    let value = match value.trim() {
        "" => "export",
        v => v,
    };
    let replaced = UNSAFE_FILENAME_CHARS.replace_all(value, "_");
    let truncated: String = replaced.chars().take(MAX_FILENAME_CHARS).collect();
    match truncated.trim_matches('_') {
        "" => "export".to_string(),
        name => name.to_string(),
    }
}

pub fn render_markdown(title: &str, version: &AssessmentVersion) -> String {
    let response = &version.response;
    let mut lines: Vec<String> = vec![
        format!("# {title} (v{})", version.version_number),
        String::new(),
        format!("- Generated: {}", version.created_at.to_rfc3339()),
        format!("- Trace ID: {}", version.trace_id),
        format!(
            "- Mode: {} (requested: {})",
            version.resolved_mode, version.mode
        ),
        format!("- Model: {}", version.llm_model),
        format!("- Prompt variant: {}", version.prompt_variant),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        response.summary.trim().to_string(),
        String::new(),
        "## Assumptions & Gaps".to_string(),
        String::new(),
    ];
    if response.assumptions_gaps.is_empty() {
        lines.push("- (none)".to_string());
    }
    lines.extend(response.assumptions_gaps.iter().map(|gap| format!("- {gap}")));
    lines.push(String::new());
    lines.push("## Risks".to_string());
    lines.push(String::new());
    for risk in &response.risks {
        push_risk(&mut lines, risk);
    }

    format!("{}\n", lines.join("\n").trim())
}

fn push_risk(lines: &mut Vec<String>, risk: &RiskItem) {
    lines.push(format!("### {}: {}", risk.risk_id, risk.risk_title).trim().to_string());
    lines.push(String::new());
    lines.push(format!("- Likelihood: {}", risk.likelihood));
    lines.push(format!("- Inherent: {}", risk.inherent_rating));
    lines.push(format!("- Residual: {}", risk.residual_rating));
    if !risk.cause.is_empty() {
        lines.push(format!("- Cause: {}", risk.cause));
    }
    if !risk.impact.is_empty() {
        lines.push(format!("- Impact: {}", risk.impact));
    }

    for (heading, items) in [
        ("**Controls**", &risk.controls),
        ("**Mitigations**", &risk.mitigations),
        ("**KPIs**", &risk.kpis),
    ] {
        lines.push(String::new());
        lines.push(heading.to_string());
        lines.extend(items.iter().map(|item| format!("- {item}")));
    }

    lines.push(String::new());
    lines.push("**Control mappings**".to_string());
    for mapping in &risk.control_mappings {
        let mut header = format!("- {} {}", mapping.framework, mapping.framework_control_id)
            .trim()
            .to_string();
        if let Some(name) = mapping.framework_control_name.as_deref().filter(|n| !n.is_empty()) {
            header = format!("{header} - {name}");
        }
        lines.push(header);
        if let Some(statement) = mapping.control_statement.as_deref().filter(|s| !s.is_empty()) {
            lines.push(format!("  - {statement}"));
        }
        push_refs(lines, &mapping.references);
    }

    lines.push(String::new());
    lines.push("**Vulnerability summaries**".to_string());
    for vuln in &risk.vulnerability_summaries {
        let mut label = format!(
            "- {} {}",
            vuln.vulnerability_type,
            vuln.identifier.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string();
        if !vuln.title.is_empty() {
            label = format!("{label}: {}", vuln.title);
        }
        lines.push(format!("{label} ({})", vuln.severity).trim().to_string());
        if let Some(summary) = vuln.summary.as_deref().filter(|s| !s.is_empty()) {
            lines.push(format!("  - {summary}"));
        }
        push_refs(lines, &vuln.references);
    }
    lines.push(String::new());
}

fn push_refs(lines: &mut Vec<String>, refs: &[SourceReference]) {
    if refs.is_empty() {
        return;
    }
    let joined = refs
        .iter()
        .map(|r| format!("{}: {}", r.source_type, r.title))
        .collect::<Vec<_>>()
        .join(" | ");
    lines.push(format!("  - Refs: {joined}"));
}

/// One row per risk; list fields joined with `; `.
pub fn render_csv(version: &AssessmentVersion) -> String {
    let mut out = vec![CSV_COLUMNS.join(",")];
    for risk in &version.response.risks {
        let row = [
            risk.risk_id.clone(),
            risk.risk_title.clone(),
            risk.cause.clone(),
            risk.impact.clone(),
            risk.likelihood.to_string(),
            risk.inherent_rating.to_string(),
            risk.residual_rating.to_string(),
            risk.controls.join("; "),
            risk.mitigations.join("; "),
            risk.kpis.join("; "),
            risk.assumptions.join("; "),
        ];
        out.push(
            row.iter()
                .map(String::as_str)
                .map(csv_escape)
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    format!("{}\n", out.join("\n").trim())
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
