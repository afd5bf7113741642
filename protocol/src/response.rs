use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::de;
use strum_macros::Display;
use strum_macros::EnumString;

/// List-valued risk fields that must be present (and, for a complete
/// result, non-empty) on every risk item.
pub const RISK_LIST_FIELDS: [&str; 6] = [
    "controls",
    "control_mappings",
    "mitigations",
    "kpis",
    "vulnerability_summaries",
    "assumptions",
];

/// Qualitative likelihood / impact rating. Parsed case-insensitively with
/// surrounding whitespace ignored; serialized capitalized.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Rating {
    Low,
    Medium,
    High,
}

const RATING_VARIANTS: &[&str] = &["Low", "Medium", "High"];

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Rating::from_str(raw.trim())
            .map_err(|_| de::Error::unknown_variant(&raw, RATING_VARIANTS))
    }
}

/// Public source backing a mapping or vulnerability summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub source_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Mapping of a risk control onto a public framework control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMapping {
    pub framework: String,
    pub framework_control_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework_control_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_statement: Option<String>,
    #[serde(default)]
    pub references: Vec<SourceReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilitySummary {
    pub vulnerability_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub title: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub references: Vec<SourceReference>,
}

/// One entry of the risk register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskItem {
    pub risk_id: String,
    pub risk_title: String,
    pub cause: String,
    pub impact: String,
    pub likelihood: Rating,
    pub inherent_rating: Rating,
    pub residual_rating: Rating,
    #[serde(default)]
    pub controls: Vec<String>,
    #[serde(default)]
    pub control_mappings: Vec<ControlMapping>,
    #[serde(default)]
    pub mitigations: Vec<String>,
    #[serde(default)]
    pub kpis: Vec<String>,
    #[serde(default)]
    pub vulnerability_summaries: Vec<VulnerabilitySummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

impl RiskItem {
    /// Names of the list fields that are empty on this item, in
    /// [`RISK_LIST_FIELDS`] order.
    pub fn empty_list_fields(&self) -> Vec<&'static str> {
        let lens = [
            self.controls.len(),
            self.control_mappings.len(),
            self.mitigations.len(),
            self.kpis.len(),
            self.vulnerability_summaries.len(),
            self.assumptions.len(),
        ];
        RISK_LIST_FIELDS
            .iter()
            .zip(lens)
            .filter(|(_, len)| *len == 0)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Structured result: narrative summary plus risk register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResponse {
    pub trace_id: String,
    pub summary: String,
    pub risks: Vec<RiskItem>,
    #[serde(default)]
    pub assumptions_gaps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn item(controls: Vec<String>) -> RiskItem {
        RiskItem {
            risk_id: "R1".to_string(),
            risk_title: "Outage".to_string(),
            cause: "Single region".to_string(),
            impact: "Downtime".to_string(),
            likelihood: Rating::Medium,
            inherent_rating: Rating::High,
            residual_rating: Rating::Medium,
            controls,
            control_mappings: Vec::new(),
            mitigations: vec!["Add failover".to_string()],
            kpis: Vec::new(),
            vulnerability_summaries: Vec::new(),
            owner: None,
            due_date: None,
            assumptions: vec!["Budget available".to_string()],
        }
    }

    #[test]
    fn ratings_parse_in_any_case() {
        for (raw, expected) in [
            ("high", Rating::High),
            ("mEdium", Rating::Medium),
            (" High ", Rating::High),
            ("LOW\n", Rating::Low),
        ] {
            let rating: Rating = serde_json::from_value(json!(raw)).unwrap();
            assert_eq!(rating, expected, "{raw:?}");
        }
        assert_eq!(serde_json::to_value(Rating::Low).unwrap(), json!("Low"));
        assert!(serde_json::from_value::<Rating>(json!("Severe")).is_err());
        assert!(serde_json::from_value::<Rating>(json!("")).is_err());
        assert!(serde_json::from_value::<Rating>(json!(2)).is_err());
    }

    #[test]
    fn empty_list_fields_preserve_declared_order() {
        assert_eq!(
            item(Vec::new()).empty_list_fields(),
            vec!["controls", "control_mappings", "kpis", "vulnerability_summaries"]
        );
        assert_eq!(
            item(vec!["SLA monitoring".to_string()]).empty_list_fields(),
            vec!["control_mappings", "kpis", "vulnerability_summaries"]
        );
    }
}
