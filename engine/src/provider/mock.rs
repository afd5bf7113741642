use oasis_protocol::ControlMapping;
use oasis_protocol::Rating;
use oasis_protocol::RiskItem;
use oasis_protocol::RiskResponse;
use oasis_protocol::SourceReference;
use oasis_protocol::VulnerabilitySummary;
use tracing::info;

/// Deterministic generator used whenever the resolved mode is `mock`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockProvider;

impl MockProvider {
    pub const MODEL: &'static str = "mock";

    pub fn generate(&self, trace_id: &str) -> RiskResponse {
        info!(trace_id, "responding with canned mock register");
        mock_response(trace_id)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn reference(source_type: &str, title: &str, url: &str) -> SourceReference {
    SourceReference {
        source_type: source_type.to_string(),
        title: title.to_string(),
        url: Some(url.to_string()),
    }
}

fn mapping(
    framework: &str,
    id: &str,
    name: &str,
    statement: &str,
    refs: Vec<SourceReference>,
) -> ControlMapping {
    ControlMapping {
        framework: framework.to_string(),
        framework_control_id: id.to_string(),
        framework_control_name: Some(name.to_string()),
        control_statement: Some(statement.to_string()),
        references: refs,
    }
}

/// The canned register. Every list on every risk is non-empty.
pub fn mock_response(trace_id: &str) -> RiskResponse {
    let nist_csf = reference(
        "framework",
        "NIST Cybersecurity Framework 2.0",
        "https://www.nist.gov/cyberframework",
    );
    let iso_27001 = reference(
        "framework",
        "ISO/IEC 27001:2022 Annex A",
        "https://www.iso.org/standard/27001",
    );

    let outage = RiskItem {
        risk_id: "R1".to_string(),
        risk_title: "Third-party outage".to_string(),
        cause: "Single cloud provider dependency for core service".to_string(),
        impact: "Service disruption and customer churn".to_string(),
        likelihood: Rating::Medium,
        inherent_rating: Rating::High,
        residual_rating: Rating::Medium,
        controls: strings(&["Vendor SLA monitoring", "Runbooks for failover"]),
        control_mappings: vec![
            mapping(
                "NIST CSF",
                "GV.SC-07",
                "Supplier risk is understood, recorded and monitored",
                "Critical suppliers are assessed and monitored over the relationship lifecycle.",
                vec![nist_csf.clone()],
            ),
            mapping(
                "ISO 27001",
                "A.5.30",
                "ICT readiness for business continuity",
                "ICT continuity is planned, implemented and tested against continuity objectives.",
                vec![iso_27001.clone()],
            ),
        ],
        mitigations: strings(&[
            "Add secondary provider for failover",
            "Quarterly disaster recovery tests",
        ]),
        kpis: strings(&["Monthly uptime %", "MTTR for critical incidents"]),
        vulnerability_summaries: vec![VulnerabilitySummary {
            vulnerability_type: "weakness".to_string(),
            identifier: Some("CWE-400".to_string()),
            title: "Uncontrolled resource consumption".to_string(),
            severity: "Medium".to_string(),
            summary: Some(
                "Dependency saturation at a single provider can exhaust capacity and cascade into outages."
                    .to_string(),
            ),
            references: vec![reference(
                "advisory",
                "MITRE CWE-400",
                "https://cwe.mitre.org/data/definitions/400.html",
            )],
        }],
        owner: Some("Ops".to_string()),
        due_date: Some("Q3".to_string()),
        assumptions: strings(&["Secondary provider contract available"]),
    };

    let compliance = RiskItem {
        risk_id: "R2".to_string(),
        risk_title: "Regulatory non-compliance".to_string(),
        cause: "Evolving data residency rules not mapped to controls".to_string(),
        impact: "Fines and forced remediation".to_string(),
        likelihood: Rating::Medium,
        inherent_rating: Rating::High,
        residual_rating: Rating::Medium,
        controls: strings(&["Policy reviews twice yearly", "Legal sign-off for new regions"]),
        control_mappings: vec![mapping(
            "ISO 27001",
            "A.5.31",
            "Legal, statutory, regulatory and contractual requirements",
            "Applicable requirements are identified, documented and kept up to date.",
            vec![iso_27001],
        )],
        mitigations: strings(&[
            "Map controls to latest guidance per region",
            "Implement data localization where required",
        ]),
        kpis: strings(&["Audit findings count", "Time to remediate compliance gaps"]),
        vulnerability_summaries: vec![VulnerabilitySummary {
            vulnerability_type: "control gap".to_string(),
            identifier: None,
            title: "Unmapped data residency obligations".to_string(),
            severity: "High".to_string(),
            summary: Some(
                "Data stored outside approved regions is not detected by current controls."
                    .to_string(),
            ),
            references: vec![nist_csf],
        }],
        owner: Some("Compliance".to_string()),
        due_date: Some("Q2".to_string()),
        assumptions: strings(&["Legal team available for guidance"]),
    };

    RiskResponse {
        trace_id: trace_id.to_string(),
        summary: "Initial assessment highlights dependency on a single provider and evolving \
                  regulatory obligations. Current controls reduce some exposure but gaps remain \
                  in redundancy and mapped compliance measures."
            .to_string(),
        risks: vec![outage, compliance],
        assumptions_gaps: strings(&[
            "No confidential data used; refine with region-specific rules.",
            "Add business impact tolerances for better prioritization.",
        ]),
    }
}
