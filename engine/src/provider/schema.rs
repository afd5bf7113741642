use serde_json::Value;
use serde_json::json;

/// Function the model is forced to call.
pub const TOOL_NAME: &str = "submit_risk_assessment";

fn references_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "source_type": { "type": "string" },
                "title": { "type": "string" },
                "url": { "type": "string" }
            },
            "required": ["source_type", "title"]
        }
    })
}

/// JSON Schema for the tool arguments.
pub fn risk_assessment_schema() -> Value {
    let rating = json!({ "type": "string", "enum": ["Low", "Medium", "High"] });
    let non_empty_strings = json!({
        "type": "array",
        "minItems": 1,
        "items": { "type": "string" }
    });

    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "risks": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "risk_id": { "type": "string" },
                        "risk_title": { "type": "string" },
                        "cause": { "type": "string" },
                        "impact": { "type": "string" },
                        "likelihood": rating,
                        "inherent_rating": rating,
                        "residual_rating": rating,
                        "controls": non_empty_strings,
                        "control_mappings": {
                            "type": "array",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "framework": { "type": "string" },
                                    "framework_control_id": { "type": "string" },
                                    "framework_control_name": { "type": "string" },
                                    "control_statement": { "type": "string" },
                                    "references": references_schema()
                                },
                                "required": ["framework", "framework_control_id"]
                            }
                        },
                        "mitigations": non_empty_strings,
                        "kpis": non_empty_strings,
                        "vulnerability_summaries": {
                            "type": "array",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "vulnerability_type": { "type": "string" },
                                    "identifier": { "type": "string" },
                                    "title": { "type": "string" },
                                    "severity": { "type": "string" },
                                    "summary": { "type": "string" },
                                    "references": references_schema()
                                },
                                "required": ["vulnerability_type", "title", "severity"]
                            }
                        },
                        "owner": { "type": "string" },
                        "due_date": { "type": "string" },
                        "assumptions": non_empty_strings
                    },
                    "required": [
                        "risk_id",
                        "risk_title",
                        "cause",
                        "impact",
                        "likelihood",
                        "inherent_rating",
                        "residual_rating",
                        "controls",
                        "control_mappings",
                        "mitigations",
                        "kpis",
                        "vulnerability_summaries",
                        "assumptions"
                    ]
                }
            },
            "assumptions_gaps": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["summary", "risks", "assumptions_gaps"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oasis_protocol::RISK_LIST_FIELDS;

    #[test]
    fn every_list_field_is_required_and_non_empty() {
        let schema = risk_assessment_schema();
        let item = &schema["properties"]["risks"]["items"];
        let required: Vec<&str> = item["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        for field in RISK_LIST_FIELDS {
            assert!(required.contains(&field), "{field} not required");
            assert_eq!(item["properties"][field]["minItems"], 1, "{field}");
        }
        assert_eq!(schema["properties"]["risks"]["minItems"], 1);
    }
}
