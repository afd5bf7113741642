//! Turn raw model output into a [`RiskResponse`].
//!
//! Parsing is a cascade; the first strategy that yields JSON wins:
//!
//! 1. strip a Markdown fence wrapping the whole reply
//! 2. parse as-is
//! 3. parse the first balanced top-level `{ ... }` (string/escape aware)
//! 4. drop trailing commas before `}` / `]` in the best candidate
//! 5. quote bare `key:` identifiers, then retry 2-4
//!
//! After parsing, domain quirks are smoothed over (`risk_id` coercion and
//! synthesis, defaulted list fields) and the value is deserialized into the
//! typed response. A wrong top level is rejected, never repaired.

use oasis_protocol::RISK_LIST_FIELDS;
use oasis_protocol::RiskResponse;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use crate::errors::EngineError;
use crate::errors::Result;
use crate::provider::Completion;

const REQUIRED_KEYS: [&str; 2] = ["summary", "risks"];

/// Which step of the cascade produced the parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    BalancedObject,
    TrailingCommas,
    QuotedKeys,
}

/// Parse `raw` into a JSON value using the repair cascade.
pub fn parse_lenient(raw: &str) -> Result<(Value, Strategy)> {
    let text = strip_fences(raw.trim());

    if let Some((value, strategy)) = parse_candidates(text) {
        debug!(?strategy, "model reply parsed");
        return Ok((value, strategy));
    }

    let quoted = quote_bare_keys(text);
    if quoted != text
        && let Some((value, _)) = parse_candidates(&quoted)
    {
        debug!(strategy = ?Strategy::QuotedKeys, "model reply parsed");
        return Ok((value, Strategy::QuotedKeys));
    }

    let detail = match serde_json::from_str::<Value>(text) {
        Err(err) => err.to_string(),
        Ok(_) => "unrecognised JSON".to_string(),
    };
    Err(EngineError::UnparsableResponse(detail))
}

/// Steps 2-4 on one text.
fn parse_candidates(text: &str) -> Option<(Value, Strategy)> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some((value, Strategy::Direct));
    }

    let balanced = extract_balanced_object(text);
    if let Some(object) = balanced
        && let Ok(value) = serde_json::from_str::<Value>(object)
    {
        return Some((value, Strategy::BalancedObject));
    }

    let best = balanced.unwrap_or(text);
    serde_json::from_str::<Value>(&remove_trailing_commas(best))
        .ok()
        .map(|value| (value, Strategy::TrailingCommas))
}

/// Remove a Markdown fence that wraps the whole text.
fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// First balanced `{ ... }` region, skipping braces inside string literals.
fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + idx + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop commas that directly precede `}` or `]` outside string literals.
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &ch) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Quote identifier-style object keys (`key:` -> `"key":`) outside strings.
fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            idx += 1;
            continue;
        }
        if ch == '"' {
            in_string = true;
            out.push(ch);
            idx += 1;
            continue;
        }

        let starts_key = (ch.is_ascii_alphabetic() || ch == '_')
            && matches!(out.trim_end().chars().last(), Some('{' | ','));
        if starts_key {
            let end = chars[idx..]
                .iter()
                .position(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map_or(chars.len(), |len| idx + len);
            let followed_by_colon = chars[end..]
                .iter()
                .find(|c| !c.is_whitespace())
                .is_some_and(|c| *c == ':');
            let ident: String = chars[idx..end].iter().collect();
            if followed_by_colon {
                out.push('"');
                out.push_str(&ident);
                out.push('"');
            } else {
                out.push_str(&ident);
            }
            idx = end;
            continue;
        }

        out.push(ch);
        idx += 1;
    }
    out
}

/// Normalize a parsed value into a typed response stamped with `trace_id`.
pub fn normalize_value(value: Value, trace_id: &str) -> Result<RiskResponse> {
    let Value::Object(mut root) = value else {
        return Err(EngineError::schema(
            Vec::new(),
            "response root is not a JSON object",
        ));
    };

    let missing: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|key| !root.contains_key(**key))
        .map(|key| (*key).to_string())
        .collect();
    if !missing.is_empty() {
        let detail = format!("missing required keys: {}", missing.join(", "));
        return Err(EngineError::schema(missing, detail));
    }

    let Some(Value::Array(risks)) = root.get_mut("risks") else {
        return Err(EngineError::schema(Vec::new(), "risks is not a list"));
    };
    for (idx, risk) in risks.iter_mut().enumerate() {
        let Value::Object(item) = risk else {
            return Err(EngineError::schema(
                Vec::new(),
                format!("risks[{idx}] is not an object"),
            ));
        };
        normalize_risk(item, idx + 1);
    }

    if root.get("assumptions_gaps").is_none_or(Value::is_null) {
        root.insert("assumptions_gaps".to_string(), Value::Array(Vec::new()));
    }
    root.insert("trace_id".to_string(), Value::String(trace_id.to_string()));

    serde_json::from_value(Value::Object(root))
        .map_err(|e| EngineError::schema(Vec::new(), format!("response does not match schema: {e}")))
}

fn normalize_risk(item: &mut Map<String, Value>, position: usize) {
    let risk_id = match item.get("risk_id") {
        None | Some(Value::Null) => format!("R{position}"),
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
    };
    item.insert("risk_id".to_string(), Value::String(risk_id));

    for field in RISK_LIST_FIELDS {
        if item.get(field).is_none_or(Value::is_null) {
            item.insert(field.to_string(), Value::Array(Vec::new()));
        }
    }
}

/// Parse and normalize raw reply text.
pub fn normalize(raw: &str, trace_id: &str) -> Result<RiskResponse> {
    let (value, _) = parse_lenient(raw)?;
    normalize_value(value, trace_id)
}

/// Normalize a completion, preferring the expected tool call's arguments
/// over free-text content.
pub fn normalize_completion(completion: &Completion, trace_id: &str) -> Result<RiskResponse> {
    let candidates = [completion.tool_arguments(), completion.content.as_deref()];
    let mut first_error = None;

    for candidate in candidates.into_iter().flatten() {
        match parse_lenient(candidate) {
            Ok((value, _)) => return normalize_value(value, trace_id),
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }
    Err(first_error
        .unwrap_or_else(|| EngineError::UnparsableResponse("reply has no content".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TOOL_NAME;
    use crate::provider::ToolCall;
    use crate::provider::mock_response;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn fenced_reply_with_trailing_comma() {
        let raw = "```json\n{\"summary\":\"S\",\"risks\":[],\"assumptions_gaps\":[],}\n```";
        let response = normalize(raw, "t1").unwrap();
        assert_eq!(response.summary, "S");
        assert_eq!(response.trace_id, "t1");
        assert!(response.risks.is_empty());
    }

    #[test]
    fn numeric_risk_id_is_coerced_and_lists_defaulted() {
        let raw = json!({
            "summary": "S",
            "risks": [{
                "risk_id": 1,
                "risk_title": "Outage",
                "cause": "Single region",
                "impact": "Downtime",
                "likelihood": "Medium",
                "inherent_rating": "High",
                "residual_rating": "Low"
            }]
        })
        .to_string();
        let response = normalize(&raw, "t1").unwrap();
        let risk = &response.risks[0];
        assert_eq!(risk.risk_id, "1");
        assert!(risk.controls.is_empty());
        assert!(risk.vulnerability_summaries.is_empty());
        assert!(response.assumptions_gaps.is_empty());
    }

    #[test]
    fn absent_risk_id_is_positional() {
        let mut value = serde_json::to_value(mock_response("x")).unwrap();
        value["risks"][1]
            .as_object_mut()
            .unwrap()
            .remove("risk_id");
        value["risks"][0]["risk_id"] = Value::Null;
        let response = normalize_value(value, "t").unwrap();
        assert_eq!(response.risks[0].risk_id, "R1");
        assert_eq!(response.risks[1].risk_id, "R2");
    }

    #[test]
    fn valid_object_is_unchanged() {
        let original = mock_response("trace");
        let raw = serde_json::to_string(&original).unwrap();
        assert_eq!(normalize(&raw, "trace").unwrap(), original);
    }

    #[test]
    fn buried_object_is_extracted() {
        let raw = "Here you go:\n{\"summary\": \"uses } in text\", \"risks\": []}\nThanks!";
        let (value, strategy) = parse_lenient(raw).unwrap();
        assert_eq!(strategy, Strategy::BalancedObject);
        assert_eq!(value["summary"], "uses } in text");
    }

    #[test]
    fn bare_keys_are_quoted() {
        let raw = "{summary: \"S\", risks: [], note: \"a: b, c\",}";
        let (value, strategy) = parse_lenient(raw).unwrap();
        assert_eq!(strategy, Strategy::QuotedKeys);
        assert_eq!(value["note"], "a: b, c");
    }

    #[test]
    fn trailing_commas_inside_strings_survive() {
        assert_eq!(
            remove_trailing_commas(r#"{"a": "x,}", "b": [1, 2,],}"#),
            r#"{"a": "x,}", "b": [1, 2]}"#
        );
    }

    #[test]
    fn garbage_is_unparsable() {
        assert!(matches!(
            normalize("I cannot help with that.", "t"),
            Err(EngineError::UnparsableResponse(_))
        ));
    }

    #[test]
    fn wrong_top_level_is_schema_violation() {
        assert!(matches!(
            normalize("[1, 2, 3]", "t"),
            Err(EngineError::SchemaViolation { .. })
        ));
        match normalize("{\"risks\": []}", "t") {
            Err(EngineError::SchemaViolation { missing, .. }) => {
                assert_eq!(missing, vec!["summary".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bad_rating_is_schema_violation() {
        let raw = json!({
            "summary": "S",
            "risks": [{
                "risk_title": "T", "cause": "C", "impact": "I",
                "likelihood": "Severe", "inherent_rating": "High", "residual_rating": "Low"
            }]
        })
        .to_string();
        assert!(matches!(
            normalize(&raw, "t"),
            Err(EngineError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn tool_arguments_preferred_over_content() {
        let completion = Completion {
            content: Some("{\"summary\": \"from content\", \"risks\": []}".to_string()),
            tool_call: Some(ToolCall {
                name: TOOL_NAME.to_string(),
                arguments: "{\"summary\": \"from tool\", \"risks\": []}".to_string(),
            }),
            finish_reason: None,
        };
        assert_eq!(
            normalize_completion(&completion, "t").unwrap().summary,
            "from tool"
        );
    }

    #[test]
    fn content_used_when_tool_arguments_unparsable() {
        let completion = Completion {
            content: Some("{\"summary\": \"from content\", \"risks\": []}".to_string()),
            tool_call: Some(ToolCall {
                name: TOOL_NAME.to_string(),
                arguments: "not json".to_string(),
            }),
            finish_reason: None,
        };
        assert_eq!(
            normalize_completion(&completion, "t").unwrap().summary,
            "from content"
        );
        assert!(matches!(
            normalize_completion(&Completion::default(), "t"),
            Err(EngineError::UnparsableResponse(_))
        ));
    }
}
