//! Bounded repair loop for live generations.
//!
//! ```text
//! Initial --(Accepted)--> done
//!    |
//!    +--(Unparsable | SchemaViolation | Incomplete)--> Repairing
//!                                                         |
//!               done <--(Accepted)------------------------+
//!      RepairExhausted <--(anything else)-----------------+
//! ```
//!
//! At most [`MAX_REPAIR_ROUNDS`] corrective round trips are made. Transport
//! and truncation errors are not repaired; they surface as they are.

use oasis_protocol::RiskResponse;
use tracing::info;
use tracing::warn;

use crate::errors::EngineError;
use crate::errors::Result;
use crate::provider::ChatCompletions;
use crate::provider::ChatMessage;
use crate::provider::Completion;
use crate::provider::PromptPair;
use crate::provider::Role;
use crate::validate::Outcome;

pub const MAX_REPAIR_ROUNDS: u32 = 1;

const CORRECTIVE_INSTRUCTION: &str = "\
Your previous reply did not satisfy the required output contract. Call the function again \
with a corrected, complete JSON payload. Every risk must include non-empty controls, \
control_mappings, mitigations, kpis, vulnerability_summaries and assumptions lists. \
Return only the function call.";

/// Where the loop stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initial,
    Repairing { round: u32 },
}

/// Conversation for a corrective round: the original turns, the rejected
/// payload as the assistant's turn, then the list of violations.
pub fn repair_messages(prompt: &PromptPair, rejected: &Completion, outcome: &Outcome) -> Vec<ChatMessage> {
    let violations = outcome
        .violations()
        .into_iter()
        .map(|v| format!("- {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        ChatMessage::new(Role::System, prompt.system.as_str()),
        ChatMessage::new(Role::User, prompt.user.as_str()),
        ChatMessage::new(Role::Assistant, rejected.payload()),
        ChatMessage::new(
            Role::User,
            format!("{CORRECTIVE_INSTRUCTION}\n\nViolations:\n{violations}"),
        ),
    ]
}

pub(crate) async fn generate_with_repair<C: ChatCompletions>(
    client: &C,
    prompt: &PromptPair,
    trace_id: &str,
) -> Result<RiskResponse> {
    let mut messages = vec![
        ChatMessage::new(Role::System, prompt.system.as_str()),
        ChatMessage::new(Role::User, prompt.user.as_str()),
    ];
    let mut phase = Phase::Initial;
    let mut last_missing: Vec<String> = Vec::new();

    loop {
        let completion = client.complete(&messages).await?;
        let outcome = Outcome::classify(&completion, trace_id);
        if !outcome.missing().is_empty() {
            last_missing = outcome.missing().to_vec();
        }

        let outcome = match outcome {
            Outcome::Accepted(response) => {
                info!(trace_id, ?phase, risks = response.risks.len(), "generation accepted");
                return Ok(response);
            }
            rejected => rejected,
        };

        let round = match phase {
            Phase::Initial => 0,
            Phase::Repairing { round } => round,
        };
        if round >= MAX_REPAIR_ROUNDS {
            warn!(
                trace_id,
                outcome = outcome.label(),
                missing = ?last_missing,
                "repair rounds exhausted"
            );
            let reason = match &outcome {
                Outcome::Unparsable { detail } => format!("unparsable: {detail}"),
                Outcome::SchemaViolation { detail, .. } => format!("schema violation: {detail}"),
                other => other.label().to_string(),
            };
            return Err(EngineError::RepairExhausted {
                missing: last_missing,
                reason,
            });
        }

        warn!(
            trace_id,
            round = round + 1,
            outcome = outcome.label(),
            missing = ?outcome.missing(),
            "reply rejected; issuing corrective round"
        );
        messages = repair_messages(prompt, &completion, &outcome);
        phase = Phase::Repairing { round: round + 1 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TOOL_NAME;
    use crate::provider::ToolCall;
    use crate::provider::mock_response;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies and records every conversation it saw.
    struct Scripted {
        replies: Mutex<VecDeque<Result<Completion>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Completion>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ChatCompletions for Scripted {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::UnparsableResponse("script exhausted".into())))
        }
    }

    fn tool(arguments: String) -> Result<Completion> {
        Ok(Completion {
            content: None,
            tool_call: Some(ToolCall {
                name: TOOL_NAME.to_string(),
                arguments,
            }),
            finish_reason: Some("stop".to_string()),
        })
    }

    fn incomplete() -> String {
        let mut value = serde_json::to_value(mock_response("x")).unwrap();
        value["risks"][0]["kpis"] = serde_json::json!([]);
        value.to_string()
    }

    fn prompt() -> PromptPair {
        PromptPair {
            system: "system".to_string(),
            user: "user".to_string(),
        }
    }

    #[tokio::test]
    async fn complete_first_reply_needs_no_repair() {
        let client = Scripted::new(vec![tool(serde_json::to_string(&mock_response("x")).unwrap())]);
        let response = generate_with_repair(&client, &prompt(), "trace").await.unwrap();
        assert_eq!(response.trace_id, "trace");
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn incomplete_reply_is_repaired_once() {
        let client = Scripted::new(vec![
            tool(incomplete()),
            tool(serde_json::to_string(&mock_response("x")).unwrap()),
        ]);
        let response = generate_with_repair(&client, &prompt(), "trace").await.unwrap();
        assert_eq!(response.risks.len(), 2);

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        let repair = &calls[1];
        assert_eq!(repair.len(), 4);
        assert_eq!(repair[0].role, Role::System);
        assert_eq!(repair[2].role, Role::Assistant);
        assert_eq!(repair[2].content, incomplete());
        assert!(repair[3].content.contains("Empty or missing list: R1.kpis"));
    }

    #[tokio::test]
    async fn second_failure_exhausts_repair() {
        let client = Scripted::new(vec![tool(incomplete()), tool(incomplete())]);
        let err = generate_with_repair(&client, &prompt(), "trace")
            .await
            .unwrap_err();
        match err {
            EngineError::RepairExhausted { missing, reason } => {
                assert_eq!(missing, vec!["R1.kpis".to_string()]);
                assert_eq!(reason, "incomplete");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn unparsable_reply_triggers_repair() {
        let client = Scripted::new(vec![
            tool("Sorry, here is prose.".to_string()),
            tool("still prose".to_string()),
        ]);
        let err = generate_with_repair(&client, &prompt(), "trace")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::RepairExhausted { ref reason, .. } if reason.starts_with("unparsable")
        ));
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn transport_errors_are_not_repaired() {
        let client = Scripted::new(vec![Err(EngineError::Truncated)]);
        let err = generate_with_repair(&client, &prompt(), "trace")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Truncated));
        assert_eq!(client.calls().len(), 1);
    }
}
