//! Conversation history compression.

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::ModelConfig;
use crate::models::ConversationTurn;
use crate::services::metrics;
use crate::services::providers::{GenerationParams, GenerationRequest, ProviderError, TextProvider};

const SUMMARIZE_INSTRUCTION: &str = "You compress chat histories. \
Rewrite the conversation below into a shorter history that keeps every fact, \
preference, decision and open question the user or model expressed. \
Drop greetings, small talk, fillers and bare acknowledgements. \
Keep any turn that is needed to understand a retained turn. \
Respond with only a JSON array of objects shaped like \
{\"role\": \"user\" | \"model\", \"parts\": [\"text\"]} and nothing else.\n\nHistory:\n";

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("Upstream call failed: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Summarizer returned no output")]
    EmptyOutput,

    #[error("Summarizer output is not a valid history: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Summarization did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Ask the text provider for a condensed version of `history`.
pub async fn summarize_history(
    provider: &dyn TextProvider,
    models: &ModelConfig,
    history: &[ConversationTurn],
) -> Result<Vec<ConversationTurn>, SummarizeError> {
    let serialized = serde_json::to_string(history)?;

    let request = GenerationRequest {
        system_instruction: None,
        contents: vec![ConversationTurn::user(format!(
            "{}{}",
            SUMMARIZE_INSTRUCTION, serialized
        ))],
        params: GenerationParams {
            model: Some(models.summary_model.clone()),
            response_mime_type: Some("application/json".to_string()),
            ..Default::default()
        },
    };

    let started = Instant::now();
    let result = provider.generate(&request).await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    metrics::record_upstream_call(
        provider.name(),
        "summarize",
        outcome,
        started.elapsed().as_secs_f64(),
    );

    let summary = parse_summary(&result?.text)?;

    tracing::info!(
        original_turns = history.len(),
        summarized_turns = summary.len(),
        "History summarized"
    );

    Ok(summary)
}

/// Parse the raw model output into conversation turns.
pub fn parse_summary(raw: &str) -> Result<Vec<ConversationTurn>, SummarizeError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(SummarizeError::EmptyOutput);
    }
    Ok(serde_json::from_str(body)?)
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (e.g. `json`) up to the end of the opening line.
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }

    text = text.trim_end();
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::providers::mock::MockTextProvider;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n[{\"role\":\"user\",\"parts\":[\"hi\"]}]\n```";
        assert_eq!(
            strip_code_fences(raw),
            "[{\"role\":\"user\",\"parts\":[\"hi\"]}]"
        );
    }

    #[test]
    fn strips_bare_fence_and_whitespace() {
        assert_eq!(strip_code_fences("  \n```\n[]\n```  \n"), "[]");
    }

    #[test]
    fn strips_fence_on_a_single_line() {
        assert_eq!(strip_code_fences("```json[]```"), "[]");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences("  [1, 2]  "), "[1, 2]");
    }

    #[test]
    fn empty_fence_is_empty_output() {
        assert!(matches!(
            parse_summary("```json\n```"),
            Err(SummarizeError::EmptyOutput)
        ));
    }

    #[test]
    fn prose_is_a_parse_error() {
        assert!(matches!(
            parse_summary("Here is your summary!"),
            Err(SummarizeError::Parse(_))
        ));
    }

    #[test]
    fn fence_after_leading_prose_is_kept() {
        let raw = "Here you go:\n```json\n[]\n```";

        // Only a fence that opens the reply is stripped.
        assert_eq!(strip_code_fences(raw), "Here you go:\n```json\n[]");
        assert!(matches!(parse_summary(raw), Err(SummarizeError::Parse(_))));
    }

    #[tokio::test]
    async fn fenced_echo_round_trips() {
        let history = vec![
            ConversationTurn::user("I live in Lisbon"),
            ConversationTurn::model("Noted!"),
        ];
        let echoed = format!("```json\n{}\n```", serde_json::to_string(&history).unwrap());
        let provider = MockTextProvider::new([echoed]);

        let summary = summarize_history(&provider, &ModelConfig::default(), &history)
            .await
            .unwrap();

        assert_eq!(summary, history);
    }

    #[tokio::test]
    async fn requests_json_from_the_summary_model() {
        let provider = MockTextProvider::new(["[]"]);
        let models = ModelConfig {
            summary_model: "gemini-summary".to_string(),
            ..ModelConfig::default()
        };
        let history = vec![ConversationTurn::user("Hello")];

        summarize_history(&provider, &models, &history).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.params.model.as_deref(), Some("gemini-summary"));
        assert_eq!(
            request.params.response_mime_type.as_deref(),
            Some("application/json")
        );
        assert!(!request.params.search_grounding);
        assert_eq!(request.contents.len(), 1);
        assert_eq!(request.contents[0].role, Role::User);
        assert!(request.contents[0].text().contains("\"Hello\""));
    }

    #[tokio::test]
    async fn upstream_failure_is_typed() {
        let provider = MockTextProvider::failing();
        let result = summarize_history(
            &provider,
            &ModelConfig::default(),
            &[ConversationTurn::user("Hi")],
        )
        .await;
        assert!(matches!(result, Err(SummarizeError::Upstream(_))));
    }
}
