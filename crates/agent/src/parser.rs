//! Response parser — extracts labeled sections from free-form model text.
//!
//! Recognized markers: `Thought`, `Action`, `Action Input`, `Observation`,
//! `Answer` and `Final Answer`. A marker counts only at the start of a line
//! (after optional whitespace and markdown `*`/`#`), case-insensitively,
//! followed by a colon. A field's value runs to the next marker or the end
//! of the text. The first occurrence of each marker wins.
//!
//! Text with no markers at all is *degraded*: every field is `None`, and
//! the loop treats it as plain reasoning rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Thought,
    Action,
    ActionInput,
    Observation,
    Answer,
    FinalAnswer,
}

/// Longest label first so `Action Input` isn't read as `Action`.
const MARKERS: &[(&str, Marker)] = &[
    ("final answer", Marker::FinalAnswer),
    ("action input", Marker::ActionInput),
    ("observation", Marker::Observation),
    ("thought", Marker::Thought),
    ("action", Marker::Action),
    ("answer", Marker::Answer),
];

/// Sections extracted from one model turn.
///
/// `None` means the marker was absent; `Some("")` means it was present with
/// no text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResponse {
    pub thought: Option<String>,
    pub action: Option<String>,
    pub action_input: Option<String>,
    pub observation: Option<String>,
    /// `Answer`, or `Final Answer` when only the synonym is present
    pub answer: Option<String>,
}

/// A tool intent named in text (the fallback channel).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAction {
    pub tool: String,
    pub input: Option<Value>,
}

impl ParsedResponse {
    /// No marker was recognized.
    pub fn is_degraded(&self) -> bool {
        self.thought.is_none()
            && self.action.is_none()
            && self.action_input.is_none()
            && self.observation.is_none()
            && self.answer.is_none()
    }

    /// Derive the tool intent from `Action` (`tool` or `tool(args)`) and
    /// `Action Input`. JSON input is decoded; anything else stays a string.
    pub fn parsed_action(&self) -> Option<ParsedAction> {
        let action = self.action.as_deref()?;
        let first_line = action.lines().next().unwrap_or_default().trim();

        let (name, inline) = match first_line.split_once('(') {
            Some((name, rest)) => (name, rest.strip_suffix(')').map(str::trim)),
            None => (first_line, None),
        };
        let tool = name.trim().trim_matches('`').trim().to_string();
        if tool.is_empty() {
            return None;
        }

        let raw = self
            .action_input
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(inline.filter(|s| !s.is_empty()));

        let input = raw.map(|raw| {
            let unfenced = strip_code_fence(raw);
            serde_json::from_str(unfenced).unwrap_or_else(|_| Value::String(unfenced.to_string()))
        });

        Some(ParsedAction { tool, input })
    }
}

/// Parse one turn of model text.
pub fn parse(text: &str) -> ParsedResponse {
    // (marker, line start offset, value start offset)
    let mut found: Vec<(Marker, usize, usize)> = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if let Some((marker, value_at)) = match_marker(line) {
            found.push((marker, offset, offset + value_at));
        }
        offset += line.len();
    }

    let mut parsed = ParsedResponse::default();
    let mut final_answer = None;
    for (i, &(marker, _, value_start)) in found.iter().enumerate() {
        let value_end = found.get(i + 1).map_or(text.len(), |next| next.1);
        let value = text[value_start..value_end].trim().to_string();
        let slot = match marker {
            Marker::Thought => &mut parsed.thought,
            Marker::Action => &mut parsed.action,
            Marker::ActionInput => &mut parsed.action_input,
            Marker::Observation => &mut parsed.observation,
            Marker::Answer => &mut parsed.answer,
            Marker::FinalAnswer => &mut final_answer,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
    if parsed.answer.is_none() {
        parsed.answer = final_answer;
    }
    parsed
}

/// Match a marker at the start of `line`; returns the byte offset where
/// its value begins.
fn match_marker(line: &str) -> Option<(Marker, usize)> {
    let body = line.trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '#');

    for &(label, marker) in MARKERS {
        let Some(head) = body.get(..label.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(label) {
            continue;
        }
        // `**Thought**:` puts the emphasis before the colon
        let rest = &body[label.len()..];
        let after_stars = rest.trim_start_matches('*');
        let Some(value) = after_stars.strip_prefix(':') else {
            continue;
        };
        // `**Thought:**` puts it after
        let value = value.trim_start_matches('*');
        return Some((marker, line.len() - value.len()));
    }
    None
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(inner) = raw.strip_prefix("```") else {
        return raw;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop a language tag such as ```json
    match inner.split_once('\n') {
        Some((tag, body)) if !tag.trim().contains(['{', '[']) => body.trim(),
        _ => inner.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thought_and_answer() {
        let parsed = parse("Thought: simple arithmetic\nAnswer: 4");
        assert_eq!(parsed.thought.as_deref(), Some("simple arithmetic"));
        assert_eq!(parsed.answer.as_deref(), Some("4"));
        assert!(parsed.action.is_none());
        assert!(!parsed.is_degraded());
    }

    #[test]
    fn values_run_to_the_next_marker() {
        let text = "Thought: first line\nsecond line\n\nAction: calculator\nAction Input: {\"expression\": \"2+2\"}\nObservation: 4";
        let parsed = parse(text);
        assert_eq!(parsed.thought.as_deref(), Some("first line\nsecond line"));
        assert_eq!(parsed.action.as_deref(), Some("calculator"));
        assert_eq!(parsed.action_input.as_deref(), Some("{\"expression\": \"2+2\"}"));
        assert_eq!(parsed.observation.as_deref(), Some("4"));
    }

    #[test]
    fn no_markers_is_degraded() {
        let parsed = parse("I think the answer might be 4, but let me check.");
        assert!(parsed.is_degraded());
        assert_eq!(parsed, ParsedResponse::default());
    }

    #[test]
    fn empty_value_is_distinct_from_absent() {
        let parsed = parse("Thought:\nAnswer: done");
        assert_eq!(parsed.thought.as_deref(), Some(""));
        assert!(parsed.observation.is_none());
    }

    #[test]
    fn final_answer_is_a_synonym() {
        let parsed = parse("Thought: ok\nFinal Answer: 42");
        assert_eq!(parsed.answer.as_deref(), Some("42"));
    }

    #[test]
    fn answer_takes_priority_over_final_answer() {
        let parsed = parse("Final Answer: from synonym\nAnswer: from answer");
        assert_eq!(parsed.answer.as_deref(), Some("from answer"));
    }

    #[test]
    fn first_occurrence_wins() {
        let parsed = parse("Thought: one\nThought: two");
        assert_eq!(parsed.thought.as_deref(), Some("one"));
    }

    #[test]
    fn markers_are_case_insensitive_and_tolerate_markdown() {
        let parsed = parse("**Thought:** weigh it\n## answer: yes\n  ACTION INPUT: {}");
        assert_eq!(parsed.thought.as_deref(), Some("weigh it"));
        assert_eq!(parsed.answer.as_deref(), Some("yes"));
        assert_eq!(parsed.action_input.as_deref(), Some("{}"));

        let parsed = parse("**Thought**: bold label");
        assert_eq!(parsed.thought.as_deref(), Some("bold label"));
    }

    #[test]
    fn markers_only_count_at_line_start() {
        let parsed = parse("Thought: my answer: is pending");
        assert_eq!(parsed.thought.as_deref(), Some("my answer: is pending"));
        assert!(parsed.answer.is_none());
    }

    #[test]
    fn marker_word_without_colon_is_text() {
        let parsed = parse("Thought: hmm\nAnswering this needs a tool");
        assert_eq!(parsed.thought.as_deref(), Some("hmm\nAnswering this needs a tool"));
        assert!(parsed.answer.is_none());
    }

    #[test]
    fn action_and_answer_in_one_turn_are_both_parsed() {
        let parsed = parse("Thought: x\nAction: calculator\nAnswer: 4");
        assert_eq!(parsed.action.as_deref(), Some("calculator"));
        assert_eq!(parsed.answer.as_deref(), Some("4"));
    }

    #[test]
    fn parsed_action_with_json_input() {
        let parsed = parse(
            "Action: convertCurrency\nAction Input: {\"amount\": 10, \"from\": \"USD\", \"to\": \"EUR\"}",
        );
        let action = parsed.parsed_action().unwrap();
        assert_eq!(action.tool, "convertCurrency");
        assert_eq!(
            action.input,
            Some(json!({"amount": 10, "from": "USD", "to": "EUR"}))
        );
    }

    #[test]
    fn parsed_action_with_inline_args() {
        let parsed = parse("Action: `calculator`(\"2 + 2\")");
        let action = parsed.parsed_action().unwrap();
        assert_eq!(action.tool, "calculator");
        assert_eq!(action.input, Some(json!("2 + 2")));

        let parsed = parse("Action: weather_lookup({\"location\": \"Oslo\"})");
        let action = parsed.parsed_action().unwrap();
        assert_eq!(action.tool, "weather_lookup");
        assert_eq!(action.input, Some(json!({"location": "Oslo"})));
    }

    #[test]
    fn parsed_action_with_fenced_input() {
        let parsed = parse("Action: calculator\nAction Input: ```json\n{\"expression\": \"1+1\"}\n```");
        let action = parsed.parsed_action().unwrap();
        assert_eq!(action.input, Some(json!({"expression": "1+1"})));
    }

    #[test]
    fn parsed_action_with_plain_text_input() {
        let parsed = parse("Action: calculator\nAction Input: 2 + 2");
        let action = parsed.parsed_action().unwrap();
        assert_eq!(action.input, Some(Value::String("2 + 2".into())));
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "Thought: a\nAction: b\nAction Input: {}\nAnswer: c";
        assert_eq!(parse(text), parse(text));
    }
}
