use serde_json::{Map, Value};
use thiserror::Error;

use crate::schemas::grading::QuestionGradeResult;

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum ParseError {
    #[error("model returned an empty response")]
    Empty,
    #[error("no JSON object found in model response")]
    NoJsonObject,
    #[error("model response contained malformed JSON: {0}")]
    InvalidJson(String),
    #[error("model response is missing a numeric 'score'")]
    MissingScore,
    #[error("model response has an invalid score: {0}")]
    InvalidScore(String),
    #[error("model response is missing 'feedback'")]
    MissingFeedback,
}

/// Turns raw model output into a validated grade for a question worth
/// `max_score` points. Out-of-range scores are clamped without flagging.
pub(crate) fn parse_grade(raw: &str, max_score: f64) -> Result<QuestionGradeResult, ParseError> {
    let cleaned = strip_thinking(raw);
    if cleaned.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let object = extract_json_object(&cleaned)?;
    let score = read_score(object.get("score"))?;
    let feedback = object
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|feedback| !feedback.is_empty())
        .ok_or(ParseError::MissingFeedback)?;

    Ok(QuestionGradeResult::graded(score.clamp(0.0, max_score), feedback.to_string()))
}

/// Removes `<think>...</think>` blocks emitted by reasoning models. An
/// unterminated block is left in place.
pub(crate) fn strip_thinking(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut remaining = text;
    let mut output = String::with_capacity(text.len());
    while let Some(start) = remaining.find(OPEN) {
        let Some(close) = remaining[start..].find(CLOSE) else {
            break;
        };
        output.push_str(&remaining[..start]);
        remaining = &remaining[start + close + CLOSE.len()..];
    }
    output.push_str(remaining);
    output
}

/// Finds the first balanced `{...}` span that decodes to a JSON object.
/// Braces inside string literals are ignored; a balanced span that fails to
/// decode is skipped and the scan resumes just after its opening brace.
pub(crate) fn extract_json_object(text: &str) -> Result<Map<String, Value>, ParseError> {
    let mut first_error: Option<String> = None;
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(len) = balanced_span_len(&text[start..]) {
            match serde_json::from_str::<Value>(&text[start..start + len]) {
                Ok(Value::Object(object)) => return Ok(object),
                Ok(_) => {}
                Err(err) => {
                    first_error.get_or_insert_with(|| err.to_string());
                }
            }
        }
        search_from = start + 1;
    }

    Err(first_error.map_or(ParseError::NoJsonObject, ParseError::InvalidJson))
}

/// Byte length of the balanced span starting at the `{` that opens `text`,
/// or `None` when it never closes.
fn balanced_span_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text.char_indices() {
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
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn read_score(value: Option<&Value>) -> Result<f64, ParseError> {
    let score = match value {
        None | Some(Value::Null) => return Err(ParseError::MissingScore),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| ParseError::InvalidScore(number.to_string()))?,
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidScore(text.clone()))?,
        Some(other) => return Err(ParseError::InvalidScore(other.to_string())),
    };

    if !score.is_finite() {
        return Err(ParseError::InvalidScore(score.to_string()));
    }
    Ok(score)
}
