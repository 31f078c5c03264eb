//! Question records and the validator that turns parsed model output into
//! them.
//!
//! Validation is per element: one malformed question is dropped, the rest of
//! the batch survives. Only a payload that is not a list at all is an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AttemptError;

/// Every question must offer exactly this many options.
pub const OPTION_COUNT: usize = 4;

/// Floor on the number of validated questions a batch needs.
pub const MIN_ACCEPTED: usize = 3;

/// A question that passed every check. `correct_answer` is always one of
/// `options`, verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// A parsed but unchecked question.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// Numbers and booleans are accepted in their text form.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl CandidateQuestion {
    /// Read the three required fields. `None` if the element is not a mapping,
    /// a field is missing, or a field has an unusable type. Mapping-shaped
    /// options are flattened to their values in the order given.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let question_text = obj.get("question_text")?.as_str()?.to_string();
        let options = match obj.get("options")? {
            Value::Array(items) => items.iter().map(scalar_text).collect::<Option<Vec<_>>>()?,
            Value::Object(map) => map.values().map(scalar_text).collect::<Option<Vec<_>>>()?,
            _ => return None,
        };
        let correct_answer = scalar_text(obj.get("correct_answer")?)?;
        Some(Self {
            question_text,
            options,
            correct_answer,
        })
    }

    /// Apply the structural and answer-consistency checks.
    pub fn validate(self) -> Option<ValidatedQuestion> {
        if self.options.len() != OPTION_COUNT {
            return None;
        }

        let question_text = clean_question_text(&self.question_text);
        if question_text.is_empty() {
            return None;
        }

        let correct_answer = resolve_answer(&self.correct_answer, &self.options)?;

        Some(ValidatedQuestion {
            question_text,
            options: self.options,
            correct_answer,
        })
    }
}

/// Drop stray code fence markers from question text.
pub fn clean_question_text(text: &str) -> String {
    text.replace("```", "").trim().to_string()
}

/// Exact match first, then a case-insensitive trimmed match. The returned
/// text is always the option's own spelling.
pub fn resolve_answer(answer: &str, options: &[String]) -> Option<String> {
    if options.iter().any(|o| o == answer) {
        return Some(answer.to_string());
    }
    let wanted = answer.trim().to_lowercase();
    options
        .iter()
        .find(|o| o.trim().to_lowercase() == wanted)
        .cloned()
}

/// Validate a parsed model payload. A top-level `{"questions": [...]}`
/// wrapper is unwrapped; anything that is then not a list is a schema error.
pub fn validate_questions(payload: Value) -> Result<Vec<ValidatedQuestion>, AttemptError> {
    let payload = match payload {
        Value::Object(mut map) if map.contains_key("questions") => {
            map.remove("questions").unwrap_or(Value::Null)
        }
        other => other,
    };

    let Value::Array(items) = payload else {
        return Err(AttemptError::Schema("expected a list of questions".into()));
    };

    let total = items.len();
    let validated: Vec<ValidatedQuestion> = items
        .iter()
        .filter_map(CandidateQuestion::from_value)
        .filter_map(CandidateQuestion::validate)
        .collect();

    if validated.len() < total {
        tracing::debug!(
            total = total,
            valid = validated.len(),
            "dropped malformed questions"
        );
    }

    Ok(validated)
}

/// How many validated questions a batch needs before it is returned.
pub fn acceptance_threshold(requested: u32) -> usize {
    MIN_ACCEPTED.max(requested as usize / 2)
}
