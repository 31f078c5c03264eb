//! Quiz generation with credential rotation and bounded retry.
//!
//! Each attempt: select a credential, call the provider, extract and parse
//! the payload, validate. A failed attempt may take its credential out of
//! rotation (quota-looking errors only) and the next attempt selects again.
//! Only `NoCredentialAvailable` and `GenerationFailed` leave this module
//! (plus request checks and the optional caller timeout).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::errors::{AttemptError, GenerationError};
use crate::extract::extract_payload;
use crate::models::question::{acceptance_threshold, validate_questions, ValidatedQuestion};
use crate::models::request::GenerationRequest;
use crate::provider::GenerationClient;
use crate::store::credentials::{mask_credential, CredentialStore};

/// Substrings (case-insensitive) that mark an error as quota exhaustion.
pub const QUOTA_PATTERNS: [&str; 4] = ["quota", "limit", "429", "rate limit"];

/// Deactivation reason recorded for quota failures.
pub const QUOTA_EXCEEDED_REASON: &str = "quota_exceeded";

pub fn is_quota_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    QUOTA_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Parse failures say nothing about the credential, so they never
/// deactivate it.
fn should_deactivate(err: &AttemptError) -> bool {
    match err {
        AttemptError::PayloadParse(_) => false,
        AttemptError::Provider(e) => is_quota_error(&e.message),
        other => is_quota_error(&other.to_string()),
    }
}

pub fn build_prompt(topic: &str, count: u32) -> String {
    format!(
        r#"Create a JSON array of {count} multiple-choice quiz questions on the topic of '{topic}'.
Each question object must have this exact format:
{{
    "question_text": "The question text here",
    "options": ["Option A", "Option B", "Option C", "Option D"],
    "correct_answer": "The correct option text from above"
}}

IMPORTANT RULES:
- Return ONLY a raw JSON array, no additional text and no code blocks
- Each question must have exactly 4 options
- The correct_answer must exactly match one of the options
- Do not put code snippets or backticks in the question text
- Use simple, clear language
- Make questions educational and challenging
"#
    )
}

pub struct QuizGenerator<C> {
    store: Arc<CredentialStore>,
    client: C,
}

impl<C: GenerationClient> QuizGenerator<C> {
    pub fn new(store: Arc<CredentialStore>, client: C) -> Self {
        Self { store, client }
    }

    /// Run a store operation on the blocking pool; store mutations write
    /// the credential record to disk.
    async fn with_store<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&CredentialStore) -> R + Send + 'static,
        R: Send + 'static,
    {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || f(&store)).await {
            Ok(result) => result,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    /// Generate a validated question set, retrying up to
    /// `request.max_attempts` times.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ValidatedQuestion>, GenerationError> {
        request.check()?;

        let prompt = build_prompt(request.topic.trim(), request.count);
        let required = acceptance_threshold(request.count);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let credential = self
                .with_store(CredentialStore::select_credential)
                .await
                .ok_or(GenerationError::NoCredentialAvailable)?;

            match self.attempt(&prompt, &credential, required).await {
                Ok(questions) => {
                    tracing::info!(
                        topic = %request.topic,
                        requested = request.count,
                        generated = questions.len(),
                        attempt = attempt,
                        "generated quiz questions"
                    );
                    return Ok(questions);
                }
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = request.max_attempts,
                        kind = err.kind(),
                        credential = %mask_credential(&credential),
                        "generation attempt failed: {}",
                        err
                    );

                    if should_deactivate(&err) {
                        let key = credential.clone();
                        self.with_store(move |s| s.mark_inactive(&key, QUOTA_EXCEEDED_REASON))
                            .await;
                    }

                    if attempt >= request.max_attempts {
                        return Err(GenerationError::GenerationFailed {
                            attempts: attempt,
                            last: err,
                        });
                    }
                }
            }
        }
    }

    /// `generate` bounded by a wall-clock timeout.
    pub async fn generate_with_timeout(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<Vec<ValidatedQuestion>, GenerationError> {
        tokio::time::timeout(timeout, self.generate(request))
            .await
            .map_err(|_| GenerationError::Timeout(timeout))?
    }

    async fn attempt(
        &self,
        prompt: &str,
        credential: &str,
        required: usize,
    ) -> Result<Vec<ValidatedQuestion>, AttemptError> {
        let raw = self.client.generate(prompt, credential).await?;
        let key = credential.to_string();
        self.with_store(move |s| s.mark_used(&key)).await;

        let payload = extract_payload(&raw);
        tracing::debug!(
            preview = %payload.chars().take(200).collect::<String>(),
            "extracted payload"
        );

        let parsed: Value = serde_json::from_str(&payload)?;
        let questions = validate_questions(parsed)?;

        if questions.len() < required {
            return Err(AttemptError::InsufficientValidQuestions {
                valid: questions.len(),
                required,
            });
        }

        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;

    #[test]
    fn test_quota_patterns() {
        assert!(is_quota_error("429 Resource has been exhausted"));
        assert!(is_quota_error("Quota exceeded for quota metric"));
        assert!(is_quota_error("Rate Limit reached"));
        assert!(is_quota_error("daily LIMIT hit"));
        assert!(!is_quota_error("500 internal error"));
        assert!(!is_quota_error("API key not valid"));
    }

    #[test]
    fn test_parse_errors_never_deactivate() {
        let err = serde_json::from_str::<Value>("limit 429 quota").unwrap_err();
        assert!(!should_deactivate(&AttemptError::PayloadParse(err)));
    }

    #[test]
    fn test_provider_quota_deactivates() {
        let err = AttemptError::Provider(ProviderError::with_status(429, "Too Many Requests"));
        assert!(should_deactivate(&err));
        let err = AttemptError::Provider(ProviderError::with_status(500, "backend error"));
        assert!(!should_deactivate(&err));
    }

    #[test]
    fn test_low_yield_does_not_deactivate() {
        let err = AttemptError::InsufficientValidQuestions { valid: 1, required: 3 };
        assert!(!should_deactivate(&err));
        assert!(!should_deactivate(&AttemptError::Schema(
            "expected a list of questions".into()
        )));
    }

    #[test]
    fn test_prompt_mentions_count_topic_and_format() {
        let prompt = build_prompt("Photosynthesis", 7);
        assert!(prompt.contains("7 multiple-choice"));
        assert!(prompt.contains("'Photosynthesis'"));
        assert!(prompt.contains("question_text"));
        assert!(prompt.contains("correct_answer"));
        assert!(prompt.contains("exactly 4 options"));
        assert!(prompt.contains("backticks"));
    }
}
