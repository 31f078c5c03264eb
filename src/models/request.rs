use serde::{Deserialize, Serialize};

use crate::errors::GenerationError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Input to one orchestrated generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub count: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>, count: u32) -> Self {
        Self {
            topic: topic.into(),
            count,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn check(&self) -> Result<(), GenerationError> {
        if self.topic.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("topic must not be empty".into()));
        }
        if self.count == 0 {
            return Err(GenerationError::InvalidRequest(
                "question count must be positive".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(GenerationError::InvalidRequest(
                "max attempts must be positive".into(),
            ));
        }
        Ok(())
    }
}
