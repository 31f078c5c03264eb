pub mod question;
pub mod request;

pub use question::{acceptance_threshold, validate_questions, CandidateQuestion, ValidatedQuestion};
pub use request::GenerationRequest;
