//! quizgen — quiz question generation over a rotating pool of API keys.
//!
//! Library crate shared by the `quizgen` binary and the integration tests
//! in `tests/`.

pub mod config;
pub mod errors;
pub mod extract;
pub mod generator;
pub mod jobs;
pub mod models;
pub mod provider;
pub mod rotation;
pub mod store;
