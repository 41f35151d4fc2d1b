pub mod client;
pub mod error;
pub mod limiter;
pub mod models;
pub mod repair;
pub mod structured;

pub use client::CompletionClient;
pub use error::LlmError;
pub use limiter::RateLimiter;
pub use models::{CompletionResult, RequestSpec, RetryPolicy, Usage};
pub use structured::StructuredCompletionClient;
