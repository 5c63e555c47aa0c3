//! Quota-aware protection around remote vision calls.
//!
//! - [`ResilientInvoker`] retries a single call with exponential backoff when
//!   the backend reports rate limiting, then gives up with
//!   [`AiError::QuotaExceeded`](crate::error::AiError::QuotaExceeded).
//! - [`QuotaCircuitBreaker`] remembers that the quota ran out and keeps every
//!   AI feature disabled until the cooldown passes.

mod breaker;
mod invoker;

pub use breaker::QuotaCircuitBreaker;
pub use invoker::{QuotaClassifier, RateLimitClassifier, ResilientInvoker, RetryPolicy};
