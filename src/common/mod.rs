//! Shared helpers: polling/retry, boolean expressions and date patterns.

pub mod date_format;
pub mod expression;
pub mod retry;

pub use retry::{retry, RetryPolicy};
