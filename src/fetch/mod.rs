//! Resilient upstream fetching
//!
//! - `client` - Tronscan HTTP client (`LedgerSource` implementation)
//! - `retry` - retry policy and the generic `execute_with_retry` combinator
//! - `error` - fetch error taxonomy

pub mod client;
pub mod error;
pub mod retry;

pub use client::{LedgerSource, Page, TronscanClient};
pub use error::FetchError;
pub use retry::{execute_with_retry, AttemptOutcome, RetryError, RetryPolicy};
