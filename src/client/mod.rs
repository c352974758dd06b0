//! Outbound licensing API access.

pub mod api;
pub mod http;
pub mod retry;

pub use api::{ApiOutcome, LicenseApi};
pub use http::HttpLicenseClient;
pub use retry::{retry_with_backoff, RetryPolicy};
