//! Utility modules supporting federated search:
//!
//! - [`HttpClient`]: shared HTTP client with crate defaults
//! - [`resilient_request`]: retry/backoff/jitter transport wrapper
//! - [`CircuitBreaker`]: per-service failure tracker
//! - [`KeyRotator`]: round-robin API key selection

mod circuit_breaker;
mod http;
mod key_rotator;
mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use http::HttpClient;
pub use key_rotator::KeyRotator;
pub use transport::{resilient_request, RequestOptions};
