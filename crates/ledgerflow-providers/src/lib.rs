//! Provider registry, HTTP clients, and the per-provider gating layer
//! (rate limiting, circuit breaking, response caching) described in spec
//! §4.1–§4.2.

mod cache;
mod capability;
mod circuit_breaker;
mod client;
mod generic_http;
mod rate_limit;
mod registry;

pub use cache::ResponseCache;
pub use capability::{
	Capabilities, ClientDefaults, Operation, ProviderMetadata, RateLimitConfig, ReplayWindow,
};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use client::{BatchResult, ClientError, ProviderClient, TypedRecord};
pub use generic_http::GenericHttpClient;
pub use rate_limit::ProviderRateLimiter;
pub use registry::{ProviderRegistry, SourceRegistry};
