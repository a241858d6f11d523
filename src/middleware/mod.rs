pub mod auth;
pub mod rate_limit;

pub use auth::resolve_identity;
pub use rate_limit::{enforce_rate_limit, RateLimitPolicy, RateLimiter, RouteLimit};
