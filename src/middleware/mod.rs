//! HTTP middleware: request tracing, rate limiting, security headers and
//! bearer-token authentication

pub mod auth;
mod rate_limiter;
mod security;
mod tracing;

pub use auth::AuthenticatedUser;
pub use rate_limiter::{rate_limit, RateLimiter};
pub use security::{hsts_header, security_headers};
pub use tracing::{request_tracing, REQUEST_ID_HEADER};
