//! Bearer-token authentication
//!
//! Tokens are issued by the identity service; this backend only verifies
//! them and turns their claims into an [`Actor`](crate::models::Actor).

mod jwt;

pub use jwt::{issue_token, verify_token, Claims, JwtError, Role, TokenVerifier};
