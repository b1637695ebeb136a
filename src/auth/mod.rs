//! Authentication module
//!
//! JWT validation at the edge. Tokens are minted by the core service;
//! the gateway verifies them with the shared HS256 secret and threads
//! the authenticated identity into the request context.

pub mod jwt;
pub mod middleware;

pub use jwt::{bearer_token, Claims, JwtValidator};
pub use middleware::{auth_middleware, AuthenticatedUser};
