//! Authentication boundary.
//!
//! Token verification is owned by an external service; this module only
//! carries the bearer token to it and maps the outcome onto the request.

pub mod client;
pub mod middleware;

pub use client::{AuthClient, VerifyOutcome};
pub use middleware::{auth_middleware, AuthUser};
