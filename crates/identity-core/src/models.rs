//! Domain models for the identity service.
//!
//! Storage crates own the persisted rows; these are the shapes the
//! auth layer reads and writes through the repository traits.

pub mod jwk;
pub mod refresh_session;
pub mod signing_key;
pub mod user;
