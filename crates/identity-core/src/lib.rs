//! Identity Core: domain models, error taxonomy and the repository
//! contracts consumed by the auth layer and implemented by storage.

pub mod error;
pub mod models;
pub mod repository;

pub use error::{ErrorKind, IdentityError, IdentityResult};
