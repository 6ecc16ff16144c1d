//! Identity Auth: credential hashing, signing-key lifecycle, access
//! token issuance and the rotating refresh-session protocol.

pub mod config;
pub mod error;
pub mod keys;
pub mod manager;
pub mod password;
pub mod protocol;
pub mod rotation;
pub mod service;
pub mod token;

pub use config::{AuthConfig, KeyRotationConfig};
pub use error::AuthError;
pub use manager::{AuthKeyManager, Rotation, TickReport};
pub use password::CredentialHasher;
pub use protocol::{ClientInfo, TokenPair, TokenProtocol};
pub use rotation::KeyRotationWorker;
pub use service::{IdentityAuthService, LoginInput, LoginOutput, RegisterInput};
pub use token::{AccessTokenClaims, IssuedAccessToken, RefreshToken};
