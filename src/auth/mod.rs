//! Account authentication: tokens, the provider cache and the
//! authenticator seam.

pub mod provider;
pub mod token;

pub use provider::{AuthProvider, Authenticator, OfflineAuthenticator};
pub use token::{AccountRef, AuthToken};
