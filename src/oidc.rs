//! OIDC token verification
//!
//! Key resolution against the issuer's published JWKS, and verification of
//! bearer tokens signed with those keys.

pub mod types;
pub mod key_resolver;
pub mod verifier;

pub use types::*;
pub use key_resolver::*;
pub use verifier::*;
