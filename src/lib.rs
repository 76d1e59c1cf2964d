//! # Actions OIDC Authorizer
//!
//! Request-time authorization for an API gateway, accepting bearer tokens
//! issued by the GitHub Actions OIDC provider.
//!
//! A request is allowed when its token
//! - is a well-formed JWT signed with RS256 by a key in the issuer's JWKS,
//! - is unexpired and carries the configured issuer and audience,
//! - names the configured `{organization}/{repository}` in its
//!   `repository` claim and matches any additional required claims.
//!
//! Every other outcome is the same denial, `{"isAuthorized": false}`.
//!
//! ## Features
//!
//! - `server` (default): axum router, tower middleware and the
//!   `authorizer-server` binary

pub mod error;
pub use error::{AuthorizerError, Result};

pub mod config;
pub use config::{load_config, AuthorizerConfig, PolicyConfig};

pub mod oidc;
pub mod auth;
pub mod authorizer;

#[cfg(feature = "server")]
pub mod axum_integration;

pub use crate::auth::policy::{AuthorizationContext, AuthorizationDecision};
pub use crate::authorizer::{Authorizer, AuthorizerRequest, AuthorizerResponse};
pub use crate::oidc::{
    BearerToken, HttpJwksSource, JwksSource, KeyResolver, SignatureAlgorithm, SigningKeySet, TokenVerifier,
    VerifiedClaims,
};
