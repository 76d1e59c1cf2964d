//! Authorization policy and route protection
//!
//! - [`policy`]: the pure ownership check applied to verified claims
//! - `RequireGatewayAuthorization`: a tower layer that runs the full
//!   authorizer in front of axum routes (feature `server`)
//!
//! # Example
//!
//! ```ignore
//! use axum::{routing::get, Router};
//! use actions_oidc_authorizer::auth::RequireGatewayAuthorization;
//! use actions_oidc_authorizer::axum_integration::AuthorizedContext;
//!
//! async fn greet(context: AuthorizedContext) -> String {
//!     format!("Hello, {}!", context.actor)
//! }
//!
//! let app = Router::new()
//!     .route("/greet", get(greet))
//!     .layer(RequireGatewayAuthorization::new(authorizer));
//! ```

pub mod policy;

#[cfg(feature = "server")]
pub mod middleware;

pub use policy::{evaluate, AuthorizationContext, AuthorizationDecision, UNKNOWN_CLAIM};

#[cfg(feature = "server")]
pub use middleware::RequireGatewayAuthorization;
