//! Axum integration for the authorizer
//!
//! This module exposes the authorizer over HTTP:
//! - [`router`]: a `POST /authorize` endpoint taking the gateway's authorizer
//!   event and returning the boundary response
//! - [`AuthorizedContext`]: an extractor for handlers behind
//!   [`RequireGatewayAuthorization`](crate::auth::RequireGatewayAuthorization)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use actions_oidc_authorizer::{Authorizer, PolicyConfig};
//! use actions_oidc_authorizer::axum_integration::router;
//!
//! let authorizer = Arc::new(Authorizer::new(PolicyConfig::from_env()?)?);
//! let app = router(authorizer);
//! ```

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};

use crate::auth::policy::AuthorizationContext;
use crate::authorizer::{Authorizer, AuthorizerRequest, AuthorizerResponse};

/// Router serving `POST /authorize`
pub fn router(authorizer: Arc<Authorizer>) -> Router {
    Router::new()
        .route("/authorize", post(authorize_event))
        .with_state(authorizer)
}

/// Evaluate a gateway authorizer event.
///
/// Always answers 200 with a boundary response; a body that is not a valid
/// event is denied like any other failure.
async fn authorize_event(State(authorizer): State<Arc<Authorizer>>, body: Bytes) -> Json<AuthorizerResponse> {
    let request: AuthorizerRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable authorizer event");
            return Json(AuthorizerResponse::denied());
        }
    };

    Json(authorizer.authorize(&request).await)
}

/// Convert HTTP headers into an [`AuthorizerRequest`].
///
/// Names are lowercased by `http`; values that are not visible ASCII are
/// dropped, and for repeated names the first value wins.
pub fn request_from_headers(headers: &HeaderMap) -> AuthorizerRequest {
    let mut map = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    AuthorizerRequest::new(map)
}

/// Axum extractor for the authorization context
///
/// The context must be inserted by
/// [`RequireGatewayAuthorization`](crate::auth::RequireGatewayAuthorization)
/// before this extractor runs.
///
/// # Example
///
/// ```rust,ignore
/// use actions_oidc_authorizer::axum_integration::AuthorizedContext;
///
/// async fn handler(context: AuthorizedContext) -> String {
///     format!("Hello from {}", context.repository)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizedContext(pub AuthorizationContext);

impl Deref for AuthorizedContext {
    type Target = AuthorizationContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<AuthorizationContext> for AuthorizedContext {
    fn from(context: AuthorizationContext) -> Self {
        Self(context)
    }
}

impl AuthorizedContext {
    pub fn into_inner(self) -> AuthorizationContext {
        self.0
    }
}

impl<S> FromRequestParts<S> for AuthorizedContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthorizedContext>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
