//! Authorizer entry point
//!
//! [`Authorizer::authorize`] is the boundary: it takes the gateway's request
//! event and returns one of exactly two response shapes. Every failure,
//! including a panic below this point, becomes the same denial.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::auth::policy::{self, AuthorizationContext, AuthorizationDecision};
use crate::config::PolicyConfig;
use crate::error::{AuthorizerError, Result};
use crate::oidc::{BearerToken, JwksSource, KeyResolver, TokenVerifier};

/// Inbound request: the header map of the call being authorized.
///
/// Deserializes from an API gateway authorizer event; other event fields
/// are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizerRequest {
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl AuthorizerRequest {
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }

    /// Request carrying only an `Authorization` header
    pub fn with_authorization(value: impl Into<String>) -> Self {
        Self::new(HashMap::from([("authorization".to_string(), value.into())]))
    }
}

/// Boundary response: `{"isAuthorized": true, "context": {...}}` or
/// `{"isAuthorized": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub is_authorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<AuthorizationContext>,
}

impl AuthorizerResponse {
    pub fn authorized(context: AuthorizationContext) -> Self {
        Self {
            is_authorized: true,
            context: Some(context),
        }
    }

    /// The single denial shape, whatever the cause
    pub fn denied() -> Self {
        Self {
            is_authorized: false,
            context: None,
        }
    }
}

/// Find the `Authorization` header value.
///
/// Header names are matched case-insensitively, preferring the exact
/// spellings `authorization` then `Authorization`. Blank values count as
/// absent, so a blank `authorization` does not hide a populated
/// `Authorization`.
pub fn find_authorization_header(headers: &HashMap<String, String>) -> Option<&str> {
    let present = |value: &&String| !value.trim().is_empty();

    headers
        .get("authorization")
        .filter(present)
        .or_else(|| headers.get("Authorization").filter(present))
        .or_else(|| {
            headers
                .iter()
                .filter(|(name, _)| name.eq_ignore_ascii_case("authorization"))
                .map(|(_, value)| value)
                .find(present)
        })
        .map(String::as_str)
}

/// Extract the bearer token from a request's headers.
///
/// The header must split on whitespace into exactly two parts, the first
/// being `bearer` in any case.
pub fn extract_bearer_token(headers: &HashMap<String, String>) -> Result<BearerToken> {
    let value = find_authorization_header(headers).ok_or(AuthorizerError::MissingAuthHeader)?;

    let parts: Vec<&str> = value.split_whitespace().collect();
    match parts.as_slice() {
        [scheme, token] if scheme.eq_ignore_ascii_case("bearer") => Ok(BearerToken::new(*token)),
        [scheme, _] => Err(AuthorizerError::MalformedAuthHeader(format!(
            "unsupported scheme: {}",
            scheme
        ))),
        _ => Err(AuthorizerError::MalformedAuthHeader(format!(
            "expected 2 parts, found {}",
            parts.len()
        ))),
    }
}

/// Verifies bearer tokens and applies the ownership policy
pub struct Authorizer {
    config: Arc<PolicyConfig>,
    verifier: TokenVerifier,
}

impl Authorizer {
    /// Authorizer that fetches keys from the configured JWKS endpoint
    pub fn new(config: PolicyConfig) -> Result<Self> {
        config.validate()?;
        let resolver = KeyResolver::from_config(&config)?;
        Ok(Self::from_parts(config, resolver))
    }

    /// Authorizer over a custom key source
    pub fn with_source(config: PolicyConfig, source: Arc<dyn JwksSource>) -> Self {
        let resolver = KeyResolver::with_source(source, &config);
        Self::from_parts(config, resolver)
    }

    fn from_parts(config: PolicyConfig, resolver: KeyResolver) -> Self {
        Self {
            config: Arc::new(config),
            verifier: TokenVerifier::new(resolver),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Extract, verify and evaluate, keeping the internal failure reason.
    ///
    /// For diagnostics and tests. Callers outside the trust boundary get
    /// [`authorize`](Self::authorize) instead.
    pub async fn decide(&self, request: &AuthorizerRequest) -> AuthorizationDecision {
        let token = match extract_bearer_token(&request.headers) {
            Ok(token) => token,
            Err(reason) => return AuthorizationDecision::Denied { reason },
        };

        match self.verifier.verify(&token, &self.config).await {
            Ok(claims) => policy::evaluate(&claims, &self.config),
            Err(reason) => AuthorizationDecision::Denied { reason },
        }
    }

    /// Authorize a request, returning the boundary response.
    pub async fn authorize(&self, request: &AuthorizerRequest) -> AuthorizerResponse {
        let decision = match AssertUnwindSafe(self.decide(request)).catch_unwind().await {
            Ok(decision) => decision,
            Err(_) => {
                tracing::error!("authorization panicked; denying");
                return AuthorizerResponse::denied();
            }
        };

        match decision {
            AuthorizationDecision::Allowed { context } => {
                tracing::info!(
                    repository = %context.repository,
                    workflow = %context.workflow,
                    "ref" = %context.git_ref,
                    actor = %context.actor,
                    "authorization granted"
                );
                AuthorizerResponse::authorized(context)
            }
            AuthorizationDecision::Denied { reason } => {
                log_denial(&reason);
                AuthorizerResponse::denied()
            }
        }
    }
}

fn log_denial(reason: &AuthorizerError) {
    match reason {
        AuthorizerError::MissingAuthHeader
        | AuthorizerError::MalformedAuthHeader(_)
        | AuthorizerError::MalformedToken(_)
        | AuthorizerError::KeyNotFound { .. }
        | AuthorizerError::InvalidSignature(_)
        | AuthorizerError::ExpiredToken
        | AuthorizerError::IssuerMismatch(_)
        | AuthorizerError::AudienceMismatch(_)
        | AuthorizerError::RepositoryMismatch { .. }
        | AuthorizerError::ClaimMismatch { .. } => {
            tracing::warn!(kind = reason.kind(), reason = %reason, "authorization denied");
        }
        AuthorizerError::KeyFetchFailed(_) => {
            tracing::error!(kind = reason.kind(), reason = %reason, "authorization denied: signing keys unavailable");
        }
        // Not produced on the request path; denied all the same.
        AuthorizerError::Config(_) => {
            tracing::error!(kind = reason.kind(), reason = %reason, "authorization denied: unexpected failure");
        }
    }
}
