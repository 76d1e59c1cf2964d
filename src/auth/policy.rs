use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::error::AuthorizerError;
use crate::oidc::VerifiedClaims;

/// Placeholder for context fields the token does not carry
pub const UNKNOWN_CLAIM: &str = "unknown";

/// The claims forwarded downstream on success, and nothing else
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    pub repository: String,
    pub workflow: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub actor: String,
}

impl AuthorizationContext {
    fn from_claims(repository: &str, claims: &VerifiedClaims) -> Self {
        let or_unknown = |value: Option<&str>| value.unwrap_or(UNKNOWN_CLAIM).to_string();

        Self {
            repository: repository.to_string(),
            workflow: or_unknown(claims.workflow()),
            git_ref: or_unknown(claims.git_ref()),
            actor: or_unknown(claims.actor()),
        }
    }
}

/// Outcome of evaluating the policy against verified claims
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Allowed { context: AuthorizationContext },
    Denied { reason: AuthorizerError },
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthorizationDecision::Allowed { .. })
    }
}

/// Evaluate the ownership policy.
///
/// The token's `repository` claim must equal `{organization}/{repository}`
/// exactly; a missing claim is a mismatch. Every configured required claim
/// must then match by string equality. On success the context carries
/// `repository`, `workflow`, `ref` and `actor`, with absent optional claims
/// reported as [`UNKNOWN_CLAIM`].
pub fn evaluate(claims: &VerifiedClaims, config: &PolicyConfig) -> AuthorizationDecision {
    let expected = config.expected_repository();
    let actual = claims.repository().unwrap_or_default();

    if actual != expected {
        return AuthorizationDecision::Denied {
            reason: AuthorizerError::RepositoryMismatch {
                expected,
                actual: actual.to_string(),
            },
        };
    }

    for (claim, required) in &config.required_claims {
        if claims.get_str(claim) != Some(required.as_str()) {
            return AuthorizationDecision::Denied {
                reason: AuthorizerError::ClaimMismatch { claim: claim.clone() },
            };
        }
    }

    AuthorizationDecision::Allowed {
        context: AuthorizationContext::from_claims(actual, claims),
    }
}
