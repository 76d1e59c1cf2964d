//! Token verification: structure, signature, expiry, issuer, audience

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, decode_header, Validation};
use serde_json::{Map, Value};

use crate::config::PolicyConfig;
use crate::error::{AuthorizerError, Result};
use super::key_resolver::KeyResolver;
use super::types::BearerToken;

/// Claims from a token that passed every check in [`TokenVerifier::verify`].
///
/// The only constructor is private to this module, so holding a value of
/// this type means the signature, issuer, audience and expiry were checked.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    claims: Map<String, Value>,
}

impl VerifiedClaims {
    /// Any claim by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// A claim by name, if it is a string
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    /// Audience values; `aud` may be a single string or an array
    pub fn audiences(&self) -> Vec<&str> {
        match self.claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(auds)) => auds.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.claims.get("exp").and_then(Value::as_u64)
    }

    pub fn repository(&self) -> Option<&str> {
        self.get_str("repository")
    }

    pub fn workflow(&self) -> Option<&str> {
        self.get_str("workflow")
    }

    pub fn git_ref(&self) -> Option<&str> {
        self.get_str("ref")
    }

    pub fn actor(&self) -> Option<&str> {
        self.get_str("actor")
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.claims
    }

    #[cfg(test)]
    pub(crate) fn assume_verified(claims: Map<String, Value>) -> Self {
        Self { claims }
    }
}

/// Verifies bearer tokens against the issuer's published keys
pub struct TokenVerifier {
    resolver: KeyResolver,
}

impl TokenVerifier {
    pub fn new(resolver: KeyResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Verify `token` and return its claims.
    ///
    /// Checks run in order and stop at the first failure: structure, key
    /// lookup, signature, then expiry, issuer and audience. Nothing from the
    /// payload is used before the signature has been checked.
    pub async fn verify(&self, token: &BearerToken, config: &PolicyConfig) -> Result<VerifiedClaims> {
        let token = token.as_str();
        ensure_well_formed(token)?;

        let header = decode_header(token)
            .map_err(|e| AuthorizerError::MalformedToken(format!("Invalid JWT header: {}", e)))?;

        let algorithm = self.resolver.algorithm().to_jsonwebtoken();
        if header.alg != algorithm {
            return Err(AuthorizerError::InvalidSignature(format!(
                "token algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| AuthorizerError::MalformedToken("JWT missing kid in header".to_string()))?;

        let decoding_key = self.resolver.resolve(&kid).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);

        let token_data = decode::<Map<String, Value>>(token, &decoding_key, &validation)?;

        tracing::debug!(kid = %kid, "token verified");
        Ok(VerifiedClaims {
            claims: token_data.claims,
        })
    }
}

/// Reject anything that is not three segments with a JSON-object payload.
///
/// The payload is decoded only to check its shape and then discarded.
fn ensure_well_formed(token: &str) -> Result<()> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthorizerError::MalformedToken(format!(
            "JWT must have 3 segments, found {}",
            segments.len()
        )));
    }

    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(AuthorizerError::MalformedToken("JWT has an empty segment".to_string()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|e| AuthorizerError::MalformedToken(format!("Failed to decode JWT payload: {}", e)))?;

    serde_json::from_slice::<Map<String, Value>>(&payload)
        .map(|_| ())
        .map_err(|e| AuthorizerError::MalformedToken(format!("JWT payload is not a JSON object: {}", e)))
}
