//! Common types for OIDC token handling

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthorizerError, Result};

/// The signature algorithms this authorizer accepts.
///
/// There is exactly one. The verifier is handed a value of this type and
/// never reads an algorithm from the token, so `none` and symmetric
/// algorithms have no representation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    #[default]
    Rs256,
}

impl SignatureAlgorithm {
    pub fn to_jsonwebtoken(self) -> Algorithm {
        match self {
            SignatureAlgorithm::Rs256 => Algorithm::RS256,
        }
    }

    fn accepts_key_algorithm(self, alg: &KeyAlgorithm) -> bool {
        match self {
            SignatureAlgorithm::Rs256 => *alg == KeyAlgorithm::RS256,
        }
    }
}

/// A bearer credential taken from the `Authorization` header.
///
/// Lives for one request. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// The issuer's public signing keys from one fetch, keyed by `kid`.
///
/// Never mutated after construction; a refresh builds a new set.
#[derive(Clone, Default)]
pub struct SigningKeySet {
    keys: HashMap<String, Arc<DecodingKey>>,
}

impl SigningKeySet {
    /// Build a key set from a JWKS document.
    ///
    /// Keys that cannot verify `algorithm` signatures are skipped. A document
    /// without a `keys` array is rejected.
    pub fn from_jwks_document(document: &Value, algorithm: SignatureAlgorithm) -> Result<Self> {
        let entries = document
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| AuthorizerError::KeyFetchFailed("JWKS document has no keys array".to_string()))?;

        let mut keys = HashMap::new();
        for entry in entries {
            let jwk: Jwk = match serde_json::from_value(entry.clone()) {
                Ok(jwk) => jwk,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };

            let Some(kid) = jwk.common.key_id.clone() else {
                tracing::warn!("JWK missing kid field, skipping");
                continue;
            };

            match decoding_key_for(&jwk, algorithm) {
                Ok(key) => {
                    tracing::debug!(kid = %kid, "Parsed signing key");
                    keys.insert(kid, Arc::new(key));
                }
                Err(reason) => {
                    tracing::warn!(kid = %kid, reason = %reason, "Skipping JWK");
                }
            }
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl fmt::Debug for SigningKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<&str> = self.key_ids().collect();
        kids.sort_unstable();
        f.debug_struct("SigningKeySet").field("kids", &kids).finish()
    }
}

fn decoding_key_for(jwk: &Jwk, algorithm: SignatureAlgorithm) -> std::result::Result<DecodingKey, String> {
    if let Some(key_use) = &jwk.common.public_key_use {
        if *key_use != PublicKeyUse::Signature {
            return Err("key is not a signing key".to_string());
        }
    }

    if let Some(alg) = &jwk.common.key_algorithm {
        if !algorithm.accepts_key_algorithm(alg) {
            return Err(format!("key algorithm {:?} is not accepted", alg));
        }
    }

    match (&jwk.algorithm, algorithm) {
        (AlgorithmParameters::RSA(rsa), SignatureAlgorithm::Rs256) => {
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|e| e.to_string())
        }
        _ => Err("key type does not match the accepted algorithm".to_string()),
    }
}
