//! Shared helpers for integration tests: fixture keys, token minting and an
//! in-memory JWKS source that counts fetches.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use actions_oidc_authorizer::{Authorizer, AuthorizerError, JwksSource, PolicyConfig, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing.pem");
pub const ROTATED_KEY_PEM: &str = include_str!("../fixtures/rotated.pem");
pub const JWKS: &str = include_str!("../fixtures/jwks.json");
pub const JWKS_ROTATED: &str = include_str!("../fixtures/jwks_rotated.json");

pub const SIGNING_KID: &str = "test-key-1";
pub const ROTATED_KID: &str = "rotated-key-2";

pub const ISSUER: &str = "https://token.actions.githubusercontent.com";
pub const AUDIENCE: &str = "api://ActionsOIDCGateway";

pub fn jwks() -> Value {
    serde_json::from_str(JWKS).expect("fixture jwks")
}

pub fn jwks_rotated() -> Value {
    serde_json::from_str(JWKS_ROTATED).expect("fixture jwks")
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

/// Claims of a valid token for `octodemo/actions-playground`
pub fn valid_claims() -> Value {
    let now = now();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "repo:octodemo/actions-playground:ref:refs/heads/main",
        "iat": now,
        "nbf": now - 5,
        "exp": now + 300,
        "repository": "octodemo/actions-playground",
        "repository_owner": "octodemo",
        "workflow": "ci",
        "ref": "refs/heads/main",
        "actor": "alice",
        "event_name": "push",
    })
}

/// Sign `claims` with RS256 under `kid`
pub fn sign_with(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("fixture key");
    jsonwebtoken::encode(&header, claims, &key).expect("encode test token")
}

pub fn sign(claims: &Value) -> String {
    sign_with(SIGNING_KEY_PEM, SIGNING_KID, claims)
}

pub fn with_claim(name: &str, value: Value) -> Value {
    let mut claims = valid_claims();
    claims[name] = value;
    claims
}

pub fn without_claim(name: &str) -> Value {
    let mut claims = valid_claims();
    claims.as_object_mut().expect("object").remove(name);
    claims
}

/// In-memory JWKS source serving a scripted sequence of documents; the last
/// one repeats.
pub struct CountingSource {
    documents: Mutex<Vec<Result<Value>>>,
    fetches: AtomicUsize,
    delay: Duration,
}

impl CountingSource {
    pub fn serving(documents: Vec<Value>) -> Arc<Self> {
        Self::scripted(documents.into_iter().map(Ok).collect(), Duration::ZERO)
    }

    pub fn failing() -> Arc<Self> {
        Self::scripted(
            vec![Err(AuthorizerError::KeyFetchFailed("connection refused".to_string()))],
            Duration::ZERO,
        )
    }

    pub fn scripted(documents: Vec<Result<Value>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            documents: Mutex::new(documents),
            fetches: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JwksSource for CountingSource {
    async fn fetch_jwks(&self) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut documents = self.documents.lock().expect("lock");
        if documents.len() > 1 {
            documents.remove(0)
        } else {
            documents[0].clone()
        }
    }
}

pub fn authorizer_with(source: Arc<CountingSource>) -> Authorizer {
    Authorizer::with_source(PolicyConfig::default(), source)
}
