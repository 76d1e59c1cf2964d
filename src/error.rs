//! Error types for authorizer operations
//!
//! Every variant is a reason to deny a request. The detail strings are for
//! diagnostic logging only and never reach the caller; see
//! [`crate::authorizer::AuthorizerResponse`].

/// Authorizer error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizerError {
    #[error("No authorization header present")]
    MissingAuthHeader,

    #[error("Malformed authorization header: {0}")]
    MalformedAuthHeader(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("No signing key found for kid: {kid}")]
    KeyNotFound { kid: String },

    #[error("JWKS fetch failed: {0}")]
    KeyFetchFailed(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Token is outside its validity window")]
    ExpiredToken,

    #[error("Issuer mismatch: {0}")]
    IssuerMismatch(String),

    #[error("Audience mismatch: {0}")]
    AudienceMismatch(String),

    #[error("Repository mismatch: expected {expected}, got {actual}")]
    RepositoryMismatch { expected: String, actual: String },

    #[error("Claim mismatch: {claim}")]
    ClaimMismatch { claim: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AuthorizerError>;

impl AuthorizerError {
    /// Stable label used as the `kind` field in denial logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthorizerError::MissingAuthHeader => "missing_auth_header",
            AuthorizerError::MalformedAuthHeader(_) => "malformed_auth_header",
            AuthorizerError::MalformedToken(_) => "malformed_token",
            AuthorizerError::KeyNotFound { .. } => "key_not_found",
            AuthorizerError::KeyFetchFailed(_) => "key_fetch_failed",
            AuthorizerError::InvalidSignature(_) => "invalid_signature",
            AuthorizerError::ExpiredToken => "expired_token",
            AuthorizerError::IssuerMismatch(_) => "issuer_mismatch",
            AuthorizerError::AudienceMismatch(_) => "audience_mismatch",
            AuthorizerError::RepositoryMismatch { .. } => "repository_mismatch",
            AuthorizerError::ClaimMismatch { .. } => "claim_mismatch",
            AuthorizerError::Config(_) => "config",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthorizerError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey => AuthorizerError::InvalidSignature(err.to_string()),
            ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
                AuthorizerError::ExpiredToken
            }
            ErrorKind::InvalidIssuer => AuthorizerError::IssuerMismatch(err.to_string()),
            ErrorKind::InvalidAudience => AuthorizerError::AudienceMismatch(err.to_string()),
            ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
                "iss" => AuthorizerError::IssuerMismatch("token has no iss claim".to_string()),
                "aud" => AuthorizerError::AudienceMismatch("token has no aud claim".to_string()),
                other => AuthorizerError::MalformedToken(format!("missing required claim: {}", other)),
            },
            _ => AuthorizerError::MalformedToken(err.to_string()),
        }
    }
}
