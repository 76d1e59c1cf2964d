//! Configuration loading for the authorizer
//!
//! A [`PolicyConfig`] is built once at process start, either from the
//! environment or from a TOML file, and is immutable afterwards. Every value
//! has a default so an empty environment yields a usable configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use actions_oidc_authorizer::config::{load_config, PolicyConfig};
//!
//! let from_env = PolicyConfig::from_env()?;
//! let from_file = load_config("authorizer.toml")?.policy_config()?;
//! ```

use crate::{AuthorizerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Issuer of GitHub Actions OIDC tokens
pub const GITHUB_OIDC_ISSUER: &str = "https://token.actions.githubusercontent.com";

pub const DEFAULT_ORGANIZATION: &str = "octodemo";
pub const DEFAULT_REPOSITORY: &str = "actions-playground";
pub const DEFAULT_AUDIENCE: &str = "api://ActionsOIDCGateway";

/// Default JWKS cache lifetime (1 hour)
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default bound on a single JWKS fetch
pub const DEFAULT_JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Default minimum spacing between refetches forced by unknown `kid`s
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Environment variable names
pub struct EnvKeys;

impl EnvKeys {
    pub const ISSUER: &'static str = "OIDC_ISSUER";
    pub const JWKS_URL: &'static str = "JWKS_URL";
    pub const AUDIENCE: &'static str = "OIDC_AUDIENCE";
    pub const ORGANIZATION: &'static str = "GITHUB_ORG";
    pub const REPOSITORY: &'static str = "GITHUB_REPO";
    pub const REQUIRED_CLAIMS: &'static str = "AUTHZ_REQUIRED_CLAIMS";
    pub const JWKS_CACHE_TTL_SECS: &'static str = "JWKS_CACHE_TTL_SECS";
    pub const JWKS_FETCH_TIMEOUT_SECS: &'static str = "JWKS_FETCH_TIMEOUT_SECS";
    pub const JWKS_MIN_REFRESH_INTERVAL_SECS: &'static str = "JWKS_MIN_REFRESH_INTERVAL_SECS";
}

/// Process-wide authorization policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Expected `iss` claim, compared by exact string equality
    pub issuer: String,
    /// HTTPS endpoint publishing the issuer's signing keys
    pub jwks_url: String,
    /// Value that must appear in the `aud` claim
    pub audience: String,
    /// Expected repository owner
    pub organization: String,
    /// Expected repository name within `organization`
    pub repository: String,
    /// Additional claims that must equal the given strings exactly
    pub required_claims: BTreeMap<String, String>,
    /// How long a fetched key set is served before it is refetched
    pub jwks_cache_ttl: Duration,
    /// Upper bound on one outbound JWKS fetch
    pub jwks_fetch_timeout: Duration,
    /// After a refetch forced by an unknown `kid`, further forced refetches
    /// wait this long. Zero disables the limit.
    pub jwks_min_refresh_interval: Duration,
}

impl PolicyConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, using the names in [`EnvKeys`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let required_claims = match get(EnvKeys::REQUIRED_CLAIMS) {
            Some(raw) => parse_required_claims(&raw)?,
            None => BTreeMap::new(),
        };

        let config = AuthorizerConfig {
            oidc: OidcSection {
                issuer: get(EnvKeys::ISSUER),
                jwks_url: get(EnvKeys::JWKS_URL),
                audience: get(EnvKeys::AUDIENCE),
            },
            policy: PolicySection {
                organization: get(EnvKeys::ORGANIZATION),
                repository: get(EnvKeys::REPOSITORY),
                required_claims,
            },
            jwks: JwksSection {
                cache_ttl_secs: get(EnvKeys::JWKS_CACHE_TTL_SECS)
                    .map(|v| parse_secs(EnvKeys::JWKS_CACHE_TTL_SECS, &v))
                    .transpose()?,
                fetch_timeout_secs: get(EnvKeys::JWKS_FETCH_TIMEOUT_SECS)
                    .map(|v| parse_secs(EnvKeys::JWKS_FETCH_TIMEOUT_SECS, &v))
                    .transpose()?,
                min_refresh_interval_secs: get(EnvKeys::JWKS_MIN_REFRESH_INTERVAL_SECS)
                    .map(|v| parse_secs(EnvKeys::JWKS_MIN_REFRESH_INTERVAL_SECS, &v))
                    .transpose()?,
            },
        };

        config.policy_config()
    }

    /// The repository identity tokens must carry: `{organization}/{repository}`
    pub fn expected_repository(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }

    /// Check the invariants every loader must uphold
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("issuer", &self.issuer),
            ("audience", &self.audience),
            ("organization", &self.organization),
            ("repository", &self.repository),
        ] {
            if value.trim().is_empty() {
                return Err(AuthorizerError::Config(format!("{} must not be empty", name)));
            }
        }

        if self.organization.contains('/') || self.repository.contains('/') {
            return Err(AuthorizerError::Config(
                "organization and repository must not contain '/'".to_string(),
            ));
        }

        if !self.jwks_url.starts_with("https://") {
            return Err(AuthorizerError::Config(format!(
                "JWKS URL must use https: {}",
                self.jwks_url
            )));
        }

        if self.jwks_cache_ttl.is_zero() || self.jwks_fetch_timeout.is_zero() {
            return Err(AuthorizerError::Config(
                "JWKS cache TTL and fetch timeout must be greater than zero".to_string(),
            ));
        }

        if self.required_claims.keys().any(|name| name.trim().is_empty()) {
            return Err(AuthorizerError::Config("required claim names must not be empty".to_string()));
        }

        Ok(())
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            issuer: GITHUB_OIDC_ISSUER.to_string(),
            jwks_url: jwks_url_for(GITHUB_OIDC_ISSUER),
            audience: DEFAULT_AUDIENCE.to_string(),
            organization: DEFAULT_ORGANIZATION.to_string(),
            repository: DEFAULT_REPOSITORY.to_string(),
            required_claims: BTreeMap::new(),
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            jwks_fetch_timeout: DEFAULT_JWKS_FETCH_TIMEOUT,
            jwks_min_refresh_interval: DEFAULT_JWKS_MIN_REFRESH_INTERVAL,
        }
    }
}

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizerConfig {
    #[serde(default)]
    pub oidc: OidcSection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub jwks: JwksSection,
}

/// `[oidc]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OidcSection {
    #[serde(default)]
    pub issuer: Option<String>,

    /// Defaults to `{issuer}/.well-known/jwks`
    #[serde(default)]
    pub jwks_url: Option<String>,

    #[serde(default)]
    pub audience: Option<String>,
}

/// `[policy]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default)]
    pub organization: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default)]
    pub required_claims: BTreeMap<String, String>,
}

/// `[jwks]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwksSection {
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,

    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,

    #[serde(default)]
    pub min_refresh_interval_secs: Option<u64>,
}

impl AuthorizerConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_config(path)
    }

    /// Fill defaults and validate
    pub fn policy_config(&self) -> Result<PolicyConfig> {
        let defaults = PolicyConfig::default();

        let issuer = self.oidc.issuer.clone().unwrap_or(defaults.issuer);
        let jwks_url = self
            .oidc
            .jwks_url
            .clone()
            .unwrap_or_else(|| jwks_url_for(&issuer));

        let config = PolicyConfig {
            issuer,
            jwks_url,
            audience: self.oidc.audience.clone().unwrap_or(defaults.audience),
            organization: self.policy.organization.clone().unwrap_or(defaults.organization),
            repository: self.policy.repository.clone().unwrap_or(defaults.repository),
            required_claims: self.policy.required_claims.clone(),
            jwks_cache_ttl: self
                .jwks
                .cache_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.jwks_cache_ttl),
            jwks_fetch_timeout: self
                .jwks
                .fetch_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.jwks_fetch_timeout),
            jwks_min_refresh_interval: self
                .jwks
                .min_refresh_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.jwks_min_refresh_interval),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from a TOML file
///
/// # Example
///
/// ```rust,ignore
/// let config = actions_oidc_authorizer::config::load_config("authorizer.toml")?;
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AuthorizerConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| AuthorizerError::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| AuthorizerError::Config(format!("Failed to parse TOML config: {}", e)))
}

/// Well-known JWKS location for an issuer
pub fn jwks_url_for(issuer: &str) -> String {
    format!("{}/.well-known/jwks", issuer.trim_end_matches('/'))
}

/// Parse `name=value,name=value` into a claim map
fn parse_required_claims(raw: &str) -> Result<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                AuthorizerError::Config(format!(
                    "{} entries must look like name=value, got: {}",
                    EnvKeys::REQUIRED_CLAIMS,
                    pair
                ))
            })?;
            Ok((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| AuthorizerError::Config(format!("{} must be a whole number of seconds: {}", key, e)))
}
