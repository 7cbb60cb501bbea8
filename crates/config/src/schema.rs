//! Config schema: raw layered settings and the validated client settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "https://api.pingone.com/v1";
pub const DEFAULT_TOKEN_CACHE: &str = ".oidc_token_cache.json";

/// Placeholder in `issuer` replaced by the environment id.
pub const ENVIRONMENT_ID_PLACEHOLDER: &str = "{environment_id}";

/// One layer of configuration (file, environment, or flags). Every field is
/// optional so layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    pub client_id: Option<String>,
    pub issuer: Option<String>,
    pub redirect_port: Option<u16>,
    pub scope: Option<String>,
    pub environment_id: Option<String>,
    pub api_base_url: Option<String>,
    pub token_cache: Option<PathBuf>,
}

/// Validated settings; everything needed before the first network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub client_id: String,
    pub issuer: String,
    pub redirect_port: u16,
    /// Unset means the OAuth client's own default.
    pub scope: Option<String>,
    pub environment_id: String,
    pub api_base_url: String,
    pub token_cache: PathBuf,
}

impl OidcConfig {
    /// Overlay `other` on top of `self`; set fields in `other` win.
    pub fn merge(self, other: OidcConfig) -> Self {
        Self {
            client_id: other.client_id.or(self.client_id),
            issuer: other.issuer.or(self.issuer),
            redirect_port: other.redirect_port.or(self.redirect_port),
            scope: other.scope.or(self.scope),
            environment_id: other.environment_id.or(self.environment_id),
            api_base_url: other.api_base_url.or(self.api_base_url),
            token_cache: other.token_cache.or(self.token_cache),
        }
    }

    /// Cache location, usable without full validation.
    pub fn token_cache_path(&self) -> PathBuf {
        self.token_cache
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_CACHE))
    }

    /// Check required settings, naming every missing one at once.
    pub fn validate(self) -> anyhow::Result<ClientSettings> {
        let token_cache = self.token_cache_path();
        let Self {
            client_id,
            issuer,
            redirect_port,
            scope,
            environment_id,
            api_base_url,
            ..
        } = self;

        let client_id = client_id.filter(|v| !v.trim().is_empty());
        let issuer = issuer.filter(|v| !v.trim().is_empty());
        let environment_id = environment_id.filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        if client_id.is_none() {
            missing.push("client_id (OIDC_CLIENT_ID)");
        }
        if issuer.is_none() {
            missing.push("issuer (OIDC_ISSUER)");
        }
        if redirect_port.is_none() {
            missing.push("redirect_port (OIDC_REDIRECT_PORT)");
        }
        if environment_id.is_none() {
            missing.push("environment_id (OIDC_ENV_ID)");
        }

        let (Some(client_id), Some(issuer), Some(redirect_port), Some(environment_id)) =
            (client_id, issuer, redirect_port, environment_id)
        else {
            anyhow::bail!("missing required settings: {}", missing.join(", "));
        };

        Ok(ClientSettings {
            issuer: issuer.replace(ENVIRONMENT_ID_PLACEHOLDER, &environment_id),
            client_id,
            redirect_port,
            scope: scope.filter(|s| !s.trim().is_empty()),
            environment_id,
            api_base_url: api_base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.into()),
            token_cache,
        })
    }
}

impl ClientSettings {
    /// The resource this client reads: the environment's user list.
    pub fn users_url(&self) -> String {
        format!(
            "{}/environments/{}/users",
            self.api_base_url.trim_end_matches('/'),
            self.environment_id
        )
    }
}
