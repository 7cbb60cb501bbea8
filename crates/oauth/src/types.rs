use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

/// Safety margin subtracted from every provider-issued lifetime.
pub const EXPIRY_MARGIN_MS: u64 = 10_000;

/// Client registration used by both grant types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub scope: Option<String>,
}

/// Which acquisition flow runs when no cached credential is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Authorization code with PKCE, delivered through the local callback.
    #[default]
    Pkce,
    /// Device authorization grant.
    Device,
}

/// Endpoints advertised by the provider's discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderEndpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub device_authorization_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

/// Successful reply from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
}

/// The single persisted credential.
///
/// Timestamps are absolute milliseconds since the Unix epoch with
/// [`EXPIRY_MARGIN_MS`] already subtracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(serialize_with = "serialize_secret")]
    pub access_token: Secret<String>,
    pub expires_at: u64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_at: Option<u64>,
}

fn deadline(now_ms: u64, lifetime_secs: u64) -> u64 {
    now_ms
        .saturating_add(lifetime_secs.saturating_mul(1000))
        .saturating_sub(EXPIRY_MARGIN_MS)
}

impl CredentialRecord {
    /// Build a record from a fresh token response.
    ///
    /// `previous` is the record being refreshed, if any: its refresh token
    /// survives when the provider does not rotate it.
    pub fn from_response(
        response: TokenResponse,
        now_ms: u64,
        previous: Option<&CredentialRecord>,
    ) -> Self {
        let expires_at = deadline(now_ms, response.expires_in.unwrap_or(0));
        let fresh_refresh_expiry = response.refresh_expires_in.map(|s| deadline(now_ms, s));

        let (refresh_token, refresh_expires_at) = match (response.refresh_token, previous) {
            (Some(token), _) => (Some(token), fresh_refresh_expiry),
            (None, Some(prev)) => (
                prev.refresh_token.clone(),
                fresh_refresh_expiry.or(prev.refresh_expires_at),
            ),
            (None, None) => (None, None),
        };

        Self {
            access_token: response.access_token,
            expires_at,
            refresh_token,
            refresh_expires_at,
        }
    }

    /// Strict: a token whose deadline equals `now_ms` is expired.
    pub fn access_valid(&self, now_ms: u64) -> bool {
        now_ms < self.expires_at
    }

    /// A refresh token with no recorded expiry is assumed usable.
    pub fn refresh_usable(&self, now_ms: u64) -> bool {
        self.refresh_token.is_some() && self.refresh_expires_at.is_none_or(|at| now_ms < at)
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

/// Serialize a secret by exposing it; used only for the on-disk cache.
pub fn serialize_secret<S: Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

pub fn serialize_option_secret<S: Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
