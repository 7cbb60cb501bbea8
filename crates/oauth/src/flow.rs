use {secrecy::ExposeSecret, tracing::debug};

use crate::{
    error::{Error, Result},
    pkce::generate_pkce,
    types::{OAuthConfig, PkceChallenge, ProviderEndpoints, TokenResponse},
};

pub const DEFAULT_SCOPE: &str = "openid profile email";

/// A pending authorization-code request. Holds the PKCE verifier until the
/// code is exchanged.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub redirect_uri: String,
    pub pkce: PkceChallenge,
}

/// Classified reply from the token endpoint.
#[derive(Debug)]
pub enum TokenReply {
    Tokens(TokenResponse),
    Rejected {
        error: String,
        description: Option<String>,
    },
}

impl TokenReply {
    /// Treat any rejection as fatal.
    pub fn into_tokens(self) -> Result<TokenResponse> {
        match self {
            Self::Tokens(tokens) => Ok(tokens),
            Self::Rejected { error, description } => Err(Error::token_endpoint(error, description)),
        }
    }
}

/// POST a form to a token-family endpoint and classify the body.
///
/// The body decides, not the status: providers answer device-flow
/// polling with 400 and an `error` field.
pub async fn post_token_form(
    client: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
) -> Result<TokenReply> {
    let resp = client.post(url).form(form).send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    classify_token_body(status, &body)
}

fn classify_token_body(status: reqwest::StatusCode, body: &str) -> Result<TokenReply> {
    let value: serde_json::Value = serde_json::from_str(body).map_err(|_| {
        Error::token_endpoint("invalid_response", Some(format!("HTTP {status}: {body}")))
    })?;

    if value.get("access_token").is_some() {
        return Ok(TokenReply::Tokens(serde_json::from_value(value)?));
    }

    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        let description = value
            .get("error_description")
            .and_then(|d| d.as_str())
            .map(str::to_string);
        return Ok(TokenReply::Rejected {
            error: error.to_string(),
            description,
        });
    }

    Err(Error::token_endpoint(
        "invalid_response",
        Some(format!("HTTP {status} without access_token or error")),
    ))
}

/// Authorization-code (PKCE) and refresh grants against one provider.
pub struct OAuthFlow {
    client: reqwest::Client,
    config: OAuthConfig,
    endpoints: ProviderEndpoints,
}

impl OAuthFlow {
    pub fn new(client: reqwest::Client, config: OAuthConfig, endpoints: ProviderEndpoints) -> Self {
        Self {
            client,
            config,
            endpoints,
        }
    }

    fn scope(&self) -> &str {
        self.config.scope.as_deref().unwrap_or(DEFAULT_SCOPE)
    }

    /// Generate a PKCE pair and build the authorization URL.
    pub fn start(&self, redirect_uri: &str) -> Result<AuthorizationRequest> {
        let pkce = generate_pkce();
        let url = url::Url::parse_with_params(&self.endpoints.authorization_endpoint, &[
            ("client_id", self.config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", self.scope()),
            ("code_challenge", pkce.challenge.as_str()),
            ("code_challenge_method", "S256"),
        ])
        .map_err(|e| {
            Error::Discovery(format!(
                "invalid authorization_endpoint {}: {e}",
                self.endpoints.authorization_endpoint
            ))
        })?;

        Ok(AuthorizationRequest {
            url: url.into(),
            redirect_uri: redirect_uri.to_string(),
            pkce,
        })
    }

    /// Exchange an authorization code, consuming the request and its verifier.
    pub async fn exchange(&self, code: &str, request: AuthorizationRequest) -> Result<TokenResponse> {
        debug!("exchanging authorization code");
        post_token_form(&self.client, &self.endpoints.token_endpoint, &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", request.pkce.verifier.as_str()),
        ])
        .await?
        .into_tokens()
    }

    pub async fn refresh(&self, refresh_token: &secrecy::Secret<String>) -> Result<TokenResponse> {
        debug!("refreshing access token");
        post_token_form(&self.client, &self.endpoints.token_endpoint, &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret().as_str()),
            ("client_id", self.config.client_id.as_str()),
        ])
        .await?
        .into_tokens()
    }
}
