/// Errors surfaced by the token lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("token endpoint rejected the request: {error} ({description})")]
    TokenEndpoint { error: String, description: String },

    #[error("device code expired before the user completed authorization")]
    DeviceCodeExpired,

    #[error("resource API rejected the access token after re-authentication")]
    Unauthorized,

    #[error("resource API call failed: {0:#}")]
    Resource(anyhow::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn token_endpoint(error: impl Into<String>, description: Option<String>) -> Self {
        Self::TokenEndpoint {
            error: error.into(),
            description: description.unwrap_or_else(|| "no description".into()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure reported by a [`ResourceClient`](crate::resource::ResourceClient).
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// 401-class response; the token is no longer accepted.
    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}
