//! Device authorization grant (RFC 8628).

use std::time::Duration;

use {
    serde::Deserialize,
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    flow::{TokenReply, post_token_form},
    types::{OAuthConfig, TokenResponse},
};

pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Request a device code for `config.client_id`.
pub async fn request_device_code(
    client: &reqwest::Client,
    device_authorization_endpoint: &str,
    config: &OAuthConfig,
) -> Result<DeviceCodeResponse> {
    let mut form = vec![("client_id", config.client_id.as_str())];
    if let Some(scope) = config.scope.as_deref() {
        form.push(("scope", scope));
    }

    let resp = client
        .post(device_authorization_endpoint)
        .form(&form)
        .send()
        .await?;

    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(v) if v.get("error").is_some() => Error::token_endpoint(
                v["error"].as_str().unwrap_or("unknown_error"),
                v.get("error_description")
                    .and_then(|d| d.as_str())
                    .map(str::to_string),
            ),
            _ => Error::token_endpoint("invalid_response", Some(format!("HTTP {status}: {body}"))),
        });
    }

    let device: DeviceCodeResponse = serde_json::from_str(&body)?;
    debug!(
        interval = device.interval,
        expires_in = ?device.expires_in,
        "device code issued"
    );
    Ok(device)
}

/// Loop state carried between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    pub interval: Duration,
    pub attempts: u32,
}

#[derive(Debug)]
pub enum PollStep {
    Continue(PollState),
    Done(TokenResponse),
    Failed(Error),
}

impl PollState {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            attempts: 0,
        }
    }

    /// Fold one token-endpoint reply into the next step.
    ///
    /// `slow_down` widens the interval for every later poll; the interval
    /// never shrinks.
    pub fn advance(self, reply: TokenReply) -> PollStep {
        let attempts = self.attempts + 1;
        match reply {
            TokenReply::Tokens(tokens) => PollStep::Done(tokens),
            TokenReply::Rejected { error, description } => match error.as_str() {
                "authorization_pending" => PollStep::Continue(PollState {
                    interval: self.interval,
                    attempts,
                }),
                "slow_down" => PollStep::Continue(PollState {
                    interval: self.interval + SLOW_DOWN_INCREMENT,
                    attempts,
                }),
                "expired_token" => PollStep::Failed(Error::DeviceCodeExpired),
                "access_denied" => PollStep::Failed(Error::AuthorizationDenied(
                    description.unwrap_or_else(|| "access_denied".into()),
                )),
                _ => PollStep::Failed(Error::token_endpoint(error, description)),
            },
        }
    }
}

/// Sequential poller against the token endpoint.
pub struct DevicePoller<'a> {
    client: &'a reqwest::Client,
    token_endpoint: &'a str,
    client_id: &'a str,
}

impl<'a> DevicePoller<'a> {
    pub fn new(client: &'a reqwest::Client, token_endpoint: &'a str, client_id: &'a str) -> Self {
        Self {
            client,
            token_endpoint,
            client_id,
        }
    }

    /// Poll until the provider reports a terminal state. Returns the tokens
    /// together with the final loop state.
    pub async fn run(
        &self,
        device_code: &str,
        mut state: PollState,
    ) -> Result<(TokenResponse, PollState)> {
        loop {
            tokio::time::sleep(state.interval).await;

            let reply = post_token_form(self.client, self.token_endpoint, &[
                ("grant_type", DEVICE_CODE_GRANT),
                ("device_code", device_code),
                ("client_id", self.client_id),
            ])
            .await?;

            let polled = PollState {
                attempts: state.attempts + 1,
                ..state
            };
            match state.advance(reply) {
                PollStep::Continue(next) => {
                    if next.interval > state.interval {
                        info!(interval_secs = next.interval.as_secs(), "provider asked to slow down");
                    } else {
                        debug!(attempts = next.attempts, "authorization pending");
                    }
                    state = next;
                },
                PollStep::Done(tokens) => return Ok((tokens, polled)),
                PollStep::Failed(e) => return Err(e),
            }
        }
    }
}

/// Poll for the device-flow tokens, starting at `interval_secs`.
pub async fn poll_for_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    device_code: &str,
    interval_secs: u64,
) -> Result<TokenResponse> {
    DevicePoller::new(client, token_endpoint, client_id)
        .run(device_code, PollState::new(interval_secs))
        .await
        .map(|(tokens, _)| tokens)
}
