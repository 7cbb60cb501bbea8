//! Decides, per run, whether to use the cached token, refresh it, or
//! acquire a new one, and calls the resource with the result.

use {
    tokio::sync::OnceCell,
    tracing::{debug, info, warn},
};

use crate::{
    callback_server::CallbackServer,
    device_flow::{DeviceCodeResponse, poll_for_token, request_device_code},
    discovery::fetch_discovery,
    error::{CallError, Error, Result},
    flow::OAuthFlow,
    resource::ResourceClient,
    storage::CredentialStore,
    types::{AuthMode, CredentialRecord, OAuthConfig, ProviderEndpoints, TokenResponse, now_ms},
};

/// Operator-facing side effects of the acquisition flows.
pub trait UserAgent: Send + Sync {
    /// Send the operator to the authorization URL.
    fn open_url(&self, url: &str);
    fn show_device_code(&self, device: &DeviceCodeResponse);
}

/// Re-authentication budget for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    /// The single re-authentication has been spent.
    Retried,
}

enum CallOutcome<T> {
    Done(T),
    Reauthenticate,
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub issuer: String,
    pub oauth: OAuthConfig,
    pub redirect_port: u16,
    pub mode: AuthMode,
}

pub struct TokenManager<S, U> {
    client: reqwest::Client,
    config: ManagerConfig,
    store: S,
    agent: U,
    endpoints: OnceCell<ProviderEndpoints>,
}

impl<S: CredentialStore, U: UserAgent> TokenManager<S, U> {
    pub fn new(client: reqwest::Client, config: ManagerConfig, store: S, agent: U) -> Self {
        Self {
            client,
            config,
            store,
            agent,
            endpoints: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Call `resource` with a usable access token, acquiring one if needed.
    ///
    /// A 401 from the resource triggers at most one re-authentication per
    /// run; a second 401 is fatal.
    pub async fn run<R: ResourceClient>(&self, resource: &R) -> Result<R::Output> {
        let mut attempt = Attempt::First;

        loop {
            let cached = self.store.read();
            let now = now_ms();

            if let Some(record) = cached.as_ref().filter(|r| r.access_valid(now)) {
                debug!("using cached access token");
                match self.call(resource, record, &mut attempt).await? {
                    CallOutcome::Done(out) => return Ok(out),
                    CallOutcome::Reauthenticate => continue,
                }
            }

            if let Some(previous) = cached.filter(|r| r.refresh_usable(now)) {
                let endpoints = self.endpoints().await?;
                match self.refresh(endpoints, &previous).await {
                    Ok(tokens) => {
                        let record = CredentialRecord::from_response(tokens, now_ms(), Some(&previous));
                        self.store.write(&record)?;
                        info!("access token refreshed");
                        match self.call(resource, &record, &mut attempt).await? {
                            CallOutcome::Done(out) => return Ok(out),
                            CallOutcome::Reauthenticate => continue,
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "refresh failed, re-authenticating");
                        self.store.clear()?;
                    },
                }
            }

            let record = self.acquire().await?;
            // A freshly acquired token gets no second chance.
            attempt = Attempt::Retried;
            return match self.call(resource, &record, &mut attempt).await? {
                CallOutcome::Done(out) => Ok(out),
                CallOutcome::Reauthenticate => Err(Error::Unauthorized),
            };
        }
    }

    async fn call<R: ResourceClient>(
        &self,
        resource: &R,
        record: &CredentialRecord,
        attempt: &mut Attempt,
    ) -> Result<CallOutcome<R::Output>> {
        match resource.call(record.access_token()).await {
            Ok(out) => Ok(CallOutcome::Done(out)),
            Err(CallError::Unauthorized) => {
                self.store.clear()?;
                match attempt {
                    Attempt::First => {
                        info!("resource API rejected the access token, re-authenticating");
                        *attempt = Attempt::Retried;
                        Ok(CallOutcome::Reauthenticate)
                    },
                    Attempt::Retried => Err(Error::Unauthorized),
                }
            },
            Err(CallError::Failed(e)) => Err(Error::Resource(e)),
        }
    }

    async fn endpoints(&self) -> Result<&ProviderEndpoints> {
        self.endpoints
            .get_or_try_init(|| fetch_discovery(&self.client, &self.config.issuer))
            .await
    }

    fn flow(&self, endpoints: &ProviderEndpoints) -> OAuthFlow {
        OAuthFlow::new(
            self.client.clone(),
            self.config.oauth.clone(),
            endpoints.clone(),
        )
    }

    async fn refresh(
        &self,
        endpoints: &ProviderEndpoints,
        previous: &CredentialRecord,
    ) -> Result<TokenResponse> {
        let Some(refresh_token) = previous.refresh_token.as_ref() else {
            return Err(Error::token_endpoint(
                "invalid_grant",
                Some("no refresh token cached".into()),
            ));
        };
        self.flow(endpoints).refresh(refresh_token).await
    }

    /// Run the configured acquisition flow and cache its result.
    async fn acquire(&self) -> Result<CredentialRecord> {
        let endpoints = self.endpoints().await?;
        let tokens = match self.config.mode {
            AuthMode::Pkce => self.authorization_code(endpoints).await?,
            AuthMode::Device => self.device_authorization(endpoints).await?,
        };

        let record = CredentialRecord::from_response(tokens, now_ms(), None);
        self.store.write(&record)?;
        info!(mode = ?self.config.mode, "new credential cached");
        Ok(record)
    }

    async fn authorization_code(&self, endpoints: &ProviderEndpoints) -> Result<TokenResponse> {
        let server = CallbackServer::bind(self.config.redirect_port).await?;
        let flow = self.flow(endpoints);
        let request = flow.start(&server.redirect_uri())?;

        info!(redirect_uri = %request.redirect_uri, "waiting for authorization callback");
        self.agent.open_url(&request.url);
        let code = server.wait_for_code().await?;

        flow.exchange(&code, request).await
    }

    async fn device_authorization(&self, endpoints: &ProviderEndpoints) -> Result<TokenResponse> {
        let device_endpoint = endpoints.device_authorization_endpoint.as_deref().ok_or_else(|| {
            Error::Discovery("provider does not advertise a device_authorization_endpoint".into())
        })?;

        let device = request_device_code(&self.client, device_endpoint, &self.config.oauth).await?;
        self.agent.show_device_code(&device);

        poll_for_token(
            &self.client,
            &endpoints.token_endpoint,
            &self.config.oauth.client_id,
            &device.device_code,
            device.interval,
        )
        .await
    }
}
