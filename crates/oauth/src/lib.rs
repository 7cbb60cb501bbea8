pub mod callback_server;
pub mod device_flow;
pub mod discovery;
pub mod error;
pub mod flow;
pub mod lifecycle;
pub mod pkce;
pub mod resource;
pub mod storage;
pub mod types;

pub use {
    callback_server::CallbackServer,
    device_flow::{DeviceCodeResponse, PollState, PollStep},
    discovery::fetch_discovery,
    flow::{AuthorizationRequest, OAuthFlow},
    lifecycle::{Attempt, ManagerConfig, TokenManager, UserAgent},
    resource::{BearerGet, ResourceClient},
    storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore},
    types::{
        AuthMode, CredentialRecord, OAuthConfig, PkceChallenge, ProviderEndpoints, TokenResponse,
        serialize_option_secret, serialize_secret,
    },
};

pub use error::{CallError, Error, Result};
