use tracing::debug;

use crate::{
    error::{Error, Result},
    types::ProviderEndpoints,
};

/// URL of the issuer's OpenID configuration document.
pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

/// Fetch the provider's endpoints. Every failure is a discovery failure.
pub async fn fetch_discovery(client: &reqwest::Client, issuer: &str) -> Result<ProviderEndpoints> {
    let url = discovery_url(issuer);
    debug!(url = %url, "fetching OIDC discovery document");

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Discovery(format!("{url}: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Discovery(format!("{url} returned {status}: {body}")));
    }

    resp.json::<ProviderEndpoints>()
        .await
        .map_err(|e| Error::Discovery(format!("invalid discovery document at {url}: {e}")))
}
