use {anyhow::anyhow, async_trait::async_trait, tracing::debug};

use crate::error::CallError;

/// The downstream call made with the access token.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    type Output: Send;

    async fn call(&self, access_token: &str) -> Result<Self::Output, CallError>;
}

/// `GET` a JSON resource with a bearer token.
#[derive(Debug, Clone)]
pub struct BearerGet {
    client: reqwest::Client,
    url: String,
}

impl BearerGet {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ResourceClient for BearerGet {
    type Output = serde_json::Value;

    async fn call(&self, access_token: &str) -> Result<Self::Output, CallError> {
        debug!(url = %self.url, "calling resource API");
        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| CallError::Failed(e.into()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CallError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::Failed(anyhow!("{} returned {status}: {body}", self.url)));
        }

        resp.json()
            .await
            .map_err(|e| CallError::Failed(anyhow!("invalid JSON from {}: {e}", self.url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sends_bearer_header_and_parses_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/environments/env/users")
            .match_header("authorization", "Bearer T1")
            .with_status(200)
            .with_body(r#"{"_embedded":{"users":[]}}"#)
            .expect(1)
            .create_async()
            .await;

        let api = BearerGet::new(
            reqwest::Client::new(),
            format!("{}/v1/environments/env/users", server.url()),
        );
        let value = api.call("T1").await.unwrap();
        mock.assert_async().await;
        assert!(value["_embedded"]["users"].is_array());
    }

    #[tokio::test]
    async fn unauthorized_is_distinguished() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/r")
            .with_status(401)
            .create_async()
            .await;

        let api = BearerGet::new(reqwest::Client::new(), format!("{}/r", server.url()));
        assert!(matches!(api.call("T").await, Err(CallError::Unauthorized)));
    }

    #[tokio::test]
    async fn other_statuses_are_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/r")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let api = BearerGet::new(reqwest::Client::new(), format!("{}/r", server.url()));
        match api.call("T").await {
            Err(CallError::Failed(e)) => assert!(e.to_string().contains("403")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
