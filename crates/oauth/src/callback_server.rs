//! One-shot loopback listener for the authorization-code redirect.

use std::sync::{Arc, Mutex};

use {
    axum::{
        Router,
        extract::{Query, State, rejection::QueryRejection},
        http::StatusCode,
        response::Html,
        routing::get,
    },
    serde::Deserialize,
    tokio::{net::TcpListener, sync::oneshot},
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

pub const CALLBACK_PATH: &str = "/callback";

const COMPLETE_PAGE: &str = "<!doctype html><html><body>\
<p>Authentication complete. You can close this window.</p></body></html>";

const FAILED_PAGE: &str = "<!doctype html><html><body>\
<p>Authentication failed. Return to the terminal for details.</p></body></html>";

type ResultSlot = Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>;

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// A bound listener that accepts exactly one redirect.
///
/// Bind it before opening the authorization URL so the provider can never
/// redirect to a port nobody is listening on.
pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
}

impl CallbackServer {
    /// Bind the loopback listener. Port `0` picks a free port.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        debug!(port, "callback listener bound");
        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{CALLBACK_PATH}", self.port)
    }

    /// Serve until the first callback arrives, then shut down and return
    /// its authorization code.
    ///
    /// There is no timeout: the wait lasts until a redirect arrives or the
    /// process is interrupted.
    pub async fn wait_for_code(self) -> Result<String> {
        let (result_tx, result_rx) = oneshot::channel();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(result_tx)));
        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = result_rx.await;
        let _ = shutdown_tx.send(());
        match server.await {
            Ok(Ok(())) => debug!("callback listener stopped"),
            Ok(Err(e)) => warn!(error = %e, "callback listener exited with error"),
            Err(e) => warn!(error = %e, "callback listener task failed"),
        }

        outcome.map_err(|_| {
            Error::AuthorizationDenied("callback listener stopped before a redirect arrived".into())
        })?
    }
}

async fn handle_callback(
    State(slot): State<ResultSlot>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> (StatusCode, Html<&'static str>) {
    let Some(tx) = slot.lock().ok().and_then(|mut s| s.take()) else {
        return (StatusCode::GONE, Html(FAILED_PAGE));
    };

    // An unparseable first redirect still ends the wait.
    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            let _ = tx.send(Err(Error::AuthorizationDenied(format!(
                "malformed callback query: {}",
                rejection.body_text()
            ))));
            return (StatusCode::BAD_REQUEST, Html(FAILED_PAGE));
        },
    };

    let (outcome, response) = match params {
        CallbackParams {
            code: Some(code), ..
        } if !code.is_empty() => (Ok(code), (StatusCode::OK, Html(COMPLETE_PAGE))),
        CallbackParams {
            error: Some(error),
            error_description,
            ..
        } => {
            let reason = match error_description {
                Some(desc) => format!("{error}: {desc}"),
                None => error,
            };
            (
                Err(Error::AuthorizationDenied(reason)),
                (StatusCode::OK, Html(FAILED_PAGE)),
            )
        },
        _ => (
            Err(Error::AuthorizationDenied(
                "no authorization code in callback".into(),
            )),
            (StatusCode::BAD_REQUEST, Html(FAILED_PAGE)),
        ),
    };

    let _ = tx.send(outcome);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hit(port: u16, query: &str) -> (u16, String) {
        let resp = reqwest::get(format!("http://127.0.0.1:{port}{CALLBACK_PATH}{query}"))
            .await
            .unwrap();
        (resp.status().as_u16(), resp.text().await.unwrap())
    }

    #[tokio::test]
    async fn captures_code_and_stops_listening() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();
        assert_eq!(server.redirect_uri(), format!("http://localhost:{port}/callback"));

        let waiter = tokio::spawn(server.wait_for_code());
        let (status, body) = hit(port, "?code=abc&state=ignored").await;
        assert_eq!(status, 200);
        assert!(body.contains("Authentication complete"));

        assert_eq!(waiter.await.unwrap().unwrap(), "abc");

        let second = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}{CALLBACK_PATH}?code=again"))
            .send()
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn missing_code_fails_instead_of_hanging() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();
        let waiter = tokio::spawn(server.wait_for_code());

        let (status, _) = hit(port, "").await;
        assert_eq!(status, 400);
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied(_)));
    }

    #[tokio::test]
    async fn malformed_query_fails_instead_of_hanging() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();
        let waiter = tokio::spawn(server.wait_for_code());

        let (status, body) = hit(port, "?code=a&code=b").await;
        assert_eq!(status, 400);
        assert!(body.contains("Authentication failed"));

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
            .await
            .expect("listener kept waiting after a malformed redirect")
            .unwrap();
        match outcome.unwrap_err() {
            Error::AuthorizationDenied(reason) => {
                assert!(reason.starts_with("malformed callback query"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_error_is_reported_verbatim() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();
        let waiter = tokio::spawn(server.wait_for_code());

        hit(port, "?error=access_denied&error_description=User+cancelled").await;
        match waiter.await.unwrap().unwrap_err() {
            Error::AuthorizationDenied(reason) => {
                assert_eq!(reason, "access_denied: User cancelled");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_paths_are_not_callbacks() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();
        let waiter = tokio::spawn(server.wait_for_code());

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/favicon.ico"))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 404);

        hit(port, "?code=xyz").await;
        assert_eq!(waiter.await.unwrap().unwrap(), "xyz");
    }
}
