use {
    anyhow::Result,
    oidcli_config::OidcConfig,
    oidcli_oauth::{
        AuthMode, BearerGet, CredentialRecord, CredentialStore, DeviceCodeResponse,
        FileCredentialStore, ManagerConfig, OAuthConfig, TokenManager, UserAgent,
        types::now_ms,
    },
    tracing::info,
};

/// Prompts on stderr, browser through the desktop opener.
struct TerminalAgent;

impl UserAgent for TerminalAgent {
    fn open_url(&self, url: &str) {
        eprintln!("Opening browser for authentication...");
        if open::that(url).is_err() {
            eprintln!("Could not open browser. Please visit:\n{url}");
        }
    }

    fn show_device_code(&self, device: &DeviceCodeResponse) {
        eprintln!("To sign in, visit {}", device.verification_uri);
        eprintln!("and enter the code: {}", device.user_code);
        if let Some(complete) = &device.verification_uri_complete {
            eprintln!("Or open this link directly: {complete}");
            if open::that(complete).is_err() {
                info!("could not open browser for device verification");
            }
        }
        eprintln!("Waiting for authorization...");
    }
}

pub async fn users(config: OidcConfig, mode: AuthMode) -> Result<()> {
    let settings = config.validate()?;
    let client = reqwest::Client::new();

    let manager = TokenManager::new(
        client.clone(),
        ManagerConfig {
            issuer: settings.issuer.clone(),
            oauth: OAuthConfig {
                client_id: settings.client_id.clone(),
                scope: settings.scope.clone(),
            },
            redirect_port: settings.redirect_port,
            mode,
        },
        FileCredentialStore::with_path(settings.token_cache.clone()),
        TerminalAgent,
    );
    let api = BearerGet::new(client, settings.users_url());

    let response = manager.run(&api).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn status(config: &OidcConfig) -> Result<()> {
    let store = FileCredentialStore::with_path(config.token_cache_path());
    let Some(record) = store.read() else {
        println!("No cached credential ({}).", store.path().display());
        return Ok(());
    };

    for line in describe(&record, now_ms()) {
        println!("{line}");
    }
    Ok(())
}

pub fn logout(config: &OidcConfig) -> Result<()> {
    let store = FileCredentialStore::with_path(config.token_cache_path());
    store.clear()?;
    println!("Token cache cleared ({}).", store.path().display());
    Ok(())
}

fn remaining(deadline_ms: u64, now_ms: u64) -> String {
    if deadline_ms <= now_ms {
        return "expired".to_string();
    }
    let secs = (deadline_ms - now_ms) / 1000;
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    format!("valid ({hours}h {mins}m remaining)")
}

fn describe(record: &CredentialRecord, now_ms: u64) -> Vec<String> {
    let mut lines = vec![format!(
        "access token [{}]",
        remaining(record.expires_at, now_ms)
    )];
    let refresh = match (&record.refresh_token, record.refresh_expires_at) {
        (None, _) => "none".to_string(),
        (Some(_), None) => "present (no expiry)".to_string(),
        (Some(_), Some(at)) => remaining(at, now_ms),
    };
    lines.push(format!("refresh token [{refresh}]"));
    lines
}

#[cfg(test)]
mod tests {
    use {super::*, oidcli_oauth::types::TokenResponse};

    fn record(expires_in: u64, refresh: Option<&str>, refresh_expires_in: Option<u64>) -> CredentialRecord {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "T",
            "expires_in": expires_in,
            "refresh_token": refresh,
            "refresh_expires_in": refresh_expires_in,
        }))
        .unwrap();
        CredentialRecord::from_response(response, 0, None)
    }

    #[test]
    fn remaining_counts_down_and_expires_at_deadline() {
        assert_eq!(remaining(3_600_000 + 120_000, 0), "valid (1h 2m remaining)");
        assert_eq!(remaining(5_000, 5_000), "expired");
    }

    #[test]
    fn describe_reports_both_tokens() {
        let lines = describe(&record(7210, Some("R"), None), 0);
        assert_eq!(lines[0], "access token [valid (2h 0m remaining)]");
        assert_eq!(lines[1], "refresh token [present (no expiry)]");

        let lines = describe(&record(60, None, None), 3_600_000);
        assert_eq!(lines[0], "access token [expired]");
        assert_eq!(lines[1], "refresh token [none]");
    }

    #[test]
    fn logout_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = OidcConfig {
            token_cache: Some(dir.path().join("cache.json")),
            ..Default::default()
        };
        std::fs::write(dir.path().join("cache.json"), "{}").unwrap();
        logout(&config).unwrap();
        logout(&config).unwrap();
        assert!(!dir.path().join("cache.json").exists());
    }
}
