use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::OidcConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["oidcli.toml", "oidcli.yaml", "oidcli.yml", "oidcli.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<OidcConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path).with_context(|| format!("failed to parse {}", path.display()))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./oidcli.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/oidcli/oidcli.{toml,yaml,yml,json}` (user-global)
///
/// Returns `OidcConfig::default()` if no usable config file is found.
pub fn discover_and_load() -> OidcConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found");
        return OidcConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, ignoring file");
        OidcConfig::default()
    })
}

/// File layer (explicit path or discovered) overlaid with the environment.
///
/// An explicitly named file must load; a discovered one may be skipped.
pub fn load_with_env(explicit: Option<&Path>) -> anyhow::Result<OidcConfig> {
    let file = match explicit {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    let env = env_layer(|name| std::env::var(name).ok())?;
    Ok(file.merge(env))
}

/// Build a config layer from `OIDC_*` variables.
pub fn env_layer(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<OidcConfig> {
    let get = |name: &str| {
        lookup(name)
            .map(|v| substitute_env(v.trim()))
            .filter(|v| !v.is_empty())
    };

    let redirect_port = get("OIDC_REDIRECT_PORT")
        .map(|p| {
            p.parse::<u16>()
                .with_context(|| format!("OIDC_REDIRECT_PORT is not a valid port: {p}"))
        })
        .transpose()?;

    Ok(OidcConfig {
        client_id: get("OIDC_CLIENT_ID"),
        issuer: get("OIDC_ISSUER"),
        redirect_port,
        scope: get("OIDC_SCOPE"),
        environment_id: get("OIDC_ENV_ID"),
        api_base_url: get("OIDC_API_BASE_URL"),
        token_cache: get("OIDC_TOKEN_CACHE").map(PathBuf::from),
    })
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// `~/.config/oidcli/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("oidcli"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<OidcConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
