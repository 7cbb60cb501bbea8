mod auth_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "oidcli", about = "oidcli — call an OIDC-protected API with cached tokens")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Sign in with the device authorization grant instead of the browser.
    #[arg(long, global = true, default_value_t = false)]
    device: bool,

    /// Config file (defaults to ./oidcli.toml or ~/.config/oidcli/).
    #[arg(long, global = true, env = "OIDCLI_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand, Clone, Copy, Default)]
enum Commands {
    /// List the users of the configured environment (default).
    #[default]
    Users,
    /// Show the state of the token cache.
    Status,
    /// Delete the token cache.
    Logout,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // Logs go to stderr; stdout carries the API response.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "oidcli starting");

    let config = oidcli_config::load_with_env(cli.config.as_deref())?;
    let mode = if cli.device {
        oidcli_oauth::AuthMode::Device
    } else {
        oidcli_oauth::AuthMode::Pkce
    };

    match cli.command.unwrap_or_default() {
        Commands::Users => auth_commands::users(config, mode).await,
        Commands::Status => auth_commands::status(&config),
        Commands::Logout => auth_commands::logout(&config),
    }
}
