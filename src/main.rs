//! appauth - OAuth 2.0 / OpenID Connect client for the terminal
//!
#![doc = "appauth - OAuth 2.0 / OpenID Connect client for the terminal"]
#![doc = "Main entry point for the appauth command line application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use appauth::cli::{Cli, Commands};
use appauth::commands;
use appauth::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config = Config::load(&cli)?;

    // Execute command
    match cli.command {
        Commands::Discover { json, .. } => {
            tracing::info!("Resolving service configuration");
            commands::discover::run_discover(&config, json).await?;
            Ok(())
        }
        Commands::Authorize { print_token, .. } => {
            tracing::info!("Starting authorization for profile: {}", cli.profile);
            commands::authorize::run_authorize(config, &cli.profile, print_token).await?;
            Ok(())
        }
        Commands::Refresh {
            refresh_token,
            print_token,
            ..
        } => {
            tracing::info!("Refreshing token for profile: {}", cli.profile);
            commands::refresh::run_refresh(config, &cli.profile, refresh_token, print_token)
                .await?;
            Ok(())
        }
        Commands::Logout { local_only, .. } => {
            tracing::info!("Logging out profile: {}", cli.profile);
            commands::logout::run_logout(config, &cli.profile, local_only).await?;
            Ok(())
        }
        Commands::Status => {
            commands::status::show_status(&cli.profile)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` takes precedence; otherwise `appauth=info`, or
/// `appauth=debug` with `--verbose`.  Logs go to stderr so that stdout
/// carries only command output.
fn init_tracing(verbose: bool, json_logs: bool) {
    let default_directive = if verbose { "appauth=debug" } else { "appauth=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
