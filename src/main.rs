use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Extension, Router};
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use palisade::client::HttpAuthorizationClient;
use palisade::config::EnforcerConfig;
use palisade::enforcer::PolicyEnforcer;
use palisade::middleware::{self, AuthorizationContext};

/// Policy enforcement proxy for resource servers.
#[derive(Parser, Debug)]
#[command(version, about = "Palisade policy enforcer", long_about = None)]
struct Args {
    /// Path to the enforcer config file (.toml or .json)
    #[arg(short, long, default_value = "palisade.toml")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match EnforcerConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(path = %args.config.display(), error = %err, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let client = match HttpAuthorizationClient::new(&config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            tracing::error!(error = %err, "failed to build authorization client");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        authorization_server = %config.authorization_server_url,
        resource_server = %config.resource_server_id,
        paths = config.paths.len(),
        "enforcer configured"
    );

    let enforcer = Arc::new(PolicyEnforcer::new(config, client));

    let app = Router::new()
        .route("/", get(whoami))
        .fallback(whoami)
        .layer(from_fn_with_state(enforcer, middleware::enforce))
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(&args.listen).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(address = %args.listen, error = %err, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(address = %args.listen, "listening");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Placeholder upstream handler: reports the enforcement outcome for
/// any granted request.
async fn whoami(context: Option<Extension<AuthorizationContext>>) -> String {
    match context {
        Some(Extension(context)) => format!(
            "granted: {} permissions\n",
            context.permissions().len()
        ),
        None => "no enforcement context\n".to_string(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install signal handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received terminate signal, shutting down"),
    }
}
