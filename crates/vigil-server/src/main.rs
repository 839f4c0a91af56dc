use std::env;

use vigil_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use vigil_server::{GuardPipeline, observability};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From VIGIL_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (vigil.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (VIGIL_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    observability::init_tracing_with(&cfg.logging);
    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    if let Err(e) = run(cfg).await {
        tracing::error!(error = %e, "Guard service failed");
        std::process::exit(1);
    }
}

async fn run(cfg: vigil_server::AppConfig) -> anyhow::Result<()> {
    let pipeline = GuardPipeline::from_config(&cfg)?;
    tracing::info!(
        stages = ?pipeline.stage_names(),
        max_sessions = cfg.guard.session.max_concurrent_sessions,
        session_ttl = ?cfg.guard.session.session_ttl,
        checksum = cfg.audit.checksum_algorithm.as_str(),
        "Guard pipeline ready"
    );

    let sweeper = pipeline.spawn_expiry_sweeper();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    if let Some(handle) = sweeper {
        handle.abort();
    }
    pipeline.shutdown().await;
    Ok(())
}

fn resolve_config_path() -> (String, ConfigSource) {
    // 1. Check CLI: --config <path>
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (path, ConfigSource::CliArgument);
        }
    }

    // 2. Check environment variable
    if let Ok(path) = env::var("VIGIL_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
