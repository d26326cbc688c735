//! func-runtime CLI entry point.
//!
//! Loads the runtime context, registers the sample functions and serves
//! them over HTTP or as an async binding consumer.

mod functions;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use func_runtime_common::ConfigFile;
use func_runtime_server::Framework;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Function invocation runtime.
#[derive(Debug, Parser)]
#[command(name = "func-runtime", version, about)]
struct Args {
    /// TOML config file with [server], [transport] and [function] sections.
    #[arg(short, long, env = "FUNC_RUNTIME_CONFIG")]
    config: Option<PathBuf>,

    /// Serve only this function.
    #[arg(short, long, env = "FUNCTION_TARGET")]
    target: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,func_runtime=debug,func_runtime_core=debug,func_runtime_server=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting func-runtime");

    let config = match &args.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => ConfigFile::default(),
    };

    let mut framework = Framework::from_config(&config).context("Failed to load runtime context")?;
    functions::register_all(&mut framework).context("Failed to register functions")?;

    info!(
        runtime = %framework.runtime().runtime(),
        port = framework.runtime().port(),
        functions = ?framework.registry().list_names(),
        "Configuration loaded"
    );

    framework.run(args.target.as_deref()).await?;

    Ok(())
}
