//! Onyxia demo host
//!
//! Boots the application core over the in-memory backend, lets the polling
//! loops run for a while and prints the resulting view models. Also exposes
//! the validation engine and the configuration loader for manual checks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use onyxia_app::{AppConfig, AppCore};
use onyxia_core::{validate, SchemaNode, ValidationResult};
use onyxia_testkit::MockOnyxiaApi;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onyxia-host")]
#[command(about = "Onyxia - headless application core demo host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the core against the demo backend and print the views
    Run {
        /// Seconds to let the polling loops run
        #[arg(short, long, default_value = "3")]
        seconds: u64,

        /// Project to switch to after bootstrap
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Validate a JSON value against a schema file
    Validate {
        /// Schema file (JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Value to check, as JSON
        value: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let default_level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run { seconds, project } => run(config, seconds, project.as_deref()).await?,
        Commands::Validate { schema, value } => check_value(&schema, &value)?,
        Commands::Config => println!("{config}"),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    config.merge_with_env().context("applying ONYXIA_* overrides")?;
    config.validate().context("validating config")?;
    Ok(config)
}

async fn run(config: AppConfig, seconds: u64, project: Option<&str>) -> Result<()> {
    let api = MockOnyxiaApi::demo();
    let core = AppCore::new(config, api.clone())?;
    core.bootstrap().await?;
    if let Some(project) = project {
        core.project_management().change_project(project)?;
    }
    tracing::info!(
        project = %core.project_management().current_project()?.id,
        "Core bootstrapped"
    );

    let quotas = core.view_quotas().set_active();
    let services = core.service_management().set_active();
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let services_view = core.service_management().services()?;
    println!("{}", serde_json::to_string_pretty(&*services_view)?);
    if core.view_quotas().is_available() {
        let quotas_view = core.view_quotas().quotas()?;
        println!("{}", serde_json::to_string_pretty(&*quotas_view)?);
    }

    quotas.set_inactive();
    services.set_inactive();
    core.shutdown();
    tracing::info!(backend_calls = api.total_calls(), "Done");
    Ok(())
}

fn check_value(schema_path: &Path, value: &str) -> Result<()> {
    let schema_text = std::fs::read_to_string(schema_path)
        .with_context(|| format!("reading schema {}", schema_path.display()))?;
    let schema: SchemaNode = serde_json::from_str(&schema_text).context("parsing schema")?;
    let value: serde_json::Value = serde_json::from_str(value).context("parsing value")?;

    match validate(&schema, &value) {
        ValidationResult::Valid => println!("valid"),
        ValidationResult::Invalid {
            best_approximation: Some(approximation),
        } => println!("invalid; did you mean {approximation}?"),
        ValidationResult::Invalid {
            best_approximation: None,
        } => println!("invalid"),
    }
    Ok(())
}
