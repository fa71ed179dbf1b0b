use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use apk_harden::notify::{BroadcastNotifier, CallbackNotifier, CompositeNotifier, EventBus};
use apk_harden::pipeline::{JobRequest, Orchestrator};
use apk_harden::server::HardenServer;
use apk_harden::tools::ProcessRunner;
use apk_harden::HardenConfig;

/// APK hardening service
#[derive(Parser, Debug)]
#[command(name = "apk-harden")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "APK_HARDEN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the intake server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Harden one archive and print the result payload
    Run(RunArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[arg(long)]
    apk_url: String,
    #[arg(long)]
    callback_url: String,
    #[arg(long)]
    id: String,
    #[arg(long)]
    domain: String,
    #[arg(long)]
    file_name: String,
    /// preserve, random or explicit
    #[arg(long, default_value = "preserve")]
    naming: String,
    #[arg(long)]
    package_name: Option<String>,
    #[arg(long)]
    version_code: Option<String>,
    #[arg(long)]
    app_name: Option<String>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print a sample configuration
    Sample,
    /// Check a configuration file
    Validate { path: PathBuf },
}

impl From<RunArgs> for JobRequest {
    fn from(args: RunArgs) -> Self {
        JobRequest {
            apk_url: Some(args.apk_url),
            callback_url: Some(args.callback_url),
            id: Some(args.id),
            domain: Some(args.domain),
            file_name: Some(args.file_name),
            naming: Some(args.naming),
            package_name: args.package_name,
            version_code: args.version_code,
            app_name: args.app_name,
            api_key: None,
        }
    }
}

fn orchestrator(config: &HardenConfig, events: &EventBus) -> Result<Orchestrator> {
    let callback = CallbackNotifier::new(Duration::from_secs(config.pipeline.callback_timeout_secs))
        .context("failed to build callback client")?;
    let notifier = CompositeNotifier::new()
        .with_sink(Arc::new(callback))
        .with_sink(Arc::new(BroadcastNotifier::new(events.clone())));
    Ok(Orchestrator::from_config(
        config,
        Arc::new(ProcessRunner::new()),
        Arc::new(notifier),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Config { action: ConfigAction::Sample } => {
            println!("{}", HardenConfig::generate_sample_config());
        }
        Command::Config {
            action: ConfigAction::Validate { path },
        } => {
            let config = HardenConfig::load_from_file(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            match config.validate() {
                Ok(()) => println!("{} is valid", path.display()),
                Err(errors) => {
                    for error in &errors {
                        eprintln!("- {}", error);
                    }
                    anyhow::bail!("{} has {} problems", path.display(), errors.len());
                }
            }
        }
        Command::Serve { bind } => {
            let mut config = HardenConfig::load(args.config.as_deref()).context("invalid configuration")?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            log::info!("apk-harden v{}", env!("CARGO_PKG_VERSION"));

            let events = EventBus::default();
            let orchestrator = orchestrator(&config, &events)?;
            HardenServer::new(&config, orchestrator, events).run().await?;
        }
        Command::Run(run) => {
            let config = HardenConfig::load(args.config.as_deref()).context("invalid configuration")?;
            let job = JobRequest::from(run).validate()?;
            let events = EventBus::default();
            let payload = orchestrator(&config, &events)?.execute(job).await;

            println!("{}", serde_json::to_string_pretty(&payload)?);
            if !payload.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
