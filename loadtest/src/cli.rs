use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::http::HttpRemote;
use crate::{observability, runner};

/// Load tester for the product API.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// base URL of the product API, overrides the configured target
    #[argh(option, short = 't')]
    pub target: Option<String>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Healthcheck(HealthcheckCommand),
    Version(VersionCommand),
}

/// run all configured profiles against the target
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// probe the health endpoint of the target once
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "healthcheck")]
struct HealthcheckCommand {}

/// print the load tester version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(target) = args.target {
        config.target = target;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("loadtest-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    runtime.block_on(async move {
        match args.command {
            Command::Run(RunCommand {}) => run(config).await,
            Command::Healthcheck(HealthcheckCommand {}) => healthcheck(config).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

async fn run(config: Config) -> Result<()> {
    let profiles = config
        .build_profiles()
        .context("invalid profile configuration")?;
    for profile in &config.profiles {
        tracing::info!(%profile, "configured profile");
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, stopping clients");
                shutdown.cancel();
            }
        }
    });

    let report = runner::run(&config.target, profiles, config.duration, shutdown).await?;
    report.print();

    Ok(())
}

async fn healthcheck(config: Config) -> Result<()> {
    let profile = config.profiles.first().cloned().unwrap_or_default();
    let remote = HttpRemote::new(&config.target, profile.transport, profile.request_timeout)?;
    remote.healthcheck().await
}
