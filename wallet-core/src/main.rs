//! Headless host for the wallet core.
//!
//! Spawns the daemon-hosting process, drives its event stream and either runs
//! until it exits or issues a single request once the daemon is ready.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use linda_wallet_lib::{
    Alert, HostProcess, ProcessTransport, PromptChoice, Prompter, RpcMethod, RpcService,
    WalletContext,
};

#[derive(Parser, Debug)]
#[clap(
    name = "linda-wallet",
    version,
    about = "Drive a Linda daemon through its host process."
)]
struct Cli {
    /// Directory holding wallet.config. Defaults to ~/.linda-wallet.
    #[clap(long)]
    config_dir: Option<PathBuf>,

    /// Host command overriding the configured one.
    #[clap(long)]
    host: Option<String>,

    /// Argument for the host command. Repeatable; replaces configured args.
    #[clap(long = "host-arg", allow_hyphen_values = true)]
    host_args: Vec<String>,

    /// Seconds to wait for the daemon to report readiness.
    #[clap(long, default_value_t = 120)]
    ready_timeout: u64,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run until the host exits or the user chooses to quit.
    Run,

    /// Send one request once the daemon is ready and print the result.
    Call {
        /// Request tag, e.g. GETWALLET or get-accounts.
        method: String,

        /// Positional params as a JSON array.
        #[clap(default_value = "[]")]
        params: String,
    },
}

/// Asks restart-or-exit questions on the terminal.
struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn alert(&self, alert: &Alert) -> PromptChoice {
        eprintln!("{}: {}", alert.title_key, alert.body_key);
        eprintln!(
            "[r] {}   [q] {}",
            alert.primary_key, alert.secondary_key
        );
        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(_) if line.trim().eq_ignore_ascii_case("q") => PromptChoice::Secondary,
            Ok(0) | Err(_) => PromptChoice::Secondary,
            Ok(_) => PromptChoice::Primary,
        }
    }
}

struct ExitHost;

impl HostProcess for ExitHost {
    fn quit(&self) {
        log::info!("Exiting on user request");
        std::process::exit(0);
    }
}

fn default_config_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".linda-wallet")
}

async fn wait_until_ready(service: &RpcService, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    while !service.is_ready() {
        if started.elapsed() > timeout {
            bail!(
                "daemon not ready after {}s ({})",
                timeout.as_secs(),
                service.lifecycle().warmup_message()
            );
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Installed before the config is read so first-run messages are kept.
    // Without RUST_LOG the level starts at info and then follows the config.
    let rust_log_set = std::env::var_os(env_logger::DEFAULT_FILTER_ENV).is_some();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    if !rust_log_set {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);
    let context = WalletContext::initialize(config_dir.clone())
        .with_context(|| format!("loading config from {}", config_dir.display()))?;
    let config = context.config().clone();
    if !rust_log_set {
        log::set_max_level(config.level_filter());
    }
    log::info!(
        "Using config {} ({})",
        context.config_store().path().display(),
        context.environment()
    );

    let host_command = cli
        .host
        .clone()
        .unwrap_or_else(|| config.daemon.host_command.clone());
    let host_args = if cli.host_args.is_empty() {
        config.daemon.host_args.clone()
    } else {
        cli.host_args.clone()
    };

    let (transport, events) = ProcessTransport::spawn(&host_command, &host_args)?;
    let service = Arc::new(RpcService::new(
        Arc::new(transport),
        Arc::new(TerminalPrompter),
        Arc::new(ExitHost),
        &config,
    )?);

    let event_loop = {
        let service = service.clone();
        tokio::spawn(async move { service.run(events).await })
    };

    match cli.command {
        Commands::Run => {
            event_loop.await?;
        }
        Commands::Call { method, params } => {
            let method: RpcMethod = method.parse()?;
            let params: Vec<Value> =
                serde_json::from_str(&params).context("params must be a JSON array")?;
            wait_until_ready(&service, Duration::from_secs(cli.ready_timeout)).await?;
            let result = service.request_data(method, params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            service.stop_client();
        }
    }

    Ok(())
}
