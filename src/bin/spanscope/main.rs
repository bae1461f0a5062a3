// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use spanscope::init::agent::Agent;
use spanscope::init::args::AgentRun;
use spanscope::listener::Listener;
use std::process::ExitCode;
use std::time::Duration;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

// The agent enforces its own shorter shutdown timeouts
const AGENT_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Run the span server
    Start(Box<AgentRun>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "spanscope")]
#[command(bin_name = "spanscope")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "SPANSCOPE_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version())
        }
        Some(Commands::Start(agent)) => {
            // Bind before starting the runtime so a busy port fails immediately
            let listener = match Listener::bind(agent.endpoint) {
                Ok(l) => l,
                Err(e) => {
                    eprintln!("ERROR: {}", e);
                    return ExitCode::from(1);
                }
            };

            let _guard = match setup_logging(&opt.log_format) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("ERROR: failed to setup logging: {}", e);
                    return ExitCode::from(1);
                }
            };

            if let Err(e) = run_agent(agent, listener) {
                error!(error = e, "Failed to run agent.");
                return ExitCode::from(1);
            }
        }
        None => {
            // unreachable, a subcommand is required
            eprintln!("ERROR: Must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_agent(agent_args: Box<AgentRun>, listener: Listener) -> Result<(), BoxError> {
    let cancel_token = CancellationToken::new();
    let agent = Agent::new(agent_args, listener);

    let mut agent_hnd = {
        let token = cancel_token.clone();
        tokio::spawn(agent.run(token))
    };

    select! {
        r = signal_wait() => {
            r?;
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        r = &mut agent_hnd => {
            // Agent exited on its own, surface why
            return match r? {
                Ok(()) => Err("agent exited unexpectedly".into()),
                Err(e) => Err(e),
            };
        },
    }

    match tokio::time::timeout(AGENT_EXIT_TIMEOUT, agent_hnd).await {
        Ok(r) => r?,
        Err(_) => Err("timed out waiting for agent to exit".into()),
    }
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?
        .add_directive("hyper=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}

async fn signal_wait() -> Result<(), BoxError> {
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    Ok(())
}
