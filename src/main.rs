//! Binary entry point for the Varnish broker.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use varnish_broker::api;
use varnish_broker::config::BrokerConfig;
use varnish_broker::manager::{ManagerContext, ManagerRegistry};
use varnish_broker::remote::SshConfig;
use varnish_broker::vcl::{render_vcl, validate_host};

mod cli;

use cli::{Cli, RenderVclCommand, ServeCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("manager error: {0}")]
    Manager(String),
    #[error("invalid app host: {0}")]
    InvalidHost(String),
    #[error("server error: {0}")]
    Server(String),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    match cli {
        Cli::Serve(command) => serve(command).await,
        Cli::RenderVcl(command) => render(&command),
    }
}

fn render(command: &RenderVclCommand) -> Result<(), CliError> {
    validate_host(&command.app_host).map_err(|err| CliError::InvalidHost(err.to_string()))?;
    write!(io::stdout(), "{}", render_vcl(&command.app_host))
        .map_err(|err| CliError::Server(err.to_string()))
}

async fn serve(command: ServeCommand) -> Result<(), CliError> {
    let mut broker =
        BrokerConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    if let Some(listen) = command.listen {
        broker.listen = listen;
    }
    if let Some(manager) = command.manager {
        broker.manager = manager;
    }
    broker
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    init_tracing(&broker.log_filter);

    let ssh = SshConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let manager_name = broker.manager.clone();
    let listen = broker.listen.clone();
    let context = ManagerContext { broker, ssh };
    let manager = ManagerRegistry::with_defaults()
        .build(&manager_name, &context)
        .map_err(|err| CliError::Manager(err.to_string()))?;

    let listener = TcpListener::bind(&listen)
        .await
        .map_err(|err| CliError::Server(format!("failed to bind {listen}: {err}")))?;
    info!(address = %listen, manager = %manager_name, "broker listening");
    axum::serve(listener, api::router(manager))
        .await
        .map_err(|err| CliError::Server(err.to_string()))
}

/// `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
