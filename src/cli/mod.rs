//! Command-line interface definitions for the `varnish-broker` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `varnish-broker` binary.
#[derive(Debug, Parser)]
#[command(
    name = "varnish-broker",
    about = "Provision Varnish proxies on demand and bind them to applications",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Serve the REST control plane.
    #[command(name = "serve", about = "Serve the REST control plane")]
    Serve(ServeCommand),
    /// Print the VCL a bind would install for an application host.
    #[command(
        name = "render-vcl",
        about = "Print the VCL a bind would install for an application host"
    )]
    RenderVcl(RenderVclCommand),
}

/// Arguments for the `varnish-broker serve` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ServeCommand {
    /// Override the listen address (for example `0.0.0.0:8000`).
    #[arg(long, value_name = "ADDR")]
    pub(crate) listen: Option<String>,
    /// Override the manager serving requests.
    #[arg(long, value_name = "NAME")]
    pub(crate) manager: Option<String>,
}

/// Arguments for the `varnish-broker render-vcl` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RenderVclCommand {
    /// Application host the proxy forwards to.
    #[arg(value_name = "APP_HOST")]
    pub(crate) app_host: String,
}
