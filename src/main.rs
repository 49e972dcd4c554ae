//! memlog command line entry point.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memlog::cli::{Cli, Commands, ConfigCommand};

/// Logs go to stderr so reports on stdout stay machine-readable.
/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Split(cmd) => commands::split::handle(&cmd, &commands::load_config(config_path)?),
        Commands::Compress(cmd) => {
            commands::compress::handle(&cmd, &commands::load_config(config_path)?)
        }
        Commands::Report(cmd) => commands::report::handle(&cmd, &commands::load_config(config_path)?),
        Commands::Run(cmd) => commands::run::handle(&cmd, &commands::load_config(config_path)?),
        Commands::Config(ConfigCommand::Show) => commands::config::handle_show(config_path),
        Commands::Config(ConfigCommand::Init { force }) => {
            commands::config::handle_init(config_path, force)
        }
        Commands::Completions { shell } => commands::completions::handle(shell),
    }
}
