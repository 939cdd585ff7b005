//! Darkwing CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use darkwing::cli::{Cli, LogFormat};

fn init_tracing(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        "darkwing=debug"
    } else {
        "darkwing=info"
    };
    let filter = EnvFilter::from_default_env().add_directive(level.parse()?);

    // stdout belongs to the container and to `status`.
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(&cli)?;

    match cli.execute().await {
        Ok(code) => Ok(code),
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            Ok(ExitCode::from(code))
        }
    }
}
