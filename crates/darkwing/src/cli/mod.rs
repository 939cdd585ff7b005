//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use darkwing_common::error::EXIT_SETUP_FAILURE;
use darkwing_common::{DarkwingPaths, DarkwingResult};

use crate::config::FsConfigStore;
use crate::driver::{Driver, DriverOptions};

/// Darkwing - single-container launcher for OCI runtimes
#[derive(Parser)]
#[command(name = "darkwing")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration base directory
    #[arg(long, global = true, env = "DARKWING_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Enable debug logging and runtime diagnostics
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Darkwing commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run a container to completion and exit with its status
    Run {
        /// Container, as NAME or NAME:CONTEXT
        target: String,

        /// Keep the run directory and runtime state afterwards
        #[arg(long)]
        keep: bool,

        /// Kill the container after this many seconds
        #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },

    /// Print the runtime state of a kept or running container
    Status {
        /// Container, as NAME or NAME:CONTEXT
        target: String,
    },

    /// Remove a left-behind run directory
    Rm {
        /// Container, as NAME or NAME:CONTEXT
        target: String,

        /// Remove even if the owning launcher is alive or the runtime
        /// reports the container as created, running or paused
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

impl Cli {
    /// Paths honouring `--config-dir`.
    #[must_use]
    pub fn paths(&self) -> DarkwingPaths {
        let paths = DarkwingPaths::new();
        match &self.config_dir {
            Some(dir) => paths.with_config(dir),
            None => paths,
        }
    }

    fn driver(&self, options: DriverOptions) -> Driver {
        let paths = self.paths();
        let store = FsConfigStore::from_paths(&paths);
        Driver::new(Arc::new(store), paths).with_options(options)
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed command; the caller maps it to an
    /// exit status.
    pub async fn execute(self) -> DarkwingResult<ExitCode> {
        match &self.command {
            Commands::Run {
                target,
                keep,
                timeout,
            } => {
                let options = DriverOptions {
                    remove: !keep,
                    debug: self.debug,
                    timeout: timeout.map(Duration::from_secs),
                };
                let code = self.driver(options).execute(target).await?;
                Ok(ExitCode::from(exit_status(code)))
            }

            Commands::Status { target } => {
                let state = self.driver(DriverOptions::default()).status(target).await?;
                println!("{}", serde_json::to_string_pretty(&state)?);
                Ok(ExitCode::SUCCESS)
            }

            Commands::Rm { target, force } => {
                self.driver(DriverOptions::default())
                    .remove(target, *force)
                    .await?;
                Ok(ExitCode::SUCCESS)
            }

            Commands::Completions { shell } => {
                clap_complete::generate(
                    *shell,
                    &mut Self::command(),
                    "darkwing",
                    &mut std::io::stdout(),
                );
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

/// Map a container exit code onto a process exit status.
#[must_use]
pub fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(EXIT_SETUP_FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags() {
        let cli = Cli::try_parse_from([
            "darkwing", "--debug", "run", "mybox:ci", "--keep", "--timeout", "30",
        ])
        .unwrap();
        assert!(cli.debug);
        match cli.command {
            Commands::Run {
                target,
                keep,
                timeout,
            } => {
                assert_eq!(target, "mybox:ci");
                assert!(keep);
                assert_eq!(timeout, Some(30));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(Cli::try_parse_from(["darkwing", "run", "mybox", "--timeout", "0"]).is_err());
    }

    #[test]
    fn config_dir_flag() {
        let cli =
            Cli::try_parse_from(["darkwing", "--config-dir", "/srv/dw", "status", "mybox"]).unwrap();
        assert_eq!(cli.paths().config, PathBuf::from("/srv/dw"));
    }

    #[test]
    fn exit_codes_in_range() {
        assert_eq!(exit_status(17), 17);
        assert_eq!(exit_status(137), 137);
        assert_eq!(exit_status(-1), EXIT_SETUP_FAILURE);
    }
}
