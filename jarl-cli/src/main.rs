//! `jarl` CLI driver: reads one script path, hands it to [`jarl::Vm`], and
//! exits non-zero if any diagnostic fired. Deliberately thin, with exactly
//! one job and no subcommands.

mod config;
mod error;

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use error::{CliError, Result};

/// Run a Jarl script.
#[derive(Parser, Debug)]
#[command(name = "jarl")]
#[command(author = "Jarl Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a Jarl script", long_about = None)]
struct Cli {
    /// Script file to run.
    script: PathBuf,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true, env = "JARL_VERBOSE")]
    verbose: bool,

    /// Path to a jarl.toml configuration file.
    #[arg(short, long, global = true, env = "JARL_CONFIG")]
    config: Option<PathBuf>,

    /// Disable color output.
    #[arg(long, global = true, env = "JARL_NO_COLOR")]
    no_color: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("jarl: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.no_color)?;
    let config = load_config(cli.config.as_deref())?;
    let no_color = cli.no_color || config.no_color;
    let stack_capacity = config.stack_capacity;

    let source = std::fs::read_to_string(&cli.script).map_err(|source| CliError::ReadScript {
        path: cli.script.display().to_string(),
        source,
    })?;
    debug!(script = %cli.script.display(), bytes = source.len(), "read script");

    let mut vm = jarl::Vm::with_capacity(stack_capacity);
    vm.set_print_func(move |s| print!("{s}"));
    vm.set_error_print_func(move |s| {
        if no_color {
            eprint!("{s}");
        } else {
            eprint!("\x1b[31m{s}\x1b[0m");
        }
    });

    match vm.execute(&source) {
        Ok(_) => Ok(()),
        Err(err) => {
            error!(%err, "script execution failed");
            Err(CliError::ScriptFailed)
        }
    }
}

fn init_logging(verbose: bool, no_color: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    let subscriber = fmt::layer()
        .with_ansi(!no_color)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);
    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .map_err(|e| CliError::Config(format!("failed to initialize logging: {e}")))?;
    Ok(())
}

fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_script_argument() {
        let cli = Cli::parse_from(["jarl", "main.jarl"]);
        assert_eq!(cli.script, PathBuf::from("main.jarl"));
        assert!(!cli.verbose);
    }

    #[test]
    fn parses_global_verbose_flag() {
        let cli = Cli::parse_from(["jarl", "--verbose", "main.jarl"]);
        assert!(cli.verbose);
    }

    #[test]
    fn parses_global_config_flag() {
        let cli = Cli::parse_from(["jarl", "--config", "/path/to/jarl.toml", "main.jarl"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/jarl.toml")));
    }

    #[test]
    fn parses_global_no_color_flag() {
        let cli = Cli::parse_from(["jarl", "--no-color", "main.jarl"]);
        assert!(cli.no_color);
    }
}
