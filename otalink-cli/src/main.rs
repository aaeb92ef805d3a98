//! otalink CLI - Command-line tool for sending firmware over-the-air.
//!
//! ## Features
//!
//! - Send firmware images over serial or Bluetooth SPP links
//! - Interactive serial port selection
//! - Plain serial monitor for watching device output
//! - Shell completion generation
//! - Environment variable support

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Set by the Ctrl+C handler; commands poll it between protocol steps.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check whether Ctrl+C was pressed.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Reset the interrupt flag after a command has handled it.
fn clear_interrupted_flag() {
    INTERRUPTED.store(false, Ordering::Relaxed);
}

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, select_serial_port};

/// Errors that carry a specific process exit code.
///
/// Everything else that bubbles up through anyhow exits with code 1.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Invalid usage or environment (exit code 2).
    #[error("{0}")]
    Usage(String),

    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => 2,
        Some(CliError::Cancelled(_)) => 130,
        None => 1,
    }
}

/// otalink - Send firmware updates to devices over serial or Bluetooth SPP.
///
/// Environment variables:
///   OTALINK_PORT              - Default serial port
///   OTALINK_BAUD              - Default baud rate (default: 115200)
///   OTALINK_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "otalink")]
#[command(author, about, long_about = None)]
#[command(version = env!("OTALINK_BUILD_VERSION"))]
#[command(propagate_version = true)]
#[command(after_help = "For more information, visit: https://github.com/otalink/otalink")]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "OTALINK_PORT")]
    port: Option<String>,

    /// Baud rate for the link.
    #[arg(
        short,
        long,
        global = true,
        default_value = "115200",
        env = "OTALINK_BAUD"
    )]
    baud: u32,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "OTALINK_NON_INTERACTIVE")]
    non_interactive: bool,

    /// List all available ports (including unknown types).
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Send a firmware image to the device.
    Send {
        /// Path to the firmware binary.
        firmware: PathBuf,

        /// Payload bytes per data chunk (1-1021).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Reply timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,

        /// Give up on a chunk after this many attempts (default: retry forever).
        #[arg(long)]
        max_retries: Option<u32>,

        /// Disable the progress bar.
        #[arg(long)]
        no_progress: bool,

        /// Open serial monitor after the transfer completes.
        #[arg(long)]
        monitor: bool,
    },

    /// List available serial and Bluetooth SPP ports.
    Ports {
        /// Show manufacturer, serial number and transport for each port.
        #[arg(long)]
        detailed: bool,

        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Watch raw device output on the serial link.
    Monitor {
        /// Prefix each output line with a timestamp.
        #[arg(long)]
        timestamps: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // --- NO_COLOR and TTY detection (clig.dev best practice) ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        // Disable all color output
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "otalink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        match err.downcast_ref::<CliError>() {
            Some(CliError::Cancelled(msg)) => {
                eprintln!("{} {msg}", style("✗").yellow());
            },
            _ => {
                eprintln!("{} {err:#}", style("Error:").red().bold());
            },
        }
        std::process::exit(exit_code_for(&err));
    }
}

/// Body of main, split out so errors can be mapped to exit codes.
fn run(cli: &Cli) -> Result<()> {
    install_interrupt_handler()?;

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Send {
            firmware,
            chunk_size,
            timeout,
            max_retries,
            no_progress,
            monitor,
        } => {
            commands::send::cmd_send(
                cli,
                &config,
                firmware,
                *chunk_size,
                *timeout,
                *max_retries,
                *no_progress,
            )?;
            if *monitor {
                eprintln!();
                commands::monitor::cmd_monitor(cli, &config, false)?;
            }
        },
        Commands::Ports { detailed, json } => {
            commands::ports::cmd_ports(*detailed, *json);
        },
        Commands::Monitor { timestamps } => {
            commands::monitor::cmd_monitor(cli, &config, *timestamps)?;
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
        },
    }

    Ok(())
}

/// Install the Ctrl+C handler and wire it into the transfer engine.
///
/// First Ctrl+C sets the flag so transfers stop at the next chunk
/// boundary; a second one exits immediately.
fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::Relaxed) {
            std::process::exit(130);
        }
    })
    .context("Failed to install Ctrl+C handler")?;
    otalink::set_interrupt_checker(|| INTERRUPTED.load(Ordering::Relaxed));
    Ok(())
}

/// Get serial port from CLI args, config, or interactive selection.
fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
    };

    let selected = select_serial_port(&options, config)?;
    Ok(selected.port.name)
}
