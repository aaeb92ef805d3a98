//! Serial monitor command implementation.
//!
//! Read-only monitor: device output goes to stdout, status lines to
//! stderr, and Ctrl+C exits cleanly.

use anyhow::{Context, Result};
use console::style;
use otalink::{MonitorOptions, NativePort, SerialConfig, run_monitor};
use std::io;

use crate::config::Config;
use crate::{Cli, clear_interrupted_flag, get_port, was_interrupted};

/// Run the serial monitor until Ctrl+C or a read error.
pub(crate) fn cmd_monitor(cli: &Cli, config: &Config, timestamps: bool) -> Result<()> {
    let port_name = get_port(cli, config)?;

    eprintln!(
        "{} Opening monitor on {} at {} baud",
        style("📡").cyan(),
        style(&port_name).green(),
        cli.baud
    );
    eprintln!("{}", style("(press Ctrl+C to exit)").dim());

    let serial_config = SerialConfig::new(port_name.clone(), cli.baud);
    let mut port = NativePort::open(&serial_config)
        .with_context(|| format!("Failed to open port {port_name}"))?;

    let options = MonitorOptions { timestamps };
    run_monitor(&mut port, &mut io::stdout(), &options)?;

    if was_interrupted() {
        // Ctrl+C is the normal way to leave the monitor, not an error
        clear_interrupted_flag();
        eprintln!("\n{} Monitor closed", style("✓").green());
    }

    Ok(())
}
