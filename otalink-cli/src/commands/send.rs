//! Send command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use otalink::{
    Error, FileSource, FirmwareSource, NativePort, OtaTransfer, SerialConfig, TransferOptions,
};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, get_port, use_fancy_output};

/// Resolve transfer options: CLI flag > config file > built-in default.
fn resolve_transfer_options(
    chunk_size: Option<usize>,
    timeout: Option<u64>,
    max_retries: Option<u32>,
    config: &Config,
) -> TransferOptions {
    let mut options = TransferOptions::default();
    if let Some(size) = chunk_size.or(config.link.chunk_size) {
        options = options.with_chunk_size(size);
    }
    if let Some(secs) = timeout.or(config.link.timeout_secs) {
        options = options.with_reply_timeout(Duration::from_secs(secs));
    }
    options.with_max_chunk_retries(max_retries)
}

/// Send command implementation.
pub(crate) fn cmd_send(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    chunk_size: Option<usize>,
    timeout: Option<u64>,
    max_retries: Option<u32>,
    no_progress: bool,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("📦").cyan(),
            firmware.display()
        );
    }

    let mut source = FileSource::open(firmware)
        .with_context(|| format!("Failed to open firmware {}", firmware.display()))?;
    let total = source.size()?;

    if !cli.quiet {
        eprintln!("{} {total} bytes to send", style("ℹ").blue());
    }

    // Get port
    let port_name = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port_name).green(),
            cli.baud
        );
    }

    let options = resolve_transfer_options(chunk_size, timeout, max_retries, config);
    debug!(
        "Transfer options: chunk_size={}, reply_timeout={:?}, max_retries={:?}",
        options.effective_chunk_size(),
        options.reply_timeout,
        options.max_chunk_retries
    );

    let serial_config = SerialConfig::new(port_name.clone(), cli.baud);
    let mut port = NativePort::open(&serial_config)
        .with_context(|| format!("Failed to open port {port_name}"))?;

    // Create progress bar
    let pb = if cli.quiet || no_progress || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let report =
        OtaTransfer::with_options(&mut port, options).run(&mut source, |sent, _total| {
            pb.set_position(sent);
        });

    if report.success {
        pb.finish_with_message("done");
        if !cli.quiet {
            eprintln!(
                "\n{} Sent {} bytes in {:.1}s ({:.1} KiB/s, {} chunks)",
                style("🎉").green().bold(),
                report.bytes_sent,
                report.elapsed.as_secs_f64(),
                report.throughput_kib(),
                report.chunks_attempted
            );
        }
        return Ok(());
    }

    pb.abandon();
    match report.error {
        Some(Error::Cancelled) => Err(CliError::Cancelled(format!(
            "Transfer cancelled after {} bytes",
            report.bytes_sent
        ))
        .into()),
        Some(err) => Err(anyhow::Error::new(err)
            .context(format!("Transfer failed after {} bytes", report.bytes_sent))),
        None => Err(anyhow::anyhow!("Transfer failed")),
    }
}
