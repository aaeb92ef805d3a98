//! Ports command implementation.

use console::style;
use otalink::{TransportKind, best_port, detect_ports};

/// List ports command implementation.
///
/// With `--json` the port list goes to stdout as a plain JSON array and
/// nothing else is printed, so scripts can pipe it straight into jq.
pub(crate) fn cmd_ports(detailed: bool, json: bool) {
    let detected = detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "transport": p.transport.name(),
                    "device": p.device.name(),
                    "known": p.is_likely_device(),
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available ports:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else if port.transport == TransportKind::BluetoothSpp {
            format!(" [{}]", style(port.transport.name()).cyan())
        } else {
            String::new()
        };

        let product = port.product.as_deref().unwrap_or("");
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        eprintln!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            device_type,
            vid_pid,
            if product.is_empty() {
                String::new()
            } else {
                format!(" - {}", style(product).dim())
            }
        );

        if detailed {
            eprintln!("      transport: {}", port.transport.name());
            if let Some(ref manufacturer) = port.manufacturer {
                eprintln!("      manufacturer: {manufacturer}");
            }
            if let Some(ref serial) = port.serial {
                eprintln!("      serial: {serial}");
            }
        }
    }

    // Show auto-detection result
    if let Some(auto_port) = best_port() {
        eprintln!(
            "\n{} Would auto-select: {}",
            style("→").green().bold(),
            style(&auto_port.name).cyan().bold()
        );
    }
}
