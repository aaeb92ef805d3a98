//! Serial port discovery.
//!
//! Finds candidate ports for the OTA link based on USB VID/PID, the way
//! esptool and espflash locate ESP devkits. Bluetooth SPP bindings
//! (RFCOMM device nodes, paired COM ports) show up as serial ports with
//! no USB identity; they are classified by transport so callers can still
//! tell them apart from UART bridges.
//!
//! ## Recognized bridges
//!
//! - CH340/CH341 (VID `0x1A86`)
//! - Silicon Labs CP210x (VID `0x10C4`)
//! - FTDI FT232/FT2232 (VID `0x0403`)
//! - Espressif native USB (VID `0x303A`)

use log::{debug, info, trace};

/// Transport type for a discovered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TransportKind {
    /// UART or USB CDC serial port.
    Serial,
    /// Bluetooth SPP binding (RFCOMM node or paired COM port).
    BluetoothSpp,
}

impl TransportKind {
    /// Get a human-readable name for the transport.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::BluetoothSpp => "bluetooth-spp",
        }
    }

    /// Guess the transport from a device node name alone.
    ///
    /// Used for ports named explicitly by the user, where no
    /// enumeration metadata is available.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("rfcomm") || lower.contains("bluetooth") {
            Self::BluetoothSpp
        } else {
            Self::Serial
        }
    }
}

/// Classify a port's transport from its enumeration type and name.
///
/// Linux RFCOMM binds (`/dev/rfcomm0`) enumerate with an `Unknown` port
/// type, so the device node name is the only signal there.
fn classify_transport(port_type: &serialport::SerialPortType, name: &str) -> TransportKind {
    if matches!(port_type, serialport::SerialPortType::BluetoothPort) {
        return TransportKind::BluetoothSpp;
    }
    TransportKind::from_name(name)
}

/// Known USB VID/PID families for OTA-capable boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum UsbDevice {
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// FTDI FT232/FT2232 USB-to-Serial converter.
    Ftdi,
    /// Espressif native USB (USB-Serial/JTAG peripheral).
    Espressif,
    /// Unknown device.
    Unknown,
}

impl UsbDevice {
    /// Classify a VID/PID combination.
    #[must_use]
    pub fn from_vid_pid(vid: u16, _pid: u16) -> Self {
        match vid {
            // CH340/CH341 family
            0x1A86 => Self::Ch340,
            // Silicon Labs CP210x family
            0x10C4 => Self::Cp210x,
            // FTDI family
            0x0403 => Self::Ftdi,
            // Espressif native USB
            0x303A => Self::Espressif,
            _ => Self::Unknown,
        }
    }

    /// Get a human-readable name for the device.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Espressif => "Espressif USB",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known/expected device type.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Detected serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyUSB0" or "COM3").
    pub name: String,
    /// Transport type.
    pub transport: TransportKind,
    /// USB device type if detected.
    pub device: UsbDevice,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl DetectedPort {
    /// Check if this port looks like an OTA-capable board.
    pub fn is_likely_device(&self) -> bool {
        self.device.is_known() || self.transport == TransportKind::BluetoothSpp
    }
}

/// Detect all available serial ports with USB device information.
pub fn detect_ports() -> Vec<DetectedPort> {
    let mut result = Vec::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for port_info in ports {
                let mut detected = DetectedPort {
                    name: port_info.port_name.clone(),
                    transport: classify_transport(&port_info.port_type, &port_info.port_name),
                    device: UsbDevice::Unknown,
                    vid: None,
                    pid: None,
                    manufacturer: None,
                    product: None,
                    serial: None,
                };

                if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                    detected.vid = Some(usb_info.vid);
                    detected.pid = Some(usb_info.pid);
                    detected.manufacturer = usb_info.manufacturer;
                    detected.product = usb_info.product;
                    detected.serial = usb_info.serial_number;
                    detected.device = UsbDevice::from_vid_pid(usb_info.vid, usb_info.pid);

                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                        port_info.port_name, usb_info.vid, usb_info.pid, detected.device
                    );
                }

                result.push(detected);
            }
        }
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
        }
    }

    result
}

/// Detect ports that look like OTA-capable boards.
pub fn device_ports() -> Vec<DetectedPort> {
    detect_ports()
        .into_iter()
        .filter(DetectedPort::is_likely_device)
        .collect()
}

/// Pick the best candidate port, if any.
///
/// Prefers Espressif native USB over generic USB-UART bridges, any known
/// bridge over a Bluetooth SPP binding, and SPP over an unidentified port.
pub fn best_port() -> Option<DetectedPort> {
    let ports = detect_ports();

    if let Some(port) = ports.iter().find(|p| p.device == UsbDevice::Espressif) {
        info!("Auto-detected Espressif USB device: {}", port.name);
        return Some(port.clone());
    }

    if let Some(port) = ports.iter().find(|p| p.device.is_known()) {
        info!(
            "Auto-detected {} USB-UART bridge: {}",
            port.device.name(),
            port.name
        );
        return Some(port.clone());
    }

    if let Some(port) = ports
        .iter()
        .find(|p| p.transport == TransportKind::BluetoothSpp)
    {
        info!("Auto-detected Bluetooth SPP binding: {}", port.name);
        return Some(port.clone());
    }

    if let Some(port) = ports.into_iter().next() {
        info!("Using first available port: {}", port.name);
        return Some(port);
    }

    None
}
