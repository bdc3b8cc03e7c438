//! Serial port discovery and matching ports to a project using its port hint.

use std::fmt::Display;

use tracing::{debug, warn};

/// A serial port found during a scan. Only `path` identifies a port across scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerialPortInfo {
    pub path: String,
    pub description: String,
    pub manufacturer: Option<String>,
}

impl SerialPortInfo {
    pub fn new(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            manufacturer: None,
        }
    }
}

impl Display for SerialPortInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "{} (Unknown device)", self.path)
        } else {
            write!(f, "{} ({})", self.path, self.description)
        }
    }
}

impl From<serialport::SerialPortInfo> for SerialPortInfo {
    fn from(value: serialport::SerialPortInfo) -> Self {
        let (description, manufacturer) = match value.port_type {
            serialport::SerialPortType::UsbPort(usb) => (
                usb.product.unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
                usb.manufacturer,
            ),
            serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None),
            serialport::SerialPortType::PciPort => ("PCI".to_string(), None),
            serialport::SerialPortType::Unknown => (String::new(), None),
        };

        Self {
            path: value.port_name,
            description,
            manufacturer,
        }
    }
}

/// Scan the serial ports currently present, in the order the OS reports them.
pub fn refresh_ports() -> Vec<SerialPortInfo> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(Into::into).collect(),
        Err(e) => {
            warn!("Failed to list serial ports: {e}");
            Vec::new()
        }
    }
}

/// A port selected by [`best_match`], with the number of hint keywords it matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMatch<'a> {
    pub port: &'a SerialPortInfo,
    pub score: usize,
}

fn keywords(hint: &str) -> Vec<String> {
    hint.split_whitespace().map(str::to_lowercase).collect()
}

fn matched(port: &SerialPortInfo, keywords: &[String]) -> usize {
    let description = port.description.to_lowercase();
    keywords
        .iter()
        .filter(|k| description.contains(k.as_str()))
        .count()
}

/// Number of hint keywords contained (case-insensitively) in the port description.
pub fn score(port: &SerialPortInfo, hint: &str) -> usize {
    matched(port, &keywords(hint))
}

/// Port matching the most hint keywords. Ties go to the earlier port, and a port needs to match
/// at least one keyword to be selected.
pub fn best_match<'a>(ports: &'a [SerialPortInfo], hint: Option<&str>) -> Option<PortMatch<'a>> {
    let keywords = keywords(hint?);
    if keywords.is_empty() {
        return None;
    }

    let mut best: Option<PortMatch<'a>> = None;

    for port in ports {
        let score = matched(port, &keywords);
        debug!("Port {} scored {score}", port.path);

        if score > best.map_or(0, |x| x.score) {
            best = Some(PortMatch { port, score });
        }
    }

    best
}

/// Path of the port to pre-select for a project with the given hint.
pub fn select_best<'a>(ports: &'a [SerialPortInfo], hint: Option<&str>) -> Option<&'a str> {
    best_match(ports, hint).map(|x| x.port.path.as_str())
}
