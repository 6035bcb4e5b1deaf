//! Serial port discovery.
//!
//! Lists the ports the OS knows about and labels the usual
//! microcontroller boards and USB-serial bridges by VID/PID.

use crate::link::error::TransportError;
use crate::link::types::{PortType, SerialPortInfo};
use serialport::SerialPortType;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Known boards and bridges
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownAdapter {
    pub vid: u16,
    pub pid: u16,
    pub vendor: &'static str,
    pub product: &'static str,
}

const fn adapter(vid: u16, pid: u16, vendor: &'static str, product: &'static str) -> KnownAdapter {
    KnownAdapter { vid, pid, vendor, product }
}

pub const KNOWN_ADAPTERS: &[KnownAdapter] = &[
    adapter(0x2341, 0x0043, "Arduino", "Uno R3"),
    adapter(0x2341, 0x0001, "Arduino", "Uno"),
    adapter(0x2341, 0x0042, "Arduino", "Mega 2560 R3"),
    adapter(0x2341, 0x0010, "Arduino", "Mega 2560"),
    adapter(0x2341, 0x8036, "Arduino", "Leonardo"),
    adapter(0x2341, 0x0058, "Arduino", "Nano Every"),
    adapter(0x2A03, 0x0043, "Arduino.org", "Uno R3"),
    adapter(0x1A86, 0x7523, "WCH", "CH340"),
    adapter(0x1A86, 0x55D4, "WCH", "CH9102"),
    adapter(0x10C4, 0xEA60, "Silicon Labs", "CP2102"),
    adapter(0x0403, 0x6001, "FTDI", "FT232R"),
    adapter(0x0403, 0x6015, "FTDI", "FT-X"),
    adapter(0x067B, 0x2303, "Prolific", "PL2303"),
    adapter(0x303A, 0x1001, "Espressif", "ESP32-S3"),
    adapter(0x2E8A, 0x000A, "Raspberry Pi", "Pico"),
];

pub fn lookup_adapter(vid: u16, pid: u16) -> Option<&'static KnownAdapter> {
    KNOWN_ADAPTERS.iter().find(|a| a.vid == vid && a.pid == pid)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Scanning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Best guess at a port category from its name alone.
pub fn classify_port(port_name: &str) -> PortType {
    let lower = port_name.to_lowercase();
    if lower.contains("usb") || lower.contains("acm") {
        PortType::Usb
    } else if lower.contains("rfcomm") || lower.contains("bluetooth") {
        PortType::Bluetooth
    } else if lower.contains("pts") || lower.contains("pty") {
        PortType::Virtual
    } else {
        PortType::Unknown
    }
}

/// Label shown in the device picker.
pub fn display_name(info: &SerialPortInfo) -> String {
    if let (Some(vid), Some(pid)) = (info.vid, info.pid) {
        if let Some(known) = lookup_adapter(vid, pid) {
            return format!("{} - {} {}", info.port_name, known.vendor, known.product);
        }
    }
    match info.product.as_deref().filter(|p| !p.is_empty()) {
        Some(product) => format!("{} - {}", info.port_name, product),
        None => info.port_name.clone(),
    }
}

/// Convert an OS port record into ours.
pub fn from_os(port: serialport::SerialPortInfo) -> SerialPortInfo {
    let mut info = SerialPortInfo {
        port_type: PortType::Unknown,
        vid: None,
        pid: None,
        manufacturer: None,
        product: None,
        serial_number: None,
        display_name: String::new(),
        port_name: port.port_name,
    };
    match port.port_type {
        SerialPortType::UsbPort(usb) => {
            info.port_type = PortType::Usb;
            info.vid = Some(usb.vid);
            info.pid = Some(usb.pid);
            info.manufacturer = usb.manufacturer;
            info.product = usb.product;
            info.serial_number = usb.serial_number;
        }
        SerialPortType::BluetoothPort => info.port_type = PortType::Bluetooth,
        SerialPortType::PciPort => info.port_type = PortType::Pci,
        SerialPortType::Unknown => info.port_type = classify_port(&info.port_name),
    }
    info.display_name = display_name(&info);
    info
}

/// Enumerate the ports currently present.  USB ports come first.
pub fn scan_ports() -> Result<Vec<SerialPortInfo>, TransportError> {
    let mut ports: Vec<SerialPortInfo> = serialport::available_ports()?
        .into_iter()
        .map(from_os)
        .collect();
    ports.sort_by_key(|p| (p.port_type != PortType::Usb, p.port_name.clone()));
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb(name: &str, vid: u16, pid: u16, product: Option<&str>) -> serialport::SerialPortInfo {
        serialport::SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: Some("8573531".into()),
                manufacturer: None,
                product: product.map(String::from),
            }),
        }
    }

    #[test]
    fn test_lookup_known_boards() {
        assert_eq!(lookup_adapter(0x2341, 0x0043).unwrap().vendor, "Arduino");
        assert_eq!(lookup_adapter(0x1A86, 0x7523).unwrap().product, "CH340");
        assert!(lookup_adapter(0xFFFF, 0xFFFF).is_none());
    }

    #[test]
    fn test_classify_by_name() {
        assert_eq!(classify_port("/dev/ttyACM0"), PortType::Usb);
        assert_eq!(classify_port("/dev/rfcomm0"), PortType::Bluetooth);
        assert_eq!(classify_port("/dev/pts/3"), PortType::Virtual);
        assert_eq!(classify_port("COM1"), PortType::Unknown);
    }

    #[test]
    fn test_from_os_known_board() {
        let info = from_os(usb("/dev/ttyACM0", 0x2341, 0x0043, None));
        assert_eq!(info.port_type, PortType::Usb);
        assert_eq!(info.serial_number.as_deref(), Some("8573531"));
        assert_eq!(info.display_name, "/dev/ttyACM0 - Arduino Uno R3");
    }

    #[test]
    fn test_from_os_unknown_usb_uses_product() {
        let info = from_os(usb("COM7", 0x1234, 0x5678, Some("Weather Board")));
        assert_eq!(info.display_name, "COM7 - Weather Board");
    }

    #[test]
    fn test_from_os_plain_port() {
        let info = from_os(serialport::SerialPortInfo {
            port_name: "COM1".into(),
            port_type: SerialPortType::PciPort,
        });
        assert_eq!(info.port_type, PortType::Pci);
        assert_eq!(info.display_name, "COM1");
    }
}
