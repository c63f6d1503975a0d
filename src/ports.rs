//! Serial port enumeration and connection setup.

use crate::protocol::{Connection, Port, READ_TIMEOUT};
use serde::Serialize;
use serialport::{DataBits, FlowControl, Parity, SerialPortType, StopBits};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEntry {
    pub device: String,
    pub description: String,
}

impl PortEntry {
    /// `<device> - <description>`, as shown in the port picker.
    pub fn display_name(&self) -> String {
        format!("{} - {}", self.device, self.description)
    }
}

pub fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .or_else(|| usb.manufacturer.clone())
            .unwrap_or_else(|| format!("USB device {:04X}:{:04X}", usb.vid, usb.pid)),
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        _ => "n/a".to_string(),
    }
}

pub fn list_ports() -> Result<Vec<PortEntry>, serialport::Error> {
    let mut ports: Vec<PortEntry> = serialport::available_ports()?
        .into_iter()
        .map(|info| PortEntry {
            description: describe(&info.port_type),
            device: info.port_name,
        })
        .collect();
    ports.sort_by(|a, b| a.device.cmp(&b.device));
    Ok(ports)
}

/// Open `device` at `baud_rate`, 8N1, with the protocol's per-read timeout.
pub fn connect(device: &str, baud_rate: u32) -> Result<Connection, serialport::Error> {
    let port = serialport::new(device, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()?;
    Ok(Connection::new(device, Box::new(port) as Box<dyn Port>))
}
