use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};

use crate::cmd::PortsArgs;
use crate::exit::{CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Debug, Serialize, PartialEq, Eq)]
struct PortOutput {
    name: String,
    kind: &'static str,
    /// USB identity as `vid:pid`, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    usb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product: Option<String>,
}

impl From<SerialPortInfo> for PortOutput {
    fn from(info: SerialPortInfo) -> Self {
        let (kind, usb, product) = match info.port_type {
            SerialPortType::UsbPort(usb) => (
                "usb",
                Some(format!("{:04x}:{:04x}", usb.vid, usb.pid)),
                usb.product,
            ),
            SerialPortType::PciPort => ("pci", None, None),
            SerialPortType::BluetoothPort => ("bluetooth", None, None),
            SerialPortType::Unknown => ("unknown", None, None),
        };
        Self {
            name: info.port_name,
            kind,
            usb,
            product,
        }
    }
}

pub fn run(_args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let ports: Vec<PortOutput> = serialport::available_ports()
        .map_err(|err| CliError::new(TRANSPORT_ERROR, format!("port enumeration failed: {err}")))?
        .into_iter()
        .map(PortOutput::from)
        .collect();
    tracing::debug!(count = ports.len(), "serial ports enumerated");

    match format {
        OutputFormat::Json => print_json(&ports),
        OutputFormat::Table => print_table(
            &["NAME", "TYPE", "USB", "PRODUCT"],
            ports
                .iter()
                .map(|port| {
                    vec![
                        port.name.clone(),
                        port.kind.to_string(),
                        port.usb.clone().unwrap_or_default(),
                        port.product.clone().unwrap_or_default(),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty => {
            for port in &ports {
                println!("{} ({})", port.name, port.kind);
            }
        }
    }
    Ok(SUCCESS)
}
