//! Serial port handling
//!
//! Low-level access to the RS-232 port the Cardio2e controller sits on.

use serialport::SerialPort;
use std::time::Duration;
use tracing::debug;

use super::{ProtocolError, DEFAULT_BAUD_RATE};

/// Read timeout of the underlying port
///
/// Reads are only issued after `bytes_to_read()` reports data, so this only
/// bounds a read racing with a line drop.
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Open a serial port with default settings
pub fn open_port(name: &str, baud_rate: Option<u32>) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);
    debug!("Opening {} at {} baud", name, baud);

    let mut port = serialport::new(name, baud)
        .timeout(PORT_TIMEOUT)
        .open()
        .map_err(|e| ProtocolError::SerialError(format!("{}: {}", name, e)))?;
    configure_port(port.as_mut())?;
    Ok(port)
}

/// Configure a serial port for the Cardio2e bus (8N1, no flow control)
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        let result = open_port("/dev/cardio2e-does-not-exist", None);
        match result {
            Err(ProtocolError::SerialError(msg)) => {
                assert!(msg.contains("/dev/cardio2e-does-not-exist"))
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opening a missing device succeeded"),
        }
    }
}
