use serialport::SerialPort;
use std::io::{self, Read, Write};

/// Byte transport the protocol engine runs on
pub trait Transport: Read + Write + Send {
    /// Number of bytes that can be read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Whether the transport is still usable
    fn is_open(&self) -> bool;

    /// Close the transport; later calls fail with `NotConnected`
    fn close(&mut self);

    /// Discard unread input
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Serial port wrapper implementing [`Transport`]
///
/// The port is dropped (and the device released) on `close()` or on the
/// first I/O error that means the device is gone.
pub struct SerialChannel {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }

    fn check<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if is_disconnect(e.kind()) {
                self.port = None;
            }
        }
        result
    }
}

fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::PermissionDenied
    )
}

fn serial_to_io(e: serialport::Error) -> io::Error {
    match e.kind() {
        serialport::ErrorKind::NoDevice => io::Error::new(io::ErrorKind::NotConnected, e),
        serialport::ErrorKind::Io(kind) => io::Error::new(kind, e),
        _ => io::Error::new(io::ErrorKind::Other, e),
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.port()?.read(buf);
        self.check(result)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.port()?.write(buf);
        self.check(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.port()?.flush();
        self.check(result)
    }
}

impl Transport for SerialChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let result = self.port()?.bytes_to_read().map_err(serial_to_io);
        self.check(result)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        let result = self
            .port()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(serial_to_io);
        self.check(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_kinds() {
        assert!(is_disconnect(io::ErrorKind::BrokenPipe));
        assert!(is_disconnect(io::ErrorKind::NotConnected));
        assert!(!is_disconnect(io::ErrorKind::TimedOut));
        assert!(!is_disconnect(io::ErrorKind::WouldBlock));
    }

    #[test]
    fn test_no_device_maps_to_not_connected() {
        let e = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        assert_eq!(serial_to_io(e).kind(), io::ErrorKind::NotConnected);
    }
}
