//! Serial transport.
//!
//! The engine talks to the controller through the [`Link`] trait;
//! [`SerialChannel`] is the physical implementation over a serial port.
//! Keeping the seam here lets tests (and alternate transports) drive the
//! same engine over an in-memory link.

use std::fmt;
use std::io;
use std::time::Duration;

use serialport::DataBits;
use serialport::Parity;
use serialport::SerialPort;
use serialport::StopBits;

/// Baud rates the server supports.
pub const BAUD_RATES: [u32; 3] = [230_400, 403_200, 460_800];

/// The preferred baud rate.
pub const DEFAULT_BAUD: u32 = 403_200;

/// Read timeout on the open port; doubles as the event-loop poll interval.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Byte transport between the server and the controller.
pub trait Link: Send + fmt::Debug {
    /// Transmit `bytes`, blocking until the transport accepts them all.
    ///
    /// # Errors
    /// Returns the underlying transport error.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Receive into `buf`, returning the byte count. Returns `Ok(0)` when
    /// the poll interval elapses without data.
    ///
    /// # Errors
    /// Returns the underlying transport error; a timeout is not an error.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Change the transport's line rate.
    ///
    /// # Errors
    /// Returns the underlying transport error.
    fn set_baud(&mut self, baud: u32) -> io::Result<()>;
}

/// A [`Link`] over a physical serial port: 8 data bits, no parity, 1 stop
/// bit, with DTR and RTS raised while open.
pub struct SerialChannel {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Open and configure the port `name` at `baud`.
    ///
    /// # Errors
    /// Returns an error when the port cannot be opened or configured.
    pub fn open(name: &str, baud: u32) -> io::Result<SerialChannel> {
        let mut port = serialport::new(name, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(io::Error::from)?;
        port.write_data_terminal_ready(true).map_err(io::Error::from)?;
        port.write_request_to_send(true).map_err(io::Error::from)?;
        Ok(SerialChannel {
            name: name.to_owned(),
            port,
        })
    }

    /// The name the port was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Link for SerialChannel {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn set_baud(&mut self, baud: u32) -> io::Result<()> {
        self.port.set_baud_rate(baud).map_err(io::Error::from)
    }
}

impl fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
