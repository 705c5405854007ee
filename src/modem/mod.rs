//! Modem device communication module
//!
//! Owns the serial port attached to the cellular modem. Reads happen on a
//! dedicated blocking thread that forwards raw chunks into a bounded tokio
//! channel; the bridge loop consumes that channel with a short timeout and
//! writes commands back through [`CommandSink`].

pub mod command;
pub mod framer;

use anyhow::Result;
#[cfg(feature = "serial")]
use anyhow::anyhow;
use log::{debug, info};
#[cfg(feature = "serial")]
use log::{error, warn};
use tokio::sync::mpsc;

pub use command::AtCommand;
pub use framer::{AtFramer, FrameOverflow, Record};

#[cfg(feature = "serial")]
use serialport::SerialPort;
#[cfg(feature = "serial")]
use std::io::{Read, Write};

/// Capacity of the chunk channel between the reader thread and the bridge loop.
pub const INPUT_QUEUE_DEPTH: usize = 64;
/// Largest chunk the reader thread forwards per serial read.
pub const READ_CHUNK: usize = 1024;

/// Anything that can put an AT command on the wire.
pub trait CommandSink {
    fn send(&mut self, command: &AtCommand) -> Result<()>;
}

/// Write half of an open modem connection.
pub struct ModemDevice {
    port_name: String,
    baud_rate: u32,
    #[cfg(feature = "serial")]
    port: Box<dyn SerialPort>,
}

impl ModemDevice {
    /// Open the serial port and start the reader thread.
    ///
    /// Returns the device (for writing) and the receiving end of the chunk
    /// channel. The channel closes when the reader thread hits a fatal error.
    #[cfg(feature = "serial")]
    pub async fn open(port_name: &str, baud_rate: u32) -> Result<(Self, mpsc::Receiver<Vec<u8>>)> {
        use tokio::time::{sleep, Duration};

        info!("Opening modem on {} at {} baud", port_name, baud_rate);
        let mut port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| anyhow!("Failed to open serial port {}: {}", port_name, e))?;
        let _ = port.write_data_terminal_ready(true);
        let _ = port.write_request_to_send(true);
        sleep(Duration::from_millis(150)).await;
        // Drop boot banners and anything left over from a previous session
        if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
            debug!("Could not purge input buffer: {}", e);
        }

        let reader = port
            .try_clone()
            .map_err(|e| anyhow!("Failed to clone serial port {}: {}", port_name, e))?;
        let (tx, rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("modem-rx".into())
            .spawn(move || read_loop(reader, tx))
            .map_err(|e| anyhow!("Failed to spawn reader thread: {}", e))?;

        Ok((ModemDevice { port_name: port_name.to_string(), baud_rate, port }, rx))
    }

    #[cfg(not(feature = "serial"))]
    pub async fn open(port_name: &str, baud_rate: u32) -> Result<(Self, mpsc::Receiver<Vec<u8>>)> {
        info!("Opening modem on {} at {} baud", port_name, baud_rate);
        anyhow::bail!("Serial support not compiled in; rebuild with the `serial` feature")
    }

    pub fn port_name(&self) -> &str { &self.port_name }

    pub fn baud_rate(&self) -> u32 { self.baud_rate }
}

impl CommandSink for ModemDevice {
    #[cfg(feature = "serial")]
    fn send(&mut self, command: &AtCommand) -> Result<()> {
        let wire = command.to_wire();
        self.port
            .write_all(wire.as_bytes())
            .map_err(|e| anyhow!("Failed to write to serial port: {}", e))?;
        self.port
            .flush()
            .map_err(|e| anyhow!("Failed to flush serial port: {}", e))?;
        debug!("Sent: {}", command);
        Ok(())
    }

    #[cfg(not(feature = "serial"))]
    fn send(&mut self, command: &AtCommand) -> Result<()> {
        debug!("Mock send: {}", command);
        Ok(())
    }
}

#[cfg(feature = "serial")]
fn read_loop(mut port: Box<dyn SerialPort>, tx: mpsc::Sender<Vec<u8>>) {
    let mut buffer = [0u8; READ_CHUNK];
    loop {
        match port.read(&mut buffer) {
            Ok(0) => {}
            Ok(n) => {
                debug!("RAW {} bytes: {}", n, String::from_utf8_lossy(&buffer[..n]).escape_debug());
                if tx.blocking_send(buffer[..n].to_vec()).is_err() {
                    debug!("Input channel closed, reader thread exiting");
                    return;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {
                warn!("Serial read interrupted, retrying");
            }
            Err(e) => {
                error!("Serial read error: {}", e);
                return;
            }
        }
    }
}
