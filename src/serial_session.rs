use serialport::{SerialPortType, available_ports};
use std::{
    io::{self, Read, Write},
    path::Path,
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial port {0} does not exist")]
    PortMissing(String),
}

/// Byte stream behind an open connection.
pub trait Link: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Link for T {}

/// Produces links for port names. The real one goes through `serialport`.
pub trait PortOpener: Send {
    fn exists(&self, port_name: &str) -> bool;

    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn Link>, SessionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl PortOpener for SystemOpener {
    fn exists(&self, port_name: &str) -> bool {
        let listed = available_ports()
            .map(|ports| ports.iter().any(|p| p.port_name == port_name))
            .unwrap_or(false);
        // Windows COM names never show up as paths, so the listing is the only check there.
        listed || Path::new(port_name).exists()
    }

    fn open(
        &self,
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> Result<Box<dyn Link>, SessionError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| SessionError::Open {
                port: port_name.to_string(),
                source,
            })?;
        Ok(Box::new(port))
    }
}

/// A serial device as shown in the port list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub description: String,
    pub port_name: String,
}

/// Human readable label for a port, preferring the USB product strings.
pub fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let label = [usb.manufacturer.as_deref(), usb.product.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if label.is_empty() {
                format!("USB {:04x}:{:04x}", usb.vid, usb.pid)
            } else {
                label
            }
        }
        SerialPortType::PciPort => "PCI serial".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
        SerialPortType::Unknown => "Serial port".to_string(),
    }
}

/// Enumerate the serial devices currently visible to the host.
pub fn list_ports() -> Vec<PortEntry> {
    match available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|p| PortEntry {
                description: describe(&p.port_type),
                port_name: p.port_name,
            })
            .collect(),
        Err(e) => {
            warn!("port enumeration failed: {e}");
            Vec::new()
        }
    }
}

/// Owns the single connection to the rig.
pub struct SerialSession {
    port_name: String,
    baud_rate: u32,
    read_timeout: Duration,
    settle_delay: Duration,
    link: Option<Box<dyn Link>>,
    opener: Box<dyn PortOpener>,
}

impl std::fmt::Debug for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSession")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .field("is_open", &self.is_open())
            .finish()
    }
}

impl SerialSession {
    /// Open `port_name` right away, the way the console does at startup.
    pub fn open(
        port_name: &str,
        config: &Config,
        opener: Box<dyn PortOpener>,
    ) -> Result<Self, SessionError> {
        let link = opener.open(port_name, config.baud_rate, config.read_timeout)?;
        info!("opened {port_name} at {} baud", config.baud_rate);
        Ok(Self {
            port_name: port_name.to_string(),
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout,
            settle_delay: config.settle_delay,
            link: Some(link),
            opener,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Write `command` as-is. Reopens a closed connection first. No retry on failure.
    pub fn send(&mut self, command: &str) -> bool {
        if self.link.is_none() {
            match self
                .opener
                .open(&self.port_name, self.baud_rate, self.read_timeout)
            {
                Ok(link) => self.link = Some(link),
                Err(e) => {
                    warn!("reopen before send failed: {e}");
                    return false;
                }
            }
        }
        let Some(link) = self.link.as_mut() else {
            return false;
        };
        if let Err(e) = link.write_all(command.as_bytes()).and_then(|_| link.flush()) {
            warn!("write to {} failed: {e}", self.port_name);
            return false;
        }
        thread::sleep(self.settle_delay);
        true
    }

    /// Drain whatever arrives before the read timeout.
    ///
    /// `None` means the read faulted (or the port is closed). `Some("")` means
    /// the device stayed silent; callers render both as "No response".
    pub fn receive(&mut self) -> Option<String> {
        let Some(link) = self.link.as_mut() else {
            warn!("receive on closed port {}", self.port_name);
            return None;
        };
        let mut data = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match link.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("read from {} failed: {e}", self.port_name);
                    return None;
                }
            }
        }
        Some(
            data.iter()
                .map(|&b| {
                    if b.is_ascii() {
                        b as char
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
        )
    }

    /// Move the session to `new_port` at the current baud rate.
    ///
    /// On any failure the existing connection is kept as it was.
    pub fn set_port(&mut self, new_port: &str) -> bool {
        if new_port == self.port_name && self.is_open() {
            return true;
        }
        if !self.opener.exists(new_port) {
            warn!("{}", SessionError::PortMissing(new_port.to_string()));
            return false;
        }
        match self
            .opener
            .open(new_port, self.baud_rate, self.read_timeout)
        {
            Ok(link) => {
                self.link = Some(link);
                info!("switched from {} to {new_port}", self.port_name);
                self.port_name = new_port.to_string();
                true
            }
            Err(e) => {
                warn!("{e}");
                false
            }
        }
    }

    /// Stored only; the live connection keeps its rate until the next reopen.
    pub fn set_baud_rate(&mut self, new_rate: u32) {
        self.baud_rate = new_rate;
    }

    pub fn close(&mut self) {
        if self.link.take().is_some() {
            info!("closed {}", self.port_name);
        }
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.close();
    }
}
