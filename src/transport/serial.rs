use super::ConsolePort;
use crate::config::SerialConfig;
use crate::error::{PylonError, Result};
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

// Upper bound for a single drain; a `stat` dump of a full stack is well below
const MAX_READ_BYTES: usize = 256 * 1024;

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// [`ConsolePort`] backed by a real serial device.
///
/// All port I/O runs on the blocking pool; the handle is shared with the
/// worker through an async mutex and locked there with `blocking_lock`.
pub struct SerialConsolePort {
    path: String,
    baud_rate: u32,
    read_timeout: Duration,
    port: Option<SharedPort>,
}

impl SerialConsolePort {
    pub fn new(config: &SerialConfig) -> Self {
        Self {
            path: config.port.clone(),
            baud_rate: config.baud_rate,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            port: None,
        }
    }

    fn handle(&self) -> Result<SharedPort> {
        self.port
            .clone()
            .ok_or_else(|| PylonError::transport(format!("{} is not open", self.path)))
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn SerialPort>) -> std::io::Result<T> + Send + 'static,
    {
        let port = self.handle()?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = port.blocking_lock();
            op(&mut *guard).map_err(|e| PylonError::transport(format!("{}: {}", path, e)))
        })
        .await
        .map_err(|e| PylonError::transport(format!("serial worker failed: {}", e)))?
    }
}

#[async_trait::async_trait]
impl ConsolePort for SerialConsolePort {
    async fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let path = self.path.clone();
        let baud = self.baud_rate;
        let timeout = self.read_timeout;
        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(path, baud)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(timeout)
                .open()
        })
        .await
        .map_err(|e| PylonError::transport(format!("serial worker failed: {}", e)))??;
        self.port = Some(Arc::new(Mutex::new(opened)));
        Ok(())
    }

    async fn close(&mut self) {
        // Dropping the last handle closes the device
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let bytes = bytes.to_vec();
        self.run_blocking(move |p| {
            p.write_all(&bytes)?;
            p.flush()
        })
        .await
    }

    async fn read_available(&mut self) -> Result<Vec<u8>> {
        self.run_blocking(|p| {
            let mut out = Vec::new();
            loop {
                let pending = p.bytes_to_read().map_err(std::io::Error::from)? as usize;
                if pending == 0 || out.len() >= MAX_READ_BYTES {
                    break;
                }
                let mut buf = vec![0u8; pending];
                let n = p.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                out.extend_from_slice(&buf[..n]);
            }
            Ok(out)
        })
        .await
    }

    async fn clear_input(&mut self) -> Result<()> {
        self.run_blocking(|p| p.clear(ClearBuffer::Input).map_err(std::io::Error::from))
            .await
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }
}
