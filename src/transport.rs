//! Serial console transport
//!
//! [`ConsolePort`] is the byte-level seam (open, write, read what is
//! buffered). [`SerialTransport`] layers the console exchange on top: the
//! device has no framing, so a response is whatever arrived after a fixed
//! settle delay. Delays race the shutdown signal so an in-flight exchange can
//! be abandoned instead of sleeping out its full budget.

use crate::config::SerialConfig;
use crate::error::{PylonError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use std::time::Duration;
use tokio::sync::watch;

mod serial;

pub use serial::SerialConsolePort;

const LINE_TERMINATOR: &str = "\n";

/// Byte-level access to the console device
#[async_trait::async_trait]
pub trait ConsolePort: Send + Sync {
    /// Open the device; no-op when already open
    async fn open(&mut self) -> Result<()>;

    /// Release the device; a later `open` recreates it
    async fn close(&mut self);

    fn is_open(&self) -> bool;

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Everything currently buffered, possibly empty
    async fn read_available(&mut self) -> Result<Vec<u8>>;

    /// Discard buffered input
    async fn clear_input(&mut self) -> Result<()>;

    /// Human-readable device name for logs
    fn describe(&self) -> String {
        "console".to_string()
    }
}

/// Keep ASCII, drop everything else
pub fn decode_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| char::from(b))
        .collect()
}

/// Command/response exchange over a [`ConsolePort`]
pub struct SerialTransport {
    port: Box<dyn ConsolePort>,
    shutdown: watch::Receiver<bool>,
    logger: StructuredLogger,
}

impl SerialTransport {
    pub fn new(port: Box<dyn ConsolePort>, shutdown: watch::Receiver<bool>) -> Self {
        let logger = get_logger_with_context(LogContext::new("transport").with_port(&port.describe()));
        Self {
            port,
            shutdown,
            logger,
        }
    }

    /// Transport over a real serial device
    pub fn serial(config: &SerialConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self::new(Box::new(SerialConsolePort::new(config)), shutdown)
    }

    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    /// Open the port; idempotent
    pub async fn open(&mut self) -> Result<()> {
        if self.port.is_open() {
            return Ok(());
        }
        self.logger.info("Opening console port");
        if let Err(e) = self.port.open().await {
            self.logger.error(&format!("Failed to open console port: {}", e));
            self.port.close().await;
            return Err(e);
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        if self.port.is_open() {
            self.logger.debug("Closing console port");
        }
        self.port.close().await;
    }

    /// Send one command and collect the response.
    ///
    /// A bare terminator is written first and, after `flush_delay`, whatever
    /// the console echoed is discarded. Then `command` is written and the
    /// bytes that arrived within `settle_delay` are returned. Any failure
    /// closes the port so the next call starts from a fresh handle.
    pub async fn exchange(
        &mut self,
        command: &str,
        flush_delay: Duration,
        settle_delay: Duration,
    ) -> Result<String> {
        let result = self.exchange_inner(command, flush_delay, settle_delay).await;
        self.close_on_error(result).await
    }

    /// Wait once more and return what arrived since the last read
    pub async fn read_more(&mut self, delay: Duration) -> Result<String> {
        let result = async {
            self.wait(delay).await?;
            self.read_text().await
        }
        .await;
        self.close_on_error(result).await
    }

    async fn exchange_inner(
        &mut self,
        command: &str,
        flush_delay: Duration,
        settle_delay: Duration,
    ) -> Result<String> {
        self.open().await?;

        self.port.write_all(LINE_TERMINATOR.as_bytes()).await?;
        self.wait(flush_delay).await?;
        self.port.clear_input().await?;

        self.logger.debug(&format!("Sending '{}'", command));
        self.port
            .write_all(format!("{}{}", command, LINE_TERMINATOR).as_bytes())
            .await?;
        self.wait(settle_delay).await?;

        let text = self.read_text().await?;
        self.logger.trace(&format!(
            "Received {} bytes for '{}': {:?}",
            text.len(),
            command,
            text
        ));
        Ok(text)
    }

    async fn read_text(&mut self) -> Result<String> {
        if !self.port.is_open() {
            return Err(PylonError::transport("console port is not open"));
        }
        let bytes = self.port.read_available().await?;
        Ok(decode_ascii(&bytes))
    }

    async fn close_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            self.logger
                .warn(&format!("Exchange failed ({}); closing port", e));
            self.port.close().await;
        }
        result
    }

    /// Sleep for `delay` unless shutdown is signalled first
    async fn wait(&self, delay: Duration) -> Result<()> {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            signalled = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => {
                if signalled {
                    Err(PylonError::cancelled("shutdown during console exchange"))
                } else {
                    // Sender gone: nobody can cancel any more
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
            }
        }
    }
}
