//! # pylonlink - Pylontech battery stack console poller
//!
//! Polls a chain of battery modules over their human-oriented serial console
//! and turns the free-form ASCII responses into structured telemetry:
//! per-module readings, stack aggregates and cumulative energy counters.
//!
//! ## Architecture
//!
//! - `transport`: serial console access and the timed command exchange
//! - `parser`: tolerant parsers for `pwr`, `info`, `stat` and `time`
//! - `aggregate`: stack-level means, sums and rounding
//! - `energy`: charge/discharge integration across polls
//! - `session`: one poll cycle, from commands to a finalized snapshot
//! - `poller`: fixed-interval scheduling and publication
//! - `persistence`: optional on-disk energy counters
//! - `web`: read-only HTTP API
//! - `config`, `logging`, `error`: ambient plumbing

pub mod aggregate;
pub mod config;
pub mod energy;
pub mod error;
pub mod logging;
pub mod model;
pub mod parser;
pub mod persistence;
pub mod poller;
pub mod session;
pub mod transport;
pub mod web;


// Re-export commonly used types
pub use config::Config;
pub use error::{PylonError, Result};
pub use model::{DeviceInfo, ModuleReading, StatEntry, SystemSnapshot};
pub use poller::{Poller, PollerHandles, PollerStatus};
pub use session::{CommandSession, CycleFailure, CycleStage};
pub use transport::{ConsolePort, SerialTransport};
