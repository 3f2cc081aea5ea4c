#![allow(dead_code)]

use pylonlink::config::Config;
use pylonlink::error::{PylonError, Result};
use pylonlink::transport::{ConsolePort, SerialTransport};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

pub const PWR: &str = "\
pwr\r
@\r
Power Volt   Curr   Tempr  Tlow   Thigh  Vlow   Vhigh  Base.St  Volt.St  Curr.St  Temp.St  Coulomb  Time                 B.V.St   B.T.St\r
1     50691  3806   17000  16000  17000  3378   3382   Charge   Normal   Normal   Normal   85%      2025-12-21 21:14:53  Normal   Normal\r
2     50688  3800   17500  16000  17000  3377   3381   Charge   Normal   Normal   Normal   84%      2025-12-21 21:14:53  Normal   Normal\r
3     -      -      -      -      -      -      -      Absent   -        -        -        -        -                    -        -\r
Command completed successfully\r
$$\r
pylon>";

pub const PWR_ALL_ABSENT: &str = "\
pwr\r
@\r
Power Volt   Curr   Tempr  Tlow   Thigh  Vlow   Vhigh  Base.St  Volt.St  Curr.St  Temp.St  Coulomb\r
1     -      -      -      -      -      -      -      Absent   -        -        -        -\r
2     -      -      -      -      -      -      -      Absent   -        -        -        -\r
$$\r
pylon>";

pub const INFO: &str = "\
info\r
@\r
Device address      : 1\r
Manufacturer        : Pylon\r
Device name         : US2000C\r
Main Soft version   : B66.6\r
Barcode             : PPTBH02400710243\r
Specification       : 48V/50AH\r
Cell Number         : 15\r
$$\r
pylon>";

pub const STAT: &str = "\
stat\r
@\r
Device address      : 1\r
CYCLE Times         : 430\r
SOH                 : 98\r
Device address      : 2\r
CYCLE Times         : 433\r
SOH                 : 96\r
Device address      : 7\r
CYCLE Times         : 999\r
$$\r
pylon>";

pub const TIME: &str = "time\r\n@\r\nDs3231 2025-12-21 21:14:53\r\n$$\r\npylon>";

#[derive(Debug, Default)]
pub struct PortLog {
    /// Commands written, without the bare flush terminators
    pub commands: Vec<String>,
    pub opens: usize,
    pub closes: usize,
}

/// Console double answering each command from a script.
///
/// Every reply is a list of chunks: the first is readable right after the
/// command, each further chunk becomes readable on the next read. When a
/// command has several replies queued they are used in order and the last
/// one repeats.
pub struct ScriptedPort {
    open: bool,
    replies: HashMap<String, VecDeque<Vec<String>>>,
    pending: VecDeque<String>,
    failing_commands: Vec<String>,
    failing_opens: usize,
    log: Arc<Mutex<PortLog>>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self {
            open: false,
            replies: HashMap::new(),
            pending: VecDeque::new(),
            failing_commands: Vec::new(),
            failing_opens: 0,
            log: Arc::new(Mutex::new(PortLog::default())),
        }
    }

    /// Standard healthy stack: info, pwr, stat and time all answer
    pub fn healthy() -> Self {
        Self::new()
            .reply("info", &[INFO])
            .reply("pwr", &[PWR])
            .reply("stat", &[STAT])
            .reply("time", &[TIME])
    }

    pub fn reply(mut self, command: &str, chunks: &[&str]) -> Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(chunks.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn fail_command(mut self, command: &str) -> Self {
        self.failing_commands.push(command.to_string());
        self
    }

    pub fn fail_opens(mut self, times: usize) -> Self {
        self.failing_opens = times;
        self
    }

    pub fn log(&self) -> Arc<Mutex<PortLog>> {
        self.log.clone()
    }

    fn next_reply(&mut self, command: &str) -> Vec<String> {
        let key = if self.replies.contains_key(command) {
            command.to_string()
        } else {
            command.split_whitespace().next().unwrap_or_default().to_string()
        };
        match self.replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => vec!["Unknown command\r\n$$\r\npylon>".to_string()],
        }
    }
}

#[async_trait::async_trait]
impl ConsolePort for ScriptedPort {
    async fn open(&mut self) -> Result<()> {
        self.log.lock().unwrap().opens += 1;
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(PylonError::transport("No such file or directory"));
        }
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) {
        if self.open {
            self.log.lock().unwrap().closes += 1;
        }
        self.open = false;
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(bytes);
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        if command.is_empty() {
            // Stale prompt the session must throw away
            self.pending.push_back("\r\n$$\r\npylon>".to_string());
            return Ok(());
        }
        let name = command.split_whitespace().next().unwrap_or_default().to_string();
        if self.failing_commands.contains(&name) {
            return Err(PylonError::transport("Input/output error"));
        }
        self.log.lock().unwrap().commands.push(command.clone());
        self.pending = self.next_reply(&command).into();
        Ok(())
    }

    async fn read_available(&mut self) -> Result<Vec<u8>> {
        Ok(self.pending.pop_front().unwrap_or_default().into_bytes())
    }

    async fn clear_input(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}

/// Defaults with millisecond waits so scripted exchanges run fast
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.timing.flush_delay_ms = 1;
    config.timing.settle_delay_ms = 1;
    config.timing.retry_delay_ms = 1;
    config.timing.info_settle_delay_ms = 1;
    config.timing.stat_settle_delay_ms = 1;
    config.timing.clock_settle_delay_ms = 1;
    config
}

pub fn scripted_transport(port: ScriptedPort) -> (SerialTransport, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    (SerialTransport::new(Box::new(port), rx), tx)
}
