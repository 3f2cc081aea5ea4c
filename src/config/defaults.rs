use super::*;

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 2000,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            flush_delay_ms: 100,
            settle_delay_ms: 1000,
            retry_delay_ms: 1000,
            info_settle_delay_ms: 1000,
            stat_settle_delay_ms: 1500,
            clock_settle_delay_ms: 500,
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        // US2000 class module
        Self {
            module_capacity_kwh: 2.4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/pylonlink.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            timing: TimingConfig::default(),
            battery: BatteryConfig::default(),
            mode: PollMode::default(),
            poll_interval_ms: None,
            clock: ClockConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
        }
    }
}
