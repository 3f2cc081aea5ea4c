//! Optional persistence of the energy counters
//!
//! Counters are session-scoped unless `persistence.energy_state_file` is set.
//! When it is, the integrator state is written as pretty JSON after every
//! accepted snapshot and read back once at startup.

use crate::energy::EnergyIntegratorState;
use crate::error::Result;
use crate::logging::get_logger;
use std::path::{Path, PathBuf};

/// JSON file holding [`EnergyIntegratorState`]
pub struct EnergyStore {
    file_path: PathBuf,
    logger: crate::logging::StructuredLogger,
}

impl EnergyStore {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            logger: get_logger("persistence"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Load saved counters; `None` when no file exists yet
    pub fn load(&self) -> Result<Option<EnergyIntegratorState>> {
        if !self.file_path.exists() {
            self.logger
                .info("No energy state file found, starting counters at zero");
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.file_path)?;
        let state: EnergyIntegratorState = serde_json::from_str(&contents)?;
        self.logger.info(&format!(
            "Loaded energy counters from {} (in={:.3} kWh, out={:.3} kWh)",
            self.file_path.display(),
            state.cumulative_in_kwh,
            state.cumulative_out_kwh
        ));
        Ok(Some(state))
    }

    /// Write counters, replacing the previous file in one rename
    pub async fn save(&self, state: &EnergyIntegratorState) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(state)?;
        let tmp = self.file_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.file_path).await?;
        self.logger.debug("Saved energy counters to disk");
        Ok(())
    }
}
