//! Configuration for regmirror
//!
//! Centralized configuration with sensible defaults. The server binary maps
//! command-line arguments onto the builder; loading a configuration file is
//! the host's business, not the engine's.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RegMirrorError, Result};

/// Address window of one register space.
///
/// Requests address cells by their absolute protocol address; a space answers
/// for the contiguous range `[start_address, start_address + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceConfig {
    /// First addressable cell
    pub start_address: u16,

    /// Number of addressable cells
    pub count: u16,
}

impl SpaceConfig {
    pub fn new(start_address: u16, count: u16) -> Self {
        Self {
            start_address,
            count,
        }
    }
}

/// Main configuration for a regmirror instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Modbus unit id this server answers for
    pub unit_id: u8,

    // -------------------------------------------------------------------------
    // Register Map Configuration
    // -------------------------------------------------------------------------
    /// Coil (discrete output) window
    pub coils: SpaceConfig,

    /// Discrete input window
    pub discrete_inputs: SpaceConfig,

    /// Input register window
    pub input_registers: SpaceConfig,

    /// Holding register window
    pub holding_registers: SpaceConfig,

    // -------------------------------------------------------------------------
    // Persistence Configuration
    // -------------------------------------------------------------------------
    /// SQLite database file backing the register map
    pub db_path: PathBuf,

    // -------------------------------------------------------------------------
    // Reporting Configuration
    // -------------------------------------------------------------------------
    /// Interval between counter report lines
    pub report_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:1502".to_string(),
            max_connections: 32,
            unit_id: 1,
            coils: SpaceConfig::new(0, 100),
            discrete_inputs: SpaceConfig::new(0, 100),
            input_registers: SpaceConfig::new(0, 100),
            holding_registers: SpaceConfig::new(0, 100),
            db_path: PathBuf::from("./regmirror.db"),
            report_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration for fatal startup faults.
    ///
    /// A window must fit the 16-bit address range, and the connection table
    /// needs at least one slot.
    pub fn validate(&self) -> Result<()> {
        for (name, space) in [
            ("coil", self.coils),
            ("discrete input", self.discrete_inputs),
            ("input register", self.input_registers),
            ("holding register", self.holding_registers),
        ] {
            let end = u32::from(space.start_address) + u32::from(space.count);
            if end > 0x1_0000 {
                return Err(RegMirrorError::Config(format!(
                    "{name} window {}..{end} exceeds the 16-bit address range",
                    space.start_address
                )));
            }
        }

        if self.max_connections == 0 {
            return Err(RegMirrorError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }

        if self.report_interval.is_zero() {
            return Err(RegMirrorError::Config(
                "report_interval must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the Modbus unit id
    pub fn unit_id(mut self, unit_id: u8) -> Self {
        self.config.unit_id = unit_id;
        self
    }

    /// Set the coil window
    pub fn coils(mut self, start_address: u16, count: u16) -> Self {
        self.config.coils = SpaceConfig::new(start_address, count);
        self
    }

    /// Set the discrete input window
    pub fn discrete_inputs(mut self, start_address: u16, count: u16) -> Self {
        self.config.discrete_inputs = SpaceConfig::new(start_address, count);
        self
    }

    /// Set the input register window
    pub fn input_registers(mut self, start_address: u16, count: u16) -> Self {
        self.config.input_registers = SpaceConfig::new(start_address, count);
        self
    }

    /// Set the holding register window
    pub fn holding_registers(mut self, start_address: u16, count: u16) -> Self {
        self.config.holding_registers = SpaceConfig::new(start_address, count);
        self
    }

    /// Set the backing database path
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Set the counter report interval
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.config.report_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
