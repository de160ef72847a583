use framelink_frame::{FrameConfig, FrameError};
use serde::{Deserialize, Serialize};

use crate::claim::ClaimMode;
use crate::error::Result;

/// Default ID listener table size.
pub const DEFAULT_MAX_ID_LISTENERS: usize = 8;

/// Default type listener table size.
pub const DEFAULT_MAX_TYPE_LISTENERS: usize = 8;

/// Default generic listener table size.
pub const DEFAULT_MAX_GENERIC_LISTENERS: usize = 4;

/// Engine configuration, fixed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wire layout, buffer sizes, stall timeout and peer role.
    pub frame: FrameConfig,
    /// Capacity of the ID listener table.
    pub max_id_listeners: usize,
    /// Capacity of the type listener table.
    pub max_type_listeners: usize,
    /// Capacity of the generic listener table.
    pub max_generic_listeners: usize,
    /// Transmit claim strategy.
    pub claim: ClaimMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            max_id_listeners: DEFAULT_MAX_ID_LISTENERS,
            max_type_listeners: DEFAULT_MAX_TYPE_LISTENERS,
            max_generic_listeners: DEFAULT_MAX_GENERIC_LISTENERS,
            claim: ClaimMode::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the frame layout and listener capacities.
    pub fn validate(&self) -> Result<()> {
        self.frame.validate()?;
        for (name, capacity) in [
            ("max_id_listeners", self.max_id_listeners),
            ("max_type_listeners", self.max_type_listeners),
            ("max_generic_listeners", self.max_generic_listeners),
        ] {
            if capacity == 0 {
                return Err(FrameError::InvalidConfig(format!("{name} must be at least 1")).into());
            }
        }
        Ok(())
    }
}
