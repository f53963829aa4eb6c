//! Configuration load/save orchestration over the byte store.
//!
//! Loading never overwrites the in-memory defaults on failure: a
//! missing blob means factory defaults, and a corrupt blob is discarded
//! with a warning rather than half-trusted.

use pdm_common::config::{PdmConfig, StoreError};
use pdm_common::crc::crc16;
use tracing::{info, warn};

use crate::adapters::ConfigStore;

/// Why a stored configuration could not be used.
#[derive(Debug)]
pub enum ConfigLoadError {
    /// The store is empty or carries no magic; not a fault.
    NoSaved,
    /// The payload failed its integrity check; defaults stay in force.
    Corrupt { stored: u16, computed: u16 },
    /// The backing store itself failed.
    Store(StoreError),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSaved => write!(f, "no saved configuration"),
            Self::Corrupt { stored, computed } => write!(
                f,
                "config CRC mismatch (stored 0x{stored:04X}, computed 0x{computed:04X}), stored payload discarded"
            ),
            Self::Store(e) => write!(f, "config store: {e}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

/// A successfully loaded configuration with its verified CRC.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: PdmConfig,
    pub crc: u16,
}

/// Load and verify the stored configuration.
pub fn load_config(store: &mut dyn ConfigStore) -> Result<LoadedConfig, ConfigLoadError> {
    let blob = match store.load().map_err(ConfigLoadError::Store)? {
        Some(blob) => blob,
        None => return Err(ConfigLoadError::NoSaved),
    };
    match PdmConfig::from_bytes(&blob) {
        Ok(config) => {
            let crc = u16::from_le_bytes([blob[2], blob[3]]);
            info!(crc = format_args!("0x{crc:04X}"), "configuration loaded");
            Ok(LoadedConfig { config, crc })
        }
        Err(StoreError::NoConfig { .. }) => Err(ConfigLoadError::NoSaved),
        Err(StoreError::CrcMismatch { stored, computed }) => {
            warn!(
                stored = format_args!("0x{stored:04X}"),
                computed = format_args!("0x{computed:04X}"),
                "stored configuration corrupt, keeping defaults"
            );
            Err(ConfigLoadError::Corrupt { stored, computed })
        }
        Err(e) => Err(ConfigLoadError::Store(e)),
    }
}

/// Load at boot: fall back to defaults on any failure, surfacing the
/// reason in the log rather than failing startup.
pub fn load_or_default(store: &mut dyn ConfigStore) -> PdmConfig {
    match load_config(store) {
        Ok(loaded) => loaded.config,
        Err(ConfigLoadError::NoSaved) => {
            info!("no saved configuration, using defaults");
            PdmConfig::default()
        }
        Err(e) => {
            warn!("{e}");
            PdmConfig::default()
        }
    }
}

/// Persist the configuration; returns the payload CRC on success.
pub fn save_config(store: &mut dyn ConfigStore, cfg: &PdmConfig) -> Result<u16, StoreError> {
    let blob = cfg.to_bytes();
    let crc = crc16(&blob[4..]);
    store.save(&blob)?;
    info!(crc = format_args!("0x{crc:04X}"), "configuration saved");
    Ok(crc)
}

// ─── Tests ──────────────────────────────────────────────────────────
