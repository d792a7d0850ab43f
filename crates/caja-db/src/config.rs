//! # Caja Configuration
//!
//! Settings for one till: which branch it sells for, where its database
//! lives, and the business knobs the coordinators read.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CAJA_BRANCH=central                                                │
//! │     CAJA_DB_PATH=/var/lib/caja/caja.db                                 │
//! │     CAJA_POINTS_PER_UNIT=1                                             │
//! │     CAJA_REJECT_OVERPAYMENT=true                                       │
//! │     CAJA_MAX_CONNECTIONS=5                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/caja-pos/caja.toml (Linux)                               │
//! │     ~/Library/Application Support/pe.caja.pos/caja.toml (macOS)        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # caja.toml
//! [store]
//! branch = "central"
//! name = "Bodega Central"
//!
//! [database]
//! path = "/var/lib/caja/caja.db"
//! max_connections = 5
//!
//! [loyalty]
//! points_per_unit = "1"   # decimal, "0.5" = one point per two units
//!
//! [debts]
//! reject_overpayment = false
//! ```

use caja_core::{OverpaymentPolicy, PointsRate, SaleSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No config path available on this platform")]
    NoConfigPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Branch this till sells for; stamped on every sale.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Display name.
    #[serde(default = "default_store_name")]
    pub name: String,
}

fn default_branch() -> String {
    "central".to_string()
}

fn default_store_name() -> String {
    "Caja POS".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            branch: default_branch(),
            name: default_store_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data dir.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("pe", "caja", "pos")
        .map(|dirs| dirs.data_dir().join("caja.db"))
        .unwrap_or_else(|| PathBuf::from("./caja.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltySettings {
    /// Points per currency unit, as a decimal string.
    #[serde(default = "default_points_per_unit")]
    pub points_per_unit: String,
}

fn default_points_per_unit() -> String {
    "1".to_string()
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        LoyaltySettings {
            points_per_unit: default_points_per_unit(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSettings {
    /// Refuse payments larger than the remaining balance.
    #[serde(default)]
    pub reject_overpayment: bool,
}

// =============================================================================
// CajaConfig
// =============================================================================

/// Complete configuration for one till.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CajaConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub loyalty: LoyaltySettings,

    #[serde(default)]
    pub debts: DebtSettings,
}

impl CajaConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (caja.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoConfigPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.store.branch.trim().is_empty() {
            return Err(ConfigError::Invalid("store.branch must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        self.points_rate()?;
        Ok(())
    }

    /// Applies overrides from `lookup` (the process environment in [`load`](Self::load)).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(branch) = lookup("CAJA_BRANCH") {
            debug!(branch = %branch, "Overriding branch from environment");
            self.store.branch = branch;
        }

        if let Some(path) = lookup("CAJA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(rate) = lookup("CAJA_POINTS_PER_UNIT") {
            self.loyalty.points_per_unit = rate;
        }

        if let Some(flag) = lookup("CAJA_REJECT_OVERPAYMENT") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.debts.reject_overpayment = true,
                "0" | "false" | "no" => self.debts.reject_overpayment = false,
                _ => warn!(value = %flag, "Unknown CAJA_REJECT_OVERPAYMENT value"),
            }
        }

        if let Some(max) = lookup("CAJA_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Unparseable CAJA_MAX_CONNECTIONS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("pe", "caja", "pos")
            .map(|dirs| dirs.config_dir().join("caja.toml"))
    }

    // =========================================================================
    // Derived settings
    // =========================================================================

    pub fn points_rate(&self) -> ConfigResult<PointsRate> {
        self.loyalty.points_per_unit.parse().map_err(|e| {
            ConfigError::Invalid(format!(
                "loyalty.points_per_unit '{}': {}",
                self.loyalty.points_per_unit, e
            ))
        })
    }

    pub fn overpayment_policy(&self) -> OverpaymentPolicy {
        if self.debts.reject_overpayment {
            OverpaymentPolicy::Reject
        } else {
            OverpaymentPolicy::Accept
        }
    }

    /// Settings handed to `SaleCoordinator` and `DebtLedger`.
    pub fn sale_settings(&self) -> ConfigResult<SaleSettings> {
        Ok(SaleSettings {
            points_rate: self.points_rate()?,
            overpayment: self.overpayment_policy(),
        })
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }

    pub fn branch(&self) -> &str {
        &self.store.branch
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
