//! Engine configuration.
//!
//! Loaded from TOML:
//!
//! ```toml
//! engine_address = "0x00000000000000000000000000000000000000ee"
//! admin = "0x00000000000000000000000000000000000000ad"
//! max_pool_count = 1000000
//! max_grid_tokens = 20
//!
//! [default_fee]
//! fee_ppm = 2000
//! receiver = { kind = "internal_wallet", value = "0x00000000000000000000000000000000000000fe" }
//! ```

use std::{fs, path::Path};

use alloy_primitives::Address;
use serde::Deserialize;
use thiserror::Error;

use crate::ledger::{FeeRule, PPM_DENOMINATOR};
use crate::types::{Location, PoolId};

pub const DEFAULT_MAX_POOL_COUNT: usize = 1_000_000;
pub const DEFAULT_MAX_GRID_TOKENS: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// The engine's own identity; never a valid token or destination.
    pub engine_address: Address,
    /// May change the fee schedule.
    pub admin: Address,
    #[serde(default = "default_max_pool_count")]
    pub max_pool_count: usize,
    #[serde(default = "default_max_grid_tokens")]
    pub max_grid_tokens: usize,
    /// Falls back to a zero fee credited to the admin's internal wallet.
    #[serde(default)]
    pub default_fee: Option<FeeRule>,
}

fn default_max_pool_count() -> usize {
    DEFAULT_MAX_POOL_COUNT
}

fn default_max_grid_tokens() -> usize {
    DEFAULT_MAX_GRID_TOKENS
}

impl EngineConfig {
    pub fn new(engine_address: Address, admin: Address) -> Self {
        Self {
            engine_address,
            admin,
            max_pool_count: DEFAULT_MAX_POOL_COUNT,
            max_grid_tokens: DEFAULT_MAX_GRID_TOKENS,
            default_fee: None,
        }
    }

    pub fn with_default_fee(mut self, fee_ppm: u32, receiver: Location) -> Self {
        self.default_fee = Some(FeeRule { fee_ppm, receiver });
        self
    }

    pub fn with_limits(mut self, max_pool_count: usize, max_grid_tokens: usize) -> Self {
        self.max_pool_count = max_pool_count;
        self.max_grid_tokens = max_grid_tokens;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&s)
    }

    pub fn default_fee_rule(&self) -> FeeRule {
        self.default_fee.unwrap_or(FeeRule {
            fee_ppm: 0,
            receiver: Location::InternalWallet(self.admin),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, msg: &str| {
            Err(ConfigError::InvalidValue(field.to_string(), msg.to_string()))
        };

        if self.engine_address.is_zero() {
            return invalid("engine_address", "must not be the zero address");
        }
        if self.admin.is_zero() || self.admin == self.engine_address {
            return invalid("admin", "must be a non-zero address other than the engine");
        }
        if self.max_pool_count == 0 {
            return invalid("max_pool_count", "must be positive");
        }
        if self.max_pool_count as u64 > PoolId::MAX_SEQUENCE {
            return invalid("max_pool_count", "exceeds the pool id sequence space");
        }
        if self.max_grid_tokens < 2 {
            return invalid("max_grid_tokens", "must be at least 2");
        }

        let fee = self.default_fee_rule();
        if fee.fee_ppm > PPM_DENOMINATOR {
            return invalid("default_fee.fee_ppm", "must not exceed 1000000");
        }
        match fee.receiver {
            Location::ExternalWallet(wallet) | Location::InternalWallet(wallet) => {
                if wallet.is_zero() || wallet == self.engine_address {
                    return invalid(
                        "default_fee.receiver",
                        "must not be the zero address or the engine",
                    );
                }
            }
            Location::Pool(_) => {
                return invalid("default_fee.receiver", "must be a wallet");
            }
        }
        Ok(())
    }
}
