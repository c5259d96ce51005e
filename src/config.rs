//! Run options for the delegated-use demonstration.
//!
//! Loaded from an optional TOML file; every field has a default matching the
//! reference flow (2 uses, burn on exhaustion, one-of-one supply).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use use_delegation_sdk::{
    CapabilityBuilder, CapabilityConfig, ConfigError, ConfirmOptions, Metadata, UNITS_PER_COIN,
    UseMethod,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmSettings {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ConfirmSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            timeout_secs: 30,
        }
    }
}

impl From<&ConfirmSettings> for ConfirmOptions {
    fn from(s: &ConfirmSettings) -> Self {
        ConfirmOptions {
            poll_interval: Duration::from_millis(s.poll_interval_ms),
            timeout: Duration::from_secs(s.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoOptions {
    /// Airdropped to the owner in step 1.
    pub funding_amount: u64,
    /// Passed on to the delegate so it can pay its own fees.
    pub delegate_amount: u64,
    pub initial_uses: u64,
    pub use_method: UseMethod,
    pub max_supply: u64,
    pub delegated_uses: u64,
    pub metadata: Metadata,
    pub confirm: ConfirmSettings,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            funding_amount: UNITS_PER_COIN,
            delegate_amount: UNITS_PER_COIN / 2,
            initial_uses: 2,
            use_method: UseMethod::Burn,
            max_supply: 1,
            delegated_uses: 2,
            metadata: Metadata::default(),
            confirm: ConfirmSettings::default(),
        }
    }
}

impl DemoOptions {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new(format!("invalid options file: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::new(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&data)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_uses == 0 {
            return Err(ConfigError::new("initial_uses must be > 0"));
        }
        if self.delegated_uses > self.initial_uses {
            return Err(ConfigError::new(format!(
                "delegated_uses {} exceeds initial_uses {}",
                self.delegated_uses, self.initial_uses
            )));
        }
        if self.use_method == UseMethod::Burn && self.initial_uses < 2 {
            return Err(ConfigError::new(
                "burn with a single use would burn the capability before it can be revoked; \
                 use initial_uses >= 2 or another use_method",
            ));
        }
        if self.delegate_amount == 0 || self.delegate_amount >= self.funding_amount {
            return Err(ConfigError::new(
                "delegate_amount must be > 0 and less than funding_amount",
            ));
        }
        if self.max_supply == 0 {
            return Err(ConfigError::new("max_supply must be >= 1"));
        }
        self.capability_config().map(|_| ())
    }

    pub fn capability_config(&self) -> Result<CapabilityConfig, ConfigError> {
        CapabilityBuilder::new()
            .metadata(self.metadata.clone())
            .uses(self.use_method, self.initial_uses)
            .max_supply(self.max_supply)
            .build()
    }

    pub fn confirm_options(&self) -> ConfirmOptions {
        ConfirmOptions::from(&self.confirm)
    }
}
