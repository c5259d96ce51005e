use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::principal::PrincipalId;

const CAPABILITY_SEED: &[u8] = b"capability";

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_SYMBOL_LENGTH: usize = 10;
pub const MAX_URI_LENGTH: usize = 200;
pub const MAX_SELLER_FEE_BASIS_POINTS: u16 = 10_000;

/// Identifier of a capability, derived from its owner and creation nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CapabilityId([u8; 32]);

impl CapabilityId {
    /// `sha256("capability" || owner || nonce)`.
    pub fn derive(owner: &PrincipalId, nonce: &Uuid) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(CAPABILITY_SEED);
        hasher.update(owner.as_bytes());
        hasher.update(nonce.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityId({self})")
    }
}

impl FromStr for CapabilityId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes =
            hex::decode(s).map_err(|e| ConfigError::new(format!("invalid capability id: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConfigError::new("capability id must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for CapabilityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CapabilityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What happens to the capability as its uses run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UseMethod {
    /// The token is burned when the last use is spent.
    #[default]
    Burn,
    /// Uses are spent; the token survives.
    Multiple,
    /// Exactly one use.
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uses {
    pub use_method: UseMethod,
    pub total: u64,
    pub remaining: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub seller_fee_basis_points: u16,
}

impl Metadata {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.chars().count() > MAX_NAME_LENGTH {
            return Err(ConfigError::new(format!(
                "name longer than {MAX_NAME_LENGTH} characters"
            )));
        }
        if self.symbol.chars().count() > MAX_SYMBOL_LENGTH {
            return Err(ConfigError::new(format!(
                "symbol longer than {MAX_SYMBOL_LENGTH} characters"
            )));
        }
        if self.uri.chars().count() > MAX_URI_LENGTH {
            return Err(ConfigError::new(format!(
                "uri longer than {MAX_URI_LENGTH} characters"
            )));
        }
        if self.seller_fee_basis_points > MAX_SELLER_FEE_BASIS_POINTS {
            return Err(ConfigError::new(format!(
                "seller_fee_basis_points {} exceeds {MAX_SELLER_FEE_BASIS_POINTS}",
                self.seller_fee_basis_points
            )));
        }
        Ok(())
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            name: "name".into(),
            symbol: "symbol".into(),
            uri: "https://5lnur4iv4v5bmbk6zfyjecgkk4jk53xujvoestodi3vsr7lqhm.arweave.net/6ttI8RXlehYFXslwkgjKVxKu7vRNXElNw0brKP1w-O4/".into(),
            seller_fee_basis_points: 10,
        }
    }
}

/// A revocable grant letting a non-owner spend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseDelegation {
    pub delegate: PrincipalId,
    pub allowed_uses: u64,
}

/// Registry-side view of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityState {
    pub id: CapabilityId,
    pub owner: PrincipalId,
    pub metadata: Metadata,
    pub uses: Uses,
    pub supply: u64,
    pub max_supply: u64,
    pub delegation: Option<UseDelegation>,
    pub revoked: bool,
    pub burned: bool,
}

impl CapabilityState {
    pub fn delegate(&self) -> Option<PrincipalId> {
        self.delegation.map(|d| d.delegate)
    }

    pub fn remaining_uses(&self) -> u64 {
        self.uses.remaining
    }
}

/// Fully validated parameters for creating a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub metadata: Metadata,
    pub uses: Uses,
    pub max_supply: u64,
}

impl CapabilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.metadata.validate()?;
        if self.uses.total == 0 {
            return Err(ConfigError::new("total uses must be > 0"));
        }
        if self.uses.remaining > self.uses.total {
            return Err(ConfigError::new(format!(
                "remaining uses {} exceed total {}",
                self.uses.remaining, self.uses.total
            )));
        }
        if self.uses.use_method == UseMethod::Single && self.uses.total != 1 {
            return Err(ConfigError::new("single use method requires exactly 1 use"));
        }
        if self.max_supply == 0 {
            return Err(ConfigError::new("max_supply must be >= 1"));
        }
        Ok(())
    }
}

/// Builder for capability creation parameters.
pub struct CapabilityBuilder {
    metadata: Metadata,
    use_method: UseMethod,
    uses: Option<u64>,
    max_supply: u64,
}

impl CapabilityBuilder {
    pub fn new() -> Self {
        Self {
            metadata: Metadata::default(),
            use_method: UseMethod::Burn,
            uses: None,
            max_supply: 1,
        }
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn uses(mut self, use_method: UseMethod, total: u64) -> Self {
        self.use_method = use_method;
        self.uses = Some(total);
        self
    }

    pub fn max_supply(mut self, max_supply: u64) -> Self {
        self.max_supply = max_supply;
        self
    }

    pub fn build(self) -> Result<CapabilityConfig, ConfigError> {
        let total = self
            .uses
            .ok_or_else(|| ConfigError::new("use count required"))?;
        let config = CapabilityConfig {
            metadata: self.metadata,
            uses: Uses {
                use_method: self.use_method,
                total,
                remaining: total,
            },
            max_supply: self.max_supply,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for CapabilityBuilder {
    fn default() -> Self {
        Self::new()
    }
}
