use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::capability::CapabilityId;
use crate::principal::PrincipalId;

/// A transaction the registry refused to process.
///
/// Serialized with a `kind` tag so rejections survive the HTTP hop intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegistryError {
    #[error("signature does not verify for signer {signer}")]
    InvalidSignature { signer: PrincipalId },
    #[error("signer {signer} is not the fee payer {fee_payer}")]
    SignerMismatch {
        signer: PrincipalId,
        fee_payer: PrincipalId,
    },
    #[error("insufficient funds: need {needed} units, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("airdrop of {requested} units exceeds faucet limit {limit}")]
    AirdropLimitExceeded { requested: u64, limit: u64 },
    #[error("airdrops must be signed by the faucet")]
    NotFaucet,
    #[error("operation expired at slot {expires_at}, registry is at slot {slot}")]
    Expired { expires_at: u64, slot: u64 },
    #[error("invalid instruction: {reason}")]
    InvalidInstruction { reason: String },
    #[error("capability {capability} already exists")]
    CapabilityExists { capability: CapabilityId },
    #[error("capability {capability} not found")]
    UnknownCapability { capability: CapabilityId },
    #[error("{signer} is not the owner of capability {capability}")]
    NotOwner {
        capability: CapabilityId,
        signer: PrincipalId,
    },
    #[error("{signer} holds no use delegation for capability {capability}")]
    NoDelegation {
        capability: CapabilityId,
        signer: PrincipalId,
    },
    #[error("use delegation of {signer} for capability {capability} was revoked")]
    DelegationRevoked {
        capability: CapabilityId,
        signer: PrincipalId,
    },
    #[error("delegation allows {allowed} more uses, {requested} requested")]
    DelegatedUsesExhausted { allowed: u64, requested: u64 },
    #[error("capability has {remaining} uses remaining, {requested} requested")]
    UsesExhausted { remaining: u64, requested: u64 },
    #[error("capability {capability} has been burned")]
    Burned { capability: CapabilityId },
}

impl RegistryError {
    /// True for rejections of a use attempt caused by missing, revoked or
    /// exhausted usage rights, as opposed to malformed or unfunded requests.
    pub fn is_use_rejection(&self) -> bool {
        matches!(
            self,
            Self::NoDelegation { .. }
                | Self::DelegationRevoked { .. }
                | Self::DelegatedUsesExhausted { .. }
                | Self::UsesExhausted { .. }
                | Self::Burned { .. }
        )
    }

    pub fn is_funding_failure(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. } | Self::AirdropLimitExceeded { .. } | Self::NotFaucet
        )
    }
}

/// Failures seen by a ledger client.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("rejected by registry: {0}")]
    Rejected(#[from] RegistryError),
    #[error("transaction {signature} not confirmed within {waited:?}")]
    ConfirmationTimeout { signature: String, waited: Duration },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl LedgerError {
    pub fn rejection(&self) -> Option<&RegistryError> {
        match self {
            Self::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid locally supplied configuration (capability builder, run options).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid config: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
