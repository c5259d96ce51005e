use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::capability::{CapabilityConfig, CapabilityId};
use crate::error::{ConfigError, RegistryError};
use crate::principal::{Principal, PrincipalId};

/// A single registry instruction. The operation's fee payer is its authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Instruction {
    Airdrop {
        recipient: PrincipalId,
        amount: u64,
    },
    Transfer {
        recipient: PrincipalId,
        amount: u64,
    },
    CreateCapability {
        capability: CapabilityId,
        config: CapabilityConfig,
    },
    ApproveUse {
        capability: CapabilityId,
        delegate: PrincipalId,
        number_of_uses: u64,
    },
    Utilize {
        capability: CapabilityId,
        number_of_uses: u64,
    },
    RevokeUse {
        capability: CapabilityId,
        delegate: PrincipalId,
    },
}

impl Instruction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Airdrop { .. } => "airdrop",
            Self::Transfer { .. } => "transfer",
            Self::CreateCapability { .. } => "create_capability",
            Self::ApproveUse { .. } => "approve_use",
            Self::Utilize { .. } => "utilize",
            Self::RevokeUse { .. } => "revoke_use",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub nonce: Uuid,
    pub fee_payer: PrincipalId,
    pub instruction: Instruction,
    /// Last slot at which the registry accepts this operation. Once it has
    /// passed, the registry may forget the signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Operation {
    /// New operation with a fresh nonce.
    pub fn new(fee_payer: PrincipalId, instruction: Instruction) -> Self {
        Self {
            nonce: Uuid::new_v4(),
            fee_payer,
            instruction,
            expires_at: None,
        }
    }

    pub fn with_nonce(nonce: Uuid, fee_payer: PrincipalId, instruction: Instruction) -> Self {
        Self {
            nonce,
            fee_payer,
            instruction,
            expires_at: None,
        }
    }

    pub fn valid_until(mut self, slot: u64) -> Self {
        self.expires_at = Some(slot);
        self
    }

    /// SHA-256 over the JSON encoding. Field order is fixed by the struct
    /// definitions, so the encoding is stable.
    pub fn digest(&self) -> [u8; 32] {
        // Structs, tagged enums, strings and integers only, with ids written
        // through `collect_str`. No map keys or fallible `Serialize` impls,
        // so encoding into a `Vec` cannot fail.
        let bytes = serde_json::to_vec(self).expect("operation encodes to JSON");
        Sha256::digest(&bytes).into()
    }

    pub fn sign(self, signer: &Principal) -> SignedOperation {
        let signature = TxSignature(signer.sign_digest(self.digest()));
        SignedOperation {
            operation: self,
            signer: signer.id(),
            signature,
        }
    }
}

/// 64-byte Schnorr signature; doubles as the transaction id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxSignature([u8; 64]);

impl TxSignature {
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxSignature({self})")
    }
}

impl FromStr for TxSignature {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes =
            hex::decode(s).map_err(|e| ConfigError::new(format!("invalid hex signature: {e}")))?;
        let bytes: [u8; 64] = bytes.try_into().map_err(|v: Vec<u8>| {
            ConfigError::new(format!("signature must be 64 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for TxSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    pub operation: Operation,
    pub signer: PrincipalId,
    pub signature: TxSignature,
}

impl SignedOperation {
    /// Check that the fee payer signed exactly this operation.
    pub fn verify(&self) -> Result<(), RegistryError> {
        if self.signer != self.operation.fee_payer {
            return Err(RegistryError::SignerMismatch {
                signer: self.signer,
                fee_payer: self.operation.fee_payer,
            });
        }
        if !self
            .signer
            .verify(self.operation.digest(), self.signature.as_bytes())
        {
            return Err(RegistryError::InvalidSignature {
                signer: self.signer,
            });
        }
        Ok(())
    }
}
