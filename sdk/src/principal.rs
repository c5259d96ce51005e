use kaspa_addresses::{Address, Prefix, Version};
use rand::thread_rng;
use secp256k1::{Keypair, Message, XOnlyPublicKey, schnorr};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Identifier of a principal: its 32-byte x-only Schnorr public key.
///
/// Displayed and serialized as a testnet P2PK address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrincipalId([u8; 32]);

impl PrincipalId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn address(&self) -> Address {
        Address::new(Prefix::Testnet, Version::PubKey, self.0.as_slice())
    }

    /// Check a 64-byte Schnorr signature over `digest` against this key.
    pub fn verify(&self, digest: [u8; 32], signature: &[u8]) -> bool {
        let Ok(pubkey) = XOnlyPublicKey::from_slice(&self.0) else {
            return false;
        };
        let Ok(sig) = schnorr::Signature::from_slice(signature) else {
            return false;
        };
        let msg = Message::from_digest(digest);
        secp256k1::SECP256K1
            .verify_schnorr(&sig, &msg, &pubkey)
            .is_ok()
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address())
    }
}

impl fmt::Debug for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrincipalId({})", hex::encode(self.0))
    }
}

impl FromStr for PrincipalId {
    type Err = ConfigError;

    /// Accepts a testnet P2PK address or a 64-character hex public key.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(bytes) = hex::decode(s) {
            let bytes: [u8; 32] = bytes
                .try_into()
                .map_err(|_| ConfigError::new("public key must be 32 bytes"))?;
            return Ok(Self(bytes));
        }
        let addr = Address::try_from(s)
            .map_err(|e| ConfigError::new(format!("invalid address {s}: {e}")))?;
        if !matches!(addr.version, Version::PubKey) {
            return Err(ConfigError::new(format!("{s} is not a P2PK address")));
        }
        let bytes: [u8; 32] = addr
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::new("address payload must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for PrincipalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PrincipalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An identity able to authorize operations.
#[derive(Clone)]
pub struct Principal {
    keypair: Keypair,
    id: PrincipalId,
}

impl Principal {
    /// Generate a fresh Schnorr keypair.
    pub fn generate() -> Self {
        Self::from_keypair(Keypair::new(secp256k1::SECP256K1, &mut thread_rng()))
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self, ConfigError> {
        let bytes =
            hex::decode(secret).map_err(|e| ConfigError::new(format!("invalid hex secret: {e}")))?;
        let keypair = Keypair::from_seckey_slice(secp256k1::SECP256K1, &bytes)
            .map_err(|e| ConfigError::new(format!("invalid secret key: {e}")))?;
        Ok(Self::from_keypair(keypair))
    }

    fn from_keypair(keypair: Keypair) -> Self {
        let id = PrincipalId(keypair.x_only_public_key().0.serialize());
        Self { keypair, id }
    }

    pub fn id(&self) -> PrincipalId {
        self.id
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.keypair.secret_bytes())
    }

    /// Schnorr-sign a 32-byte digest. Returns the 64-byte signature.
    pub fn sign_digest(&self, digest: [u8; 32]) -> [u8; 64] {
        let msg = Message::from_digest(digest);
        self.keypair.sign_schnorr(msg).serialize()
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal").field("id", &self.id).finish()
    }
}
