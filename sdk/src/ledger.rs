use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::capability::{CapabilityId, CapabilityState};
use crate::error::LedgerError;
use crate::operation::{SignedOperation, TxSignature};
use crate::principal::PrincipalId;
use crate::registry::{Registry, RegistryParams, SignatureStatus};

/// Client-side view of a ledger that hosts the capability registry.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Ask the faucet to fund `recipient`.
    async fn request_airdrop(
        &self,
        recipient: &PrincipalId,
        amount: u64,
    ) -> Result<TxSignature, LedgerError>;

    /// Submit a signed transaction once. Rejections surface here.
    async fn send_transaction(&self, tx: &SignedOperation) -> Result<TxSignature, LedgerError>;

    /// `None` when the ledger has never seen the signature.
    async fn signature_status(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<SignatureStatus>, LedgerError>;

    async fn get_balance(&self, who: &PrincipalId) -> Result<u64, LedgerError>;

    /// Current slot, used to stamp operation expiries.
    async fn get_slot(&self) -> Result<u64, LedgerError>;

    async fn get_capability(
        &self,
        id: &CapabilityId,
    ) -> Result<Option<CapabilityState>, LedgerError>;
}

#[async_trait]
impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    async fn request_airdrop(
        &self,
        recipient: &PrincipalId,
        amount: u64,
    ) -> Result<TxSignature, LedgerError> {
        (**self).request_airdrop(recipient, amount).await
    }

    async fn send_transaction(&self, tx: &SignedOperation) -> Result<TxSignature, LedgerError> {
        (**self).send_transaction(tx).await
    }

    async fn signature_status(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        (**self).signature_status(signature).await
    }

    async fn get_balance(&self, who: &PrincipalId) -> Result<u64, LedgerError> {
        (**self).get_balance(who).await
    }

    async fn get_slot(&self) -> Result<u64, LedgerError> {
        (**self).get_slot().await
    }

    async fn get_capability(
        &self,
        id: &CapabilityId,
    ) -> Result<Option<CapabilityState>, LedgerError> {
        (**self).get_capability(id).await
    }
}

/// In-process ledger over a shared [`Registry`].
///
/// With `auto_advance` set, every status query moves the registry forward one
/// slot, standing in for wall-clock time passing while a client polls. The
/// registry service turns it off and runs a slot clock instead.
#[derive(Clone)]
pub struct MemoryLedger {
    registry: Arc<Mutex<Registry>>,
    auto_advance: bool,
}

impl MemoryLedger {
    pub fn new(params: RegistryParams) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new(params))),
            auto_advance: true,
        }
    }

    pub fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    pub fn registry(&self) -> &Arc<Mutex<Registry>> {
        &self.registry
    }

    pub async fn advance_slot(&self) -> u64 {
        self.registry.lock().await.advance_slot()
    }

    pub async fn slot(&self) -> u64 {
        self.registry.lock().await.slot()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(RegistryParams::default())
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn request_airdrop(
        &self,
        recipient: &PrincipalId,
        amount: u64,
    ) -> Result<TxSignature, LedgerError> {
        Ok(self.registry.lock().await.airdrop(*recipient, amount)?)
    }

    async fn send_transaction(&self, tx: &SignedOperation) -> Result<TxSignature, LedgerError> {
        Ok(self.registry.lock().await.process(tx)?)
    }

    async fn signature_status(
        &self,
        signature: &TxSignature,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        let mut registry = self.registry.lock().await;
        if self.auto_advance {
            registry.advance_slot();
        }
        Ok(registry.signature_status(signature))
    }

    async fn get_balance(&self, who: &PrincipalId) -> Result<u64, LedgerError> {
        Ok(self.registry.lock().await.balance(who))
    }

    async fn get_slot(&self) -> Result<u64, LedgerError> {
        Ok(self.registry.lock().await.slot())
    }

    async fn get_capability(
        &self,
        id: &CapabilityId,
    ) -> Result<Option<CapabilityState>, LedgerError> {
        Ok(self.registry.lock().await.capability(id).cloned())
    }
}
