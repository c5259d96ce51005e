use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::capability::{CapabilityConfig, CapabilityId, CapabilityState};
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::operation::{Instruction, Operation, SignedOperation, TxSignature};
use crate::principal::{Principal, PrincipalId};

/// How long and how often to poll for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Receipt for a transaction the ledger has confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub signature: TxSignature,
    pub slot: u64,
}

/// Slots an operation built by the client stays acceptable to the registry.
pub const DEFAULT_VALIDITY_SLOTS: u64 = 150;

/// Builds, signs and confirms capability operations against a [`Ledger`].
pub struct CapabilityClient<L> {
    ledger: L,
    confirm: ConfirmOptions,
    validity_slots: u64,
}

impl<L: Ledger> CapabilityClient<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            confirm: ConfirmOptions::default(),
            validity_slots: DEFAULT_VALIDITY_SLOTS,
        }
    }

    pub fn with_confirm_options(mut self, confirm: ConfirmOptions) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_validity_slots(mut self, slots: u64) -> Self {
        self.validity_slots = slots;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Stamp `operation` with an expiry relative to the ledger's slot and sign it.
    pub async fn sign(
        &self,
        operation: Operation,
        signer: &Principal,
    ) -> Result<SignedOperation, LedgerError> {
        let slot = self.ledger.get_slot().await?;
        Ok(operation
            .valid_until(slot.saturating_add(self.validity_slots))
            .sign(signer))
    }

    pub async fn request_airdrop(
        &self,
        recipient: &PrincipalId,
        amount: u64,
    ) -> Result<Confirmation, LedgerError> {
        let signature = self.ledger.request_airdrop(recipient, amount).await?;
        self.confirm_transaction(signature).await
    }

    pub async fn transfer(
        &self,
        sender: &Principal,
        recipient: &PrincipalId,
        amount: u64,
    ) -> Result<Confirmation, LedgerError> {
        let operation = Operation::new(
            sender.id(),
            Instruction::Transfer {
                recipient: *recipient,
                amount,
            },
        );
        let tx = self.sign(operation, sender).await?;
        self.send_and_confirm(&tx).await
    }

    /// Create a capability owned by `owner`. Its id is derived from the
    /// owner and the operation nonce.
    pub async fn create_capability(
        &self,
        owner: &Principal,
        config: &CapabilityConfig,
    ) -> Result<(CapabilityId, Confirmation), LedgerError> {
        config
            .validate()
            .map_err(|e| LedgerError::InvalidRequest(e.to_string()))?;
        let nonce = uuid::Uuid::new_v4();
        let capability = CapabilityId::derive(&owner.id(), &nonce);
        let operation = Operation::with_nonce(
            nonce,
            owner.id(),
            Instruction::CreateCapability {
                capability,
                config: config.clone(),
            },
        );
        let tx = self.sign(operation, owner).await?;
        let confirmation = self.send_and_confirm(&tx).await?;
        Ok((capability, confirmation))
    }

    pub async fn approve_use(
        &self,
        owner: &Principal,
        delegate: &PrincipalId,
        capability: &CapabilityId,
        allowed_uses: u64,
    ) -> Result<Confirmation, LedgerError> {
        let operation = Operation::new(
            owner.id(),
            Instruction::ApproveUse {
                capability: *capability,
                delegate: *delegate,
                number_of_uses: allowed_uses,
            },
        );
        let tx = self.sign(operation, owner).await?;
        self.send_and_confirm(&tx).await
    }

    pub async fn utilize(
        &self,
        user: &Principal,
        capability: &CapabilityId,
        number_of_uses: u64,
    ) -> Result<Confirmation, LedgerError> {
        let operation = Operation::new(
            user.id(),
            Instruction::Utilize {
                capability: *capability,
                number_of_uses,
            },
        );
        let tx = self.sign(operation, user).await?;
        self.send_and_confirm(&tx).await
    }

    pub async fn revoke_use(
        &self,
        owner: &Principal,
        capability: &CapabilityId,
        delegate: &PrincipalId,
    ) -> Result<Confirmation, LedgerError> {
        let operation = Operation::new(
            owner.id(),
            Instruction::RevokeUse {
                capability: *capability,
                delegate: *delegate,
            },
        );
        let tx = self.sign(operation, owner).await?;
        self.send_and_confirm(&tx).await
    }

    pub async fn capability(
        &self,
        id: &CapabilityId,
    ) -> Result<Option<CapabilityState>, LedgerError> {
        self.ledger.get_capability(id).await
    }

    pub async fn balance(&self, who: &PrincipalId) -> Result<u64, LedgerError> {
        self.ledger.get_balance(who).await
    }

    /// Submit once, then wait for confirmation. Never resubmits.
    pub async fn send_and_confirm(
        &self,
        tx: &SignedOperation,
    ) -> Result<Confirmation, LedgerError> {
        let signature = self.ledger.send_transaction(tx).await?;
        self.confirm_transaction(signature).await
    }

    /// Poll until `signature` reaches the confirmation depth or the timeout
    /// elapses.
    pub async fn confirm_transaction(
        &self,
        signature: TxSignature,
    ) -> Result<Confirmation, LedgerError> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.ledger.signature_status(&signature).await? {
                if status.is_confirmed() {
                    return Ok(Confirmation {
                        signature,
                        slot: status.slot,
                    });
                }
                debug!(%signature, confirmations = status.confirmations, "awaiting confirmation");
            }
            let waited = start.elapsed();
            if waited >= self.confirm.timeout {
                return Err(LedgerError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(self.confirm.poll_interval).await;
        }
    }
}
