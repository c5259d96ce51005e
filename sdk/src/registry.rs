//! Reference capability registry.
//!
//! A deterministic state machine holding balances, capabilities and the set
//! of processed transactions. Every transaction is validated completely before
//! any state changes, so a rejected transaction leaves the registry untouched
//! and is never charged a fee.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::capability::{CapabilityConfig, CapabilityId, CapabilityState, UseDelegation, UseMethod};
use crate::error::RegistryError;
use crate::operation::{Instruction, Operation, SignedOperation, TxSignature};
use crate::principal::{Principal, PrincipalId};

/// Base units per whole coin.
pub const UNITS_PER_COIN: u64 = 1_000_000_000;

/// Flat fee charged to the signer of every successful transaction.
pub const DEFAULT_FEE: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryParams {
    pub fee: u64,
    /// Largest amount a single airdrop may request.
    pub airdrop_limit: u64,
    /// Slots a transaction must age before it counts as confirmed.
    pub confirmation_depth: u64,
    /// Slots a signature stays queryable after its operation expires.
    /// Operations without an expiry are remembered for good.
    pub signature_retention: u64,
}

impl Default for RegistryParams {
    fn default() -> Self {
        Self {
            fee: DEFAULT_FEE,
            airdrop_limit: 2 * UNITS_PER_COIN,
            confirmation_depth: 1,
            signature_retention: 150,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Processed,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmations: u64,
    pub status: ConfirmationStatus,
}

/// Slot a signature was processed at, and when its operation stops being
/// accepted.
#[derive(Debug, Clone, Copy)]
struct Processed {
    slot: u64,
    expires_at: Option<u64>,
}

impl SignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        self.status == ConfirmationStatus::Confirmed
    }
}

pub struct Registry {
    params: RegistryParams,
    faucet: Principal,
    slot: u64,
    balances: HashMap<PrincipalId, u64>,
    capabilities: HashMap<CapabilityId, CapabilityState>,
    revocations: HashSet<(CapabilityId, PrincipalId)>,
    processed: HashMap<TxSignature, Processed>,
}

impl Registry {
    pub fn new(params: RegistryParams) -> Self {
        Self {
            params,
            faucet: Principal::generate(),
            slot: 0,
            balances: HashMap::new(),
            capabilities: HashMap::new(),
            revocations: HashSet::new(),
            processed: HashMap::new(),
        }
    }

    pub fn params(&self) -> &RegistryParams {
        &self.params
    }

    pub fn faucet(&self) -> PrincipalId {
        self.faucet.id()
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }

    /// Move to the next slot and forget signatures whose operations expired
    /// more than `signature_retention` slots ago. A pruned operation can no
    /// longer be replayed because its expiry check fails first.
    pub fn advance_slot(&mut self) -> u64 {
        self.slot += 1;
        let retention = self.params.signature_retention;
        let slot = self.slot;
        let before = self.processed.len();
        self.processed.retain(|_, p| {
            p.expires_at
                .is_none_or(|expires_at| expires_at.saturating_add(retention) >= slot)
        });
        let pruned = before - self.processed.len();
        if pruned > 0 {
            debug!(slot, pruned, "pruned expired signatures");
        }
        self.slot
    }

    /// Number of signatures the registry still remembers.
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn balance(&self, who: &PrincipalId) -> u64 {
        self.balances.get(who).copied().unwrap_or(0)
    }

    pub fn capability(&self, id: &CapabilityId) -> Option<&CapabilityState> {
        self.capabilities.get(id)
    }

    pub fn signature_status(&self, signature: &TxSignature) -> Option<SignatureStatus> {
        let tx_slot = self.processed.get(signature)?.slot;
        let confirmations = self.slot.saturating_sub(tx_slot);
        let status = if confirmations >= self.params.confirmation_depth {
            ConfirmationStatus::Confirmed
        } else {
            ConfirmationStatus::Processed
        };
        Some(SignatureStatus {
            slot: tx_slot,
            confirmations,
            status,
        })
    }

    /// Credit `recipient` from the faucet through a faucet-signed transaction.
    pub fn airdrop(
        &mut self,
        recipient: PrincipalId,
        amount: u64,
    ) -> Result<TxSignature, RegistryError> {
        let tx = Operation::new(
            self.faucet.id(),
            Instruction::Airdrop { recipient, amount },
        )
        .valid_until(self.slot)
        .sign(&self.faucet);
        self.process(&tx)
    }

    /// Validate and apply a signed transaction.
    ///
    /// Resubmitting an already processed transaction returns its signature
    /// without applying it again. The signature is checked against the
    /// submitted operation first, so a different body carrying a known
    /// signature is refused.
    pub fn process(&mut self, tx: &SignedOperation) -> Result<TxSignature, RegistryError> {
        tx.verify()?;
        if self.processed.contains_key(&tx.signature) {
            debug!(signature = %tx.signature, "transaction already processed");
            return Ok(tx.signature);
        }
        if let Some(expires_at) = tx.operation.expires_at {
            if expires_at < self.slot {
                return Err(RegistryError::Expired {
                    expires_at,
                    slot: self.slot,
                });
            }
        }

        let payer = tx.signer;
        let fee = if payer == self.faucet.id() {
            0
        } else {
            self.params.fee
        };
        let instruction = &tx.operation.instruction;
        let spend = match instruction {
            Instruction::Transfer { amount, .. } => *amount,
            _ => 0,
        };
        let needed = spend.checked_add(fee).ok_or_else(|| RegistryError::InvalidInstruction {
            reason: "amount overflows".into(),
        })?;
        let available = self.balance(&payer);
        if available < needed {
            return Err(RegistryError::InsufficientFunds { needed, available });
        }

        match instruction {
            Instruction::Airdrop { recipient, amount } => {
                self.airdrop_to(payer, *recipient, *amount)?
            }
            Instruction::Transfer { recipient, amount } => {
                self.transfer(payer, *recipient, *amount)
            }
            Instruction::CreateCapability { capability, config } => {
                self.create_capability(&tx.operation, *capability, config)?
            }
            Instruction::ApproveUse {
                capability,
                delegate,
                number_of_uses,
            } => self.approve_use(payer, *capability, *delegate, *number_of_uses)?,
            Instruction::Utilize {
                capability,
                number_of_uses,
            } => self.utilize(payer, *capability, *number_of_uses)?,
            Instruction::RevokeUse {
                capability,
                delegate,
            } => self.revoke_use(payer, *capability, *delegate)?,
        }

        if fee > 0 {
            self.debit(payer, fee);
        }
        self.processed.insert(
            tx.signature,
            Processed {
                slot: self.slot,
                expires_at: tx.operation.expires_at,
            },
        );
        info!(
            signature = %tx.signature,
            instruction = instruction.name(),
            signer = %payer,
            slot = self.slot,
            "transaction processed"
        );
        Ok(tx.signature)
    }

    fn credit(&mut self, who: PrincipalId, amount: u64) {
        let balance = self.balances.entry(who).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Caller has already checked the balance.
    fn debit(&mut self, who: PrincipalId, amount: u64) {
        let balance = self.balances.entry(who).or_insert(0);
        *balance -= amount;
    }

    fn airdrop_to(
        &mut self,
        payer: PrincipalId,
        recipient: PrincipalId,
        amount: u64,
    ) -> Result<(), RegistryError> {
        if payer != self.faucet.id() {
            return Err(RegistryError::NotFaucet);
        }
        if amount == 0 {
            return Err(RegistryError::InvalidInstruction {
                reason: "airdrop amount must be > 0".into(),
            });
        }
        if amount > self.params.airdrop_limit {
            return Err(RegistryError::AirdropLimitExceeded {
                requested: amount,
                limit: self.params.airdrop_limit,
            });
        }
        self.credit(recipient, amount);
        Ok(())
    }

    fn transfer(&mut self, payer: PrincipalId, recipient: PrincipalId, amount: u64) {
        self.debit(payer, amount);
        self.credit(recipient, amount);
    }

    fn create_capability(
        &mut self,
        operation: &Operation,
        capability: CapabilityId,
        config: &CapabilityConfig,
    ) -> Result<(), RegistryError> {
        let owner = operation.fee_payer;
        if CapabilityId::derive(&owner, &operation.nonce) != capability {
            return Err(RegistryError::InvalidInstruction {
                reason: "capability id does not match owner and nonce".into(),
            });
        }
        if self.capabilities.contains_key(&capability) {
            return Err(RegistryError::CapabilityExists { capability });
        }
        config
            .validate()
            .map_err(|e| RegistryError::InvalidInstruction {
                reason: e.0.clone(),
            })?;

        self.capabilities.insert(
            capability,
            CapabilityState {
                id: capability,
                owner,
                metadata: config.metadata.clone(),
                uses: config.uses,
                supply: 1,
                max_supply: config.max_supply,
                delegation: None,
                revoked: false,
                burned: false,
            },
        );
        Ok(())
    }

    fn owned_capability(
        &self,
        signer: PrincipalId,
        capability: CapabilityId,
    ) -> Result<&CapabilityState, RegistryError> {
        let state = self
            .capabilities
            .get(&capability)
            .ok_or(RegistryError::UnknownCapability { capability })?;
        if state.owner != signer {
            return Err(RegistryError::NotOwner { capability, signer });
        }
        Ok(state)
    }

    fn approve_use(
        &mut self,
        signer: PrincipalId,
        capability: CapabilityId,
        delegate: PrincipalId,
        number_of_uses: u64,
    ) -> Result<(), RegistryError> {
        let state = self.owned_capability(signer, capability)?;
        if state.burned {
            return Err(RegistryError::Burned { capability });
        }
        if delegate == state.owner {
            return Err(RegistryError::InvalidInstruction {
                reason: "owner cannot delegate to itself".into(),
            });
        }
        if number_of_uses > state.uses.remaining {
            return Err(RegistryError::InvalidInstruction {
                reason: format!(
                    "cannot approve {number_of_uses} uses, {} remaining",
                    state.uses.remaining
                ),
            });
        }

        self.revocations.remove(&(capability, delegate));
        if let Some(state) = self.capabilities.get_mut(&capability) {
            state.delegation = Some(UseDelegation {
                delegate,
                allowed_uses: number_of_uses,
            });
            state.revoked = false;
        }
        Ok(())
    }

    fn utilize(
        &mut self,
        signer: PrincipalId,
        capability: CapabilityId,
        number_of_uses: u64,
    ) -> Result<(), RegistryError> {
        let state = self
            .capabilities
            .get(&capability)
            .ok_or(RegistryError::UnknownCapability { capability })?;
        if state.burned {
            return Err(RegistryError::Burned { capability });
        }
        if number_of_uses == 0 {
            return Err(RegistryError::InvalidInstruction {
                reason: "number_of_uses must be > 0".into(),
            });
        }

        let by_delegate = signer != state.owner;
        if by_delegate {
            match state.delegation {
                Some(d) if d.delegate == signer => {
                    if d.allowed_uses < number_of_uses {
                        return Err(RegistryError::DelegatedUsesExhausted {
                            allowed: d.allowed_uses,
                            requested: number_of_uses,
                        });
                    }
                }
                _ if self.revocations.contains(&(capability, signer)) => {
                    return Err(RegistryError::DelegationRevoked { capability, signer });
                }
                _ => return Err(RegistryError::NoDelegation { capability, signer }),
            }
        }
        let remaining = state
            .uses
            .remaining
            .checked_sub(number_of_uses)
            .ok_or(RegistryError::UsesExhausted {
                remaining: state.uses.remaining,
                requested: number_of_uses,
            })?;

        let Some(state) = self.capabilities.get_mut(&capability) else {
            return Err(RegistryError::UnknownCapability { capability });
        };
        state.uses.remaining = remaining;
        if by_delegate {
            if let Some(d) = state.delegation.as_mut() {
                d.allowed_uses -= number_of_uses;
            }
        }
        if remaining == 0 && state.uses.use_method == UseMethod::Burn {
            state.burned = true;
            state.supply = 0;
            state.delegation = None;
        }
        Ok(())
    }

    fn revoke_use(
        &mut self,
        signer: PrincipalId,
        capability: CapabilityId,
        delegate: PrincipalId,
    ) -> Result<(), RegistryError> {
        let state = self.owned_capability(signer, capability)?;
        if state.burned {
            return Err(RegistryError::Burned { capability });
        }
        if state.delegate() != Some(delegate) {
            return Err(RegistryError::InvalidInstruction {
                reason: format!("{delegate} holds no delegation to revoke"),
            });
        }

        self.revocations.insert((capability, delegate));
        if let Some(state) = self.capabilities.get_mut(&capability) {
            state.delegation = None;
            state.revoked = true;
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryParams::default())
    }
}
