//! Principals, signed operations and a reference registry for delegated-use
//! capabilities, plus the [`Ledger`] seam clients talk through.

pub mod capability;
pub mod client;
pub mod error;
pub mod ledger;
pub mod operation;
pub mod principal;
pub mod registry;

pub use capability::{
    CapabilityBuilder, CapabilityConfig, CapabilityId, CapabilityState, Metadata, UseDelegation,
    UseMethod, Uses,
};
pub use client::{CapabilityClient, ConfirmOptions, Confirmation, DEFAULT_VALIDITY_SLOTS};
pub use error::{ConfigError, LedgerError, RegistryError};
pub use ledger::{Ledger, MemoryLedger};
pub use operation::{Instruction, Operation, SignedOperation, TxSignature};
pub use principal::{Principal, PrincipalId};
pub use registry::{
    ConfirmationStatus, Registry, RegistryParams, SignatureStatus, UNITS_PER_COIN,
};
