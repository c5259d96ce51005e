//! Delegated-use pipeline.
//!
//! Six named steps, each taking the confirmed output of the one before it.
//! The driver awaits every confirmation before starting the next step and
//! stops at the first failure. Nothing is retried here; confirmation timeouts
//! belong to the [`CapabilityClient`].

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};
use use_delegation_sdk::{
    CapabilityClient, CapabilityId, CapabilityState, Confirmation, Ledger, LedgerError, Principal,
    PrincipalId, RegistryError, TxSignature,
};

use crate::config::DemoOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Fund,
    CreateCapability,
    ApproveUse,
    Use,
    RevokeUse,
    UseAfterRevoke,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Fund,
        Step::CreateCapability,
        Step::ApproveUse,
        Step::Use,
        Step::RevokeUse,
        Step::UseAfterRevoke,
    ];

    pub fn number(self) -> usize {
        match self {
            Step::Fund => 1,
            Step::CreateCapability => 2,
            Step::ApproveUse => 3,
            Step::Use => 4,
            Step::RevokeUse => 5,
            Step::UseAfterRevoke => 6,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Step::Fund => "fund owner and delegate",
            Step::CreateCapability => "create usable capability",
            Step::ApproveUse => "approve delegate",
            Step::Use => "delegate uses capability",
            Step::RevokeUse => "revoke delegate",
            Step::UseAfterRevoke => "delegate uses capability after revocation",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.description())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("step {step}: funding failed: {source}")]
    Funding { step: Step, source: LedgerError },
    #[error("step {step}: {source}")]
    ConfirmationTimeout { step: Step, source: LedgerError },
    #[error("step {step}: use rejected: {source}")]
    RejectedUse { step: Step, source: LedgerError },
    #[error("step {step}: {source}")]
    Ledger { step: Step, source: LedgerError },
    #[error("step {step}: capability {capability} not found on ledger")]
    MissingCapability { step: Step, capability: CapabilityId },
    #[error("step {step}: use was expected to be rejected but confirmed as {signature}")]
    UnexpectedAcceptance { step: Step, signature: TxSignature },
}

impl RunError {
    /// Classify a ledger failure seen while running `step`. Only the use
    /// steps can report a rejected use.
    fn at(step: Step, source: LedgerError) -> Self {
        if matches!(source, LedgerError::ConfirmationTimeout { .. }) {
            return Self::ConfirmationTimeout { step, source };
        }
        let rejection = source.rejection();
        let use_rejected = matches!(step, Step::Use | Step::UseAfterRevoke)
            && rejection.is_some_and(RegistryError::is_use_rejection);
        let unfunded = rejection.is_some_and(RegistryError::is_funding_failure);
        if use_rejected {
            Self::RejectedUse { step, source }
        } else if step == Step::Fund || unfunded {
            Self::Funding { step, source }
        } else {
            Self::Ledger { step, source }
        }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            Self::InvalidOptions(_) => None,
            Self::Funding { step, .. }
            | Self::ConfirmationTimeout { step, .. }
            | Self::RejectedUse { step, .. }
            | Self::Ledger { step, .. }
            | Self::MissingCapability { step, .. }
            | Self::UnexpectedAcceptance { step, .. } => Some(*step),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Confirmed { confirmations: Vec<Confirmation> },
    /// The registry refused the operation, which is what the step expects.
    RejectedAsExpected { rejection: RegistryError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub outcome: StepOutcome,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub owner: PrincipalId,
    pub delegate: PrincipalId,
    pub capability: CapabilityId,
    pub steps: Vec<StepReport>,
    pub final_state: CapabilityState,
}

pub struct Funded {
    pub airdrop: Confirmation,
    pub transfer: Confirmation,
}

pub struct Created {
    pub capability: CapabilityId,
    pub confirmation: Confirmation,
}

pub struct Approved {
    pub capability: CapabilityId,
    pub confirmation: Confirmation,
    pub delegate_before: Option<PrincipalId>,
}

pub struct Used {
    pub capability: CapabilityId,
    pub confirmation: Confirmation,
    pub remaining_before: u64,
    pub remaining_after: u64,
}

pub struct Revoked {
    pub capability: CapabilityId,
    pub confirmation: Confirmation,
    pub delegate_after: Option<PrincipalId>,
}

pub struct Refused {
    pub capability: CapabilityId,
    pub rejection: RegistryError,
}

pub struct Orchestrator<L> {
    client: CapabilityClient<L>,
    options: DemoOptions,
    owner: Principal,
    delegate: Principal,
}

impl<L: Ledger> Orchestrator<L> {
    pub fn new(
        client: CapabilityClient<L>,
        options: DemoOptions,
        owner: Principal,
        delegate: Principal,
    ) -> Result<Self, RunError> {
        options
            .validate()
            .map_err(|e| RunError::InvalidOptions(e.0))?;
        Ok(Self {
            client,
            options,
            owner,
            delegate,
        })
    }

    pub fn client(&self) -> &CapabilityClient<L> {
        &self.client
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn delegate(&self) -> &Principal {
        &self.delegate
    }

    /// Run all six steps in order.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let mut steps = Vec::with_capacity(Step::ALL.len());
        info!(owner = %self.owner.id(), delegate = %self.delegate.id(), "starting run");

        let funded = self.fund().await?;
        steps.push(report(
            Step::Fund,
            vec![funded.airdrop, funded.transfer],
            format!(
                "airdropped to {} and transferred {} to {} (txids {}, {})",
                self.owner.id(),
                self.options.delegate_amount,
                self.delegate.id(),
                funded.airdrop.signature,
                funded.transfer.signature
            ),
        ));

        let created = self.create_capability(&funded).await?;
        steps.push(report(
            Step::CreateCapability,
            vec![created.confirmation],
            format!(
                "capability {} created with {} uses (txid {})",
                created.capability, self.options.initial_uses, created.confirmation.signature
            ),
        ));

        let approved = self.approve_use(&created).await?;
        steps.push(report(
            Step::ApproveUse,
            vec![approved.confirmation],
            format!(
                "{} approved for {} uses (txid {}); delegate before: {}",
                self.delegate.id(),
                self.options.delegated_uses,
                approved.confirmation.signature,
                display_delegate(approved.delegate_before)
            ),
        ));

        let used = self.use_capability(&approved).await?;
        steps.push(report(
            Step::Use,
            vec![used.confirmation],
            format!(
                "use confirmed, remaining uses {} -> {} (txid {})",
                used.remaining_before, used.remaining_after, used.confirmation.signature
            ),
        ));

        let revoked = self.revoke_use(&used).await?;
        steps.push(report(
            Step::RevokeUse,
            vec![revoked.confirmation],
            format!(
                "delegation of {} revoked (txid {}); delegate after: {}",
                self.delegate.id(),
                revoked.confirmation.signature,
                display_delegate(revoked.delegate_after)
            ),
        ));

        let refused = self.use_after_revoke(&revoked).await?;
        steps.push(StepReport {
            step: Step::UseAfterRevoke,
            message: format!("use rejected as expected: {}", refused.rejection),
            outcome: StepOutcome::RejectedAsExpected {
                rejection: refused.rejection,
            },
        });

        let final_state = self
            .load_capability(Step::UseAfterRevoke, &refused.capability)
            .await?;
        Ok(RunReport {
            owner: self.owner.id(),
            delegate: self.delegate.id(),
            capability: refused.capability,
            steps,
            final_state,
        })
    }

    pub async fn fund(&self) -> Result<Funded, RunError> {
        let step = Step::Fund;
        let airdrop = self
            .client
            .request_airdrop(&self.owner.id(), self.options.funding_amount)
            .await
            .map_err(|e| RunError::at(step, e))?;
        let transfer = self
            .client
            .transfer(&self.owner, &self.delegate.id(), self.options.delegate_amount)
            .await
            .map_err(|e| RunError::at(step, e))?;
        info!(%step, airdrop = %airdrop.signature, transfer = %transfer.signature, "funded");
        Ok(Funded { airdrop, transfer })
    }

    pub async fn create_capability(&self, _funded: &Funded) -> Result<Created, RunError> {
        let step = Step::CreateCapability;
        let config = self
            .options
            .capability_config()
            .map_err(|e| RunError::InvalidOptions(e.0))?;
        let (capability, confirmation) = self
            .client
            .create_capability(&self.owner, &config)
            .await
            .map_err(|e| RunError::at(step, e))?;
        info!(%step, %capability, txid = %confirmation.signature, "capability created");
        Ok(Created {
            capability,
            confirmation,
        })
    }

    pub async fn approve_use(&self, created: &Created) -> Result<Approved, RunError> {
        let step = Step::ApproveUse;
        let confirmation = self
            .client
            .approve_use(
                &self.owner,
                &self.delegate.id(),
                &created.capability,
                self.options.delegated_uses,
            )
            .await
            .map_err(|e| RunError::at(step, e))?;
        let state = self.load_capability(step, &created.capability).await?;
        info!(%step, delegate = %self.delegate.id(), txid = %confirmation.signature, "use approved");
        Ok(Approved {
            capability: created.capability,
            confirmation,
            delegate_before: state.delegate(),
        })
    }

    pub async fn use_capability(&self, approved: &Approved) -> Result<Used, RunError> {
        let step = Step::Use;
        let before = self.load_capability(step, &approved.capability).await?;
        let confirmation = self
            .client
            .utilize(&self.delegate, &approved.capability, 1)
            .await
            .map_err(|e| RunError::at(step, e))?;
        let after = self.load_capability(step, &approved.capability).await?;
        info!(
            %step,
            txid = %confirmation.signature,
            remaining = after.remaining_uses(),
            "capability used"
        );
        Ok(Used {
            capability: approved.capability,
            confirmation,
            remaining_before: before.remaining_uses(),
            remaining_after: after.remaining_uses(),
        })
    }

    pub async fn revoke_use(&self, used: &Used) -> Result<Revoked, RunError> {
        let step = Step::RevokeUse;
        let confirmation = self
            .client
            .revoke_use(&self.owner, &used.capability, &self.delegate.id())
            .await
            .map_err(|e| RunError::at(step, e))?;
        let state = self.load_capability(step, &used.capability).await?;
        info!(%step, txid = %confirmation.signature, "delegation revoked");
        Ok(Revoked {
            capability: used.capability,
            confirmation,
            delegate_after: state.delegate(),
        })
    }

    /// The registry must refuse this use. A confirmation is an error.
    pub async fn use_after_revoke(&self, revoked: &Revoked) -> Result<Refused, RunError> {
        let step = Step::UseAfterRevoke;
        match self
            .client
            .utilize(&self.delegate, &revoked.capability, 1)
            .await
        {
            Ok(confirmation) => Err(RunError::UnexpectedAcceptance {
                step,
                signature: confirmation.signature,
            }),
            Err(LedgerError::Rejected(rejection)) if rejection.is_use_rejection() => {
                warn!(%step, %rejection, "use rejected as expected");
                Ok(Refused {
                    capability: revoked.capability,
                    rejection,
                })
            }
            Err(e) => Err(RunError::at(step, e)),
        }
    }

    async fn load_capability(
        &self,
        step: Step,
        capability: &CapabilityId,
    ) -> Result<CapabilityState, RunError> {
        self.client
            .capability(capability)
            .await
            .map_err(|e| RunError::at(step, e))?
            .ok_or(RunError::MissingCapability {
                step,
                capability: *capability,
            })
    }
}

fn report(step: Step, confirmations: Vec<Confirmation>, message: String) -> StepReport {
    StepReport {
        step,
        outcome: StepOutcome::Confirmed { confirmations },
        message,
    }
}

fn display_delegate(delegate: Option<PrincipalId>) -> String {
    delegate.map_or_else(|| "none".to_string(), |d| d.to_string())
}
