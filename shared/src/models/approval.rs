//! Approval workflow: single and dual sign-off

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

string_enum! {
    /// Sign-off state of plans, PO approvals, PO reports and temp warehouse requests
    pub enum ApproveStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
}

/// An approve or reject decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target(&self) -> ApproveStatus {
        match self {
            Decision::Approve => ApproveStatus::Approved,
            Decision::Reject => ApproveStatus::Rejected,
        }
    }
}

/// Body accepted by every approve/reject endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalInput {
    pub approved: bool,
    pub reason: Option<String>,
}

impl ApprovalInput {
    /// Resolve the decision; a rejection must carry a non-blank reason.
    pub fn decision(&self) -> Result<Decision, TransitionError> {
        if self.approved {
            Ok(Decision::Approve)
        } else if self.reason().is_some() {
            Ok(Decision::Reject)
        } else {
            Err(TransitionError::ReasonRequired)
        }
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

impl ApproveStatus {
    pub fn is_decided(&self) -> bool {
        !matches!(self, ApproveStatus::Pending)
    }

    /// Apply a decision. Only a pending item can be decided.
    pub fn decide(
        self,
        entity: &'static str,
        decision: Decision,
    ) -> Result<ApproveStatus, TransitionError> {
        if self.is_decided() {
            return Err(TransitionError::AlreadyDecided {
                entity,
                status: self.to_string(),
            });
        }
        Ok(decision.target())
    }

    /// Put an edited item back into the queue. Approved items are frozen.
    pub fn resubmit(self, entity: &'static str) -> Result<ApproveStatus, TransitionError> {
        match self {
            ApproveStatus::Pending | ApproveStatus::Rejected => Ok(ApproveStatus::Pending),
            ApproveStatus::Approved => Err(TransitionError::not_allowed(
                entity,
                self,
                ApproveStatus::Pending,
            )),
        }
    }
}

/// Manager + supplier sign-off of a purchasing order.
///
/// The supplier only sees an order once the manager has approved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DualApproval {
    pub manager: ApproveStatus,
    pub supplier: ApproveStatus,
}

impl Default for DualApproval {
    fn default() -> Self {
        Self {
            manager: ApproveStatus::Pending,
            supplier: ApproveStatus::Pending,
        }
    }
}

impl DualApproval {
    pub fn new(manager: ApproveStatus, supplier: ApproveStatus) -> Self {
        Self { manager, supplier }
    }

    pub fn decide_manager(self, decision: Decision) -> Result<DualApproval, TransitionError> {
        let manager = self
            .manager
            .decide("purchasing order manager approval", decision)?;
        Ok(DualApproval { manager, ..self })
    }

    pub fn decide_supplier(self, decision: Decision) -> Result<DualApproval, TransitionError> {
        if self.manager != ApproveStatus::Approved {
            return Err(TransitionError::ManagerApprovalRequired);
        }
        let supplier = self
            .supplier
            .decide("purchasing order supplier approval", decision)?;
        Ok(DualApproval { supplier, ..self })
    }

    pub fn is_approved(&self) -> bool {
        self.manager == ApproveStatus::Approved && self.supplier == ApproveStatus::Approved
    }

    pub fn is_rejected(&self) -> bool {
        self.manager == ApproveStatus::Rejected || self.supplier == ApproveStatus::Rejected
    }

    /// Both sides start over after the order is edited.
    pub fn reset(self) -> DualApproval {
        DualApproval::default()
    }
}
