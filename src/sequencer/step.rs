//! Step and workflow identity plus per-step lifecycle

use alloy_primitives::TxHash;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WORKFLOW: AtomicU64 = AtomicU64::new(1);
static NEXT_STEP: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkflowId(pub u64);

impl WorkflowId {
    pub fn next() -> Self {
        Self(NEXT_WORKFLOW.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wf-{}", self.0)
    }
}

/// Unique across every workflow in the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StepId(pub u64);

impl StepId {
    pub fn next() -> Self {
        Self(NEXT_STEP.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step-{}", self.0)
    }
}

/// WAITING → PENDING → SUBMITTED → CONFIRMED | REJECTED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    Waiting,
    Pending,
    Submitted,
    Confirmed,
    Rejected,
}

impl StepStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, StepStatus::Confirmed | StepStatus::Rejected)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Waiting => "WAITING",
            StepStatus::Pending => "PENDING",
            StepStatus::Submitted => "SUBMITTED",
            StepStatus::Confirmed => "CONFIRMED",
            StepStatus::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionStep {
    pub id: StepId,
    pub description: String,
    pub status: StepStatus,
    pub hash: Option<TxHash>,
    /// Confirmed without sending anything (pre-check found nothing to do)
    pub skipped: bool,
    /// Classified failure text once rejected
    pub reason: Option<String>,
}

impl TransactionStep {
    pub fn waiting(description: impl Into<String>) -> Self {
        Self {
            id: StepId::next(),
            description: description.into(),
            status: StepStatus::Waiting,
            hash: None,
            skipped: false,
            reason: None,
        }
    }

    pub(crate) fn pending(&mut self) {
        self.status = StepStatus::Pending;
    }

    pub(crate) fn submitted(&mut self, hash: TxHash) {
        self.status = StepStatus::Submitted;
        self.hash = Some(hash);
    }

    pub(crate) fn confirmed(&mut self) {
        self.status = StepStatus::Confirmed;
    }

    /// Confirmed on the spot, with the description replaced by why
    pub(crate) fn skip(&mut self, description: impl Into<String>) {
        self.status = StepStatus::Confirmed;
        self.skipped = true;
        self.description = description.into();
    }

    pub(crate) fn rejected(&mut self, reason: impl Into<String>) {
        self.status = StepStatus::Rejected;
        self.reason = Some(reason.into());
    }
}
