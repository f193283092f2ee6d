//! Event bus between the core and the presentation layer
//!
//! A `tokio::sync::broadcast` channel carrying a closed set of signals.
//! Emitting never blocks and never fails: with no subscribers the event is
//! dropped, and a subscriber that falls more than `capacity` events behind
//! skips ahead.

use alloy_primitives::TxHash;
use tokio::sync::broadcast;
use tracing::trace;

use crate::dispatcher::CommandKind;
use crate::errors::ValidationError;
use crate::sequencer::{StepId, TransactionStep, WorkflowId};

#[derive(Debug, Clone)]
pub enum Event {
    /// Configuration loaded and clients constructed
    Configured,

    /// The application snapshot changed
    StateUpdated,

    TransactionAdded {
        workflow: WorkflowId,
        title: String,
        verb: String,
        steps: Vec<TransactionStep>,
    },
    TransactionPending {
        workflow: WorkflowId,
        step: StepId,
    },
    TransactionSubmitted {
        workflow: WorkflowId,
        step: StepId,
        hash: TxHash,
    },
    TransactionConfirmed {
        workflow: WorkflowId,
        step: StepId,
        hash: Option<TxHash>,
        description: String,
    },
    TransactionRejected {
        workflow: WorkflowId,
        step: StepId,
        reason: String,
    },

    /// A user action finished successfully
    Returned(CommandKind),

    /// Input rejected before any chain call
    Validation(ValidationError),

    Warning(String),

    Error(String),
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: Event) {
        trace!("event: {:?}", event);
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Everything currently buffered for `rx`
#[cfg(test)]
pub(crate) fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
