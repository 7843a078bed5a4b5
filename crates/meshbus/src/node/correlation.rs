//! Request/response correlation.
//!
//! One waiter per outstanding request. A waiter is poked with every arriving
//! response and with `None` after every topology change, since nodes that
//! left the graph will never answer.

use crate::descriptor::NodeId;
use crate::error::{BusError, BusResult};
use crate::packet::ResponseState;
use crate::scope::Scope;
use serde_json::Value;
use tokio::sync::oneshot;

/// A response as seen by the correlation table.
#[derive(Debug, Clone)]
pub(crate) struct Arrival {
    pub sender: NodeId,
    pub state: ResponseState,
    pub result: Value,
}

/// What the node should do with a waiter after a poke.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WaiterOutcome {
    Pending,
    Resolved(Value),
    Rejected(Value),
    /// Nearest request came back empty; send it again.
    Reissue,
}

/// Pending request state.
pub(crate) struct ResponseWaiter {
    pub name: String,
    pub data: Value,
    pub scope: Scope,
    recipients: Vec<NodeId>,
    responses: Vec<(NodeId, Value)>,
    reply: oneshot::Sender<BusResult<Value>>,
}

impl ResponseWaiter {
    pub(crate) fn new(
        name: String,
        data: Value,
        scope: Scope,
        recipients: Vec<NodeId>,
        reply: oneshot::Sender<BusResult<Value>>,
    ) -> Self {
        Self {
            name,
            data,
            scope,
            recipients,
            responses: Vec::new(),
            reply,
        }
    }

    fn has_answered(&self, node: &NodeId) -> bool {
        self.responses.iter().any(|(sender, _)| sender == node)
    }

    /// Targeted recipients that have not answered yet.
    pub(crate) fn unanswered(&self) -> Vec<&NodeId> {
        self.recipients
            .iter()
            .filter(|r| !self.has_answered(r))
            .collect()
    }

    /// Feed a response, or `None` after a topology change.
    ///
    /// Completion requires an answer from every targeted recipient for which
    /// `present` still holds.
    pub(crate) fn on_response(
        &mut self,
        arrival: Option<Arrival>,
        present: impl Fn(&NodeId) -> bool,
    ) -> WaiterOutcome {
        if let Some(arrival) = arrival {
            if arrival.state == ResponseState::Failure {
                return WaiterOutcome::Rejected(arrival.result);
            }
            if !self.recipients.contains(&arrival.sender) || self.has_answered(&arrival.sender) {
                return WaiterOutcome::Pending;
            }
            self.responses.push((arrival.sender, arrival.result));
        }

        let outstanding = self
            .recipients
            .iter()
            .filter(|r| present(r))
            .any(|r| !self.has_answered(r));
        if outstanding {
            return WaiterOutcome::Pending;
        }

        match self.scope {
            Scope::Nearest => match self.responses.first().map(|(_, result)| result) {
                Some(Value::Array(values)) if !values.is_empty() => WaiterOutcome::Resolved(values[0].clone()),
                Some(Value::Array(_)) | Some(Value::Null) | None => WaiterOutcome::Reissue,
                Some(other) => WaiterOutcome::Resolved(other.clone()),
            },
            _ => {
                let mut all = Vec::new();
                for (_, result) in &self.responses {
                    match result {
                        Value::Array(values) => all.extend(values.iter().cloned()),
                        other => all.push(other.clone()),
                    }
                }
                WaiterOutcome::Resolved(Value::Array(all))
            }
        }
    }

    /// Deliver the final result to the caller. A dropped caller is not an error.
    pub(crate) fn finish(self, result: BusResult<Value>) {
        let _ = self.reply.send(result);
    }

    /// Give up the waiter, keeping the caller's channel for a re-issue.
    pub(crate) fn into_reissue(self) -> (String, Value, Scope, oneshot::Sender<BusResult<Value>>) {
        (self.name, self.data, self.scope, self.reply)
    }
}

/// Map a settled outcome to the caller-facing result.
pub(crate) fn outcome_result(outcome: WaiterOutcome) -> Option<BusResult<Value>> {
    match outcome {
        WaiterOutcome::Resolved(value) => Some(Ok(value)),
        WaiterOutcome::Rejected(payload) => Some(Err(BusError::RequestFailed(payload))),
        WaiterOutcome::Pending | WaiterOutcome::Reissue => None,
    }
}
