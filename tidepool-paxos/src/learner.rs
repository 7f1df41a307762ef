//! Learner role: applying majority-accepted operations to the store.
//!
//! The learner is the only path that mutates a node's [`ReplicatedStore`].
//! By the time a `learn` arrives the proposer has already established an
//! accept quorum, so the learner does not vote or veto — it applies the
//! operation and reports what the store held before.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::store::ReplicatedStore;
use crate::types::{NodeId, Operation, PaxosError, ProposalId};

/// Location-transparent handle to a (possibly remote) learner.
#[async_trait]
pub trait LearnerHandle: Send + Sync {
    /// Phase 3: apply a majority-accepted `operation` for `key`, returning
    /// the value the operation displaced, if any.
    async fn learn(
        &self,
        key: &str,
        id: ProposalId,
        operation: Operation,
    ) -> Result<Option<String>, PaxosError>;
}

/// The learner role of one node.
#[derive(Debug)]
pub struct LearnerRole {
    node: NodeId,
    store: Arc<ReplicatedStore>,
}

impl LearnerRole {
    /// Create the learner role for `node`, applying into `store`.
    pub fn new(node: NodeId, store: Arc<ReplicatedStore>) -> Self {
        Self { node, store }
    }

    /// Apply a learned operation to the local store.
    ///
    /// The operation names its own key; `key` travels alongside it on the
    /// wire for routing and logging, and the operation's key is the one the
    /// apply uses.
    pub fn learn(&self, key: &str, id: ProposalId, operation: &Operation) -> Option<String> {
        let previous = self.store.apply(operation);

        debug!(
            node = %self.node,
            key,
            proposal = %id,
            %operation,
            ?previous,
            "applied learned operation"
        );

        previous
    }
}

/// Convenience alias for a shared learner handle.
pub type SharedLearner = Arc<dyn LearnerHandle>;
