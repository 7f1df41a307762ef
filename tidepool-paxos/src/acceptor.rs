//! Acceptor role: the voting side of the protocol.
//!
//! An acceptor answers two questions about one key at a time:
//!
//! 1. **prepare**: "will you shut out every round below this one?" —
//!    granted iff the proposal id strictly exceeds the key's promise
//!    watermark; the grant carries the acceptor's most recent vote so the
//!    proposer can honor it.
//! 2. **accept**: "store this value for this round" — granted iff the
//!    proposal id is at least the watermark (`>=`, so the round that just
//!    prepared can complete).
//!
//! The key invariant: an acceptor never votes in a round below a promise it
//! has made. Everything else in the protocol leans on that refusal.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::record::{ConsensusRecord, RecordTable};
use crate::types::{NodeId, Operation, PaxosError, PrepareOutcome, ProposalId};

/// Location-transparent handle to a (possibly remote) acceptor.
///
/// The in-process implementation is the node itself; a networked transport
/// implements the same trait and may additionally raise
/// [`PaxosError::Unreachable`] or [`PaxosError::Timeout`]. Callers reduce
/// any error to a non-response in the quorum tally.
#[async_trait]
pub trait AcceptorHandle: Send + Sync {
    /// Phase 1: ask for a promise for `id` on `key`.
    async fn prepare(&self, key: &str, id: ProposalId) -> Result<PrepareOutcome, PaxosError>;

    /// Phase 2: ask the acceptor to vote for `operation` under `id`.
    async fn accept(
        &self,
        key: &str,
        id: ProposalId,
        operation: Operation,
    ) -> Result<bool, PaxosError>;
}

/// The acceptor role of one node: the per-key record table plus the node
/// identity it logs under.
#[derive(Debug)]
pub struct AcceptorRole {
    node: NodeId,
    records: RecordTable,
}

impl AcceptorRole {
    /// Create the acceptor role for `node` with an empty record table.
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            records: RecordTable::new(),
        }
    }

    /// Handle a prepare request against this node's record for `key`.
    pub fn prepare(&self, key: &str, id: ProposalId) -> PrepareOutcome {
        let outcome = self.records.with_record(key, |record| record.prepare(id));

        match &outcome {
            PrepareOutcome::Promised { prior } => debug!(
                node = %self.node,
                key,
                proposal = %id,
                has_prior_vote = prior.is_some(),
                "promised"
            ),
            PrepareOutcome::Rejected { promised } => debug!(
                node = %self.node,
                key,
                proposal = %id,
                %promised,
                "prepare rejected"
            ),
        }

        outcome
    }

    /// Handle an accept request against this node's record for `key`.
    pub fn accept(&self, key: &str, id: ProposalId, operation: Operation) -> bool {
        let accepted = self
            .records
            .with_record(key, |record| record.accept(id, operation));

        debug!(
            node = %self.node,
            key,
            proposal = %id,
            accepted,
            "accept handled"
        );

        accepted
    }

    /// A learn for `id` reached this node: retire the vote it carried.
    pub(crate) fn conclude(&self, key: &str, id: ProposalId) {
        self.records.with_record(key, |record| record.conclude(id));
    }

    /// Snapshot the consensus record for `key`, if any. Introspection only.
    pub fn record(&self, key: &str) -> Option<ConsensusRecord> {
        self.records.snapshot(key)
    }
}

/// Convenience alias for a shared acceptor handle.
pub type SharedAcceptor = Arc<dyn AcceptorHandle>;
