//! Per-key consensus state and the table that owns it.
//!
//! Each key the cluster has ever voted on gets one [`ConsensusRecord`] per
//! node, created lazily on the first prepare or accept and kept for the
//! process lifetime. The record is the acceptor side of single-decree
//! Paxos: a promise watermark plus the most recent vote.
//!
//! [`RecordTable`] holds the records behind a sharded concurrent map. All
//! reads and writes of one key's record are serialized by the shard guard;
//! distinct keys proceed in parallel.

use dashmap::DashMap;

use crate::types::{AcceptedProposal, Operation, PrepareOutcome, ProposalId};

/// Paxos acceptor state for a single key on a single node.
///
/// # Invariants
///
/// - `promised`, once set, is non-decreasing for the record's lifetime.
/// - A successful [`accept`](Self::accept) stores exactly the accepted
///   proposal id, and the stored id is non-decreasing as a consequence of
///   the accept guard.
/// - `accept` does **not** raise `promised`: the guard permits equality, and
///   an accept that arrives without a local prepare leaves the promise
///   watermark untouched, so `accepted.id > promised` is reachable and legal.
#[derive(Debug, Clone, Default)]
pub struct ConsensusRecord {
    promised: Option<ProposalId>,
    accepted: Option<AcceptedProposal>,
}

impl ConsensusRecord {
    /// Handle a prepare request: promise iff `id` strictly exceeds every
    /// promise made so far, surfacing any prior vote to the proposer.
    pub fn prepare(&mut self, id: ProposalId) -> PrepareOutcome {
        match self.promised {
            Some(promised) if id <= promised => PrepareOutcome::Rejected { promised },
            _ => {
                self.promised = Some(id);
                PrepareOutcome::Promised {
                    prior: self.accepted.clone(),
                }
            }
        }
    }

    /// Handle an accept request: vote iff `id` is at least the current
    /// promise.
    ///
    /// The guard is `>=`, not `>`: a proposer's own successful prepare
    /// already raised `promised` to exactly `id`, and that same round must
    /// be allowed to complete.
    pub fn accept(&mut self, id: ProposalId, operation: Operation) -> bool {
        match self.promised {
            Some(promised) if id < promised => false,
            _ => {
                self.accepted = Some(AcceptedProposal { id, operation });
                true
            }
        }
    }

    /// Conclude the round that just learned `id`: the vote it carried has
    /// been applied to the store, so it must stop shadowing future client
    /// operations on this key. A vote from a newer round (numerically above
    /// `id`) is still in flight and is left in place.
    pub fn conclude(&mut self, id: ProposalId) {
        if self
            .accepted
            .as_ref()
            .is_some_and(|accepted| accepted.id <= id)
        {
            self.accepted = None;
        }
    }

    /// The highest proposal id promised so far, if any.
    pub fn promised(&self) -> Option<ProposalId> {
        self.promised
    }

    /// The most recent vote, if one is outstanding.
    pub fn accepted(&self) -> Option<&AcceptedProposal> {
        self.accepted.as_ref()
    }
}

/// The per-node table of consensus records, keyed by record key.
///
/// Backed by a sharded concurrent map: the entry guard serializes the
/// check-and-set inside prepare/accept per key while leaving unrelated keys
/// free to proceed on other shards.
#[derive(Debug, Default)]
pub struct RecordTable {
    records: DashMap<String, ConsensusRecord>,
}

impl RecordTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the record for `key`, creating the record on first
    /// touch. The shard guard is held for the duration of `f`, which makes
    /// the record mutation atomic with respect to other calls for the same
    /// key.
    pub fn with_record<T>(&self, key: &str, f: impl FnOnce(&mut ConsensusRecord) -> T) -> T {
        let mut record = self.records.entry(key.to_owned()).or_default();
        f(record.value_mut())
    }

    /// Snapshot the record for `key`, if the key has ever been voted on.
    /// Introspection for harnesses and tests; the protocol never reads
    /// through this path.
    pub fn snapshot(&self, key: &str) -> Option<ConsensusRecord> {
        self.records.get(key).map(|record| record.value().clone())
    }
}
