//! Core types for the per-key Paxos protocol.
//!
//! This module defines the building blocks used throughout the crate:
//!
//! - [`NodeId`]: identity of a node in the fixed-size cluster
//! - [`ProposalId`]: globally unique, per-node monotonic round identifier
//! - [`Operation`]: the command carried through a consensus round
//! - [`AcceptedProposal`] / [`PrepareOutcome`]: acceptor responses
//! - [`PaxosError`]: error type for all protocol operations

use serde::{Deserialize, Serialize};

/// Identity of a node in the cluster.
///
/// Doubles as the node's index into the bootstrap peer lists, which are
/// identically ordered on every node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node({})", self.0)
    }
}

/// Number of low bits reserved for the per-node sequence counter.
///
/// The node id lives above this shift, so ids from different nodes can never
/// collide as long as a single process issues fewer than 2^32 proposals,
/// far beyond any plausible process lifetime here.
const SEQUENCE_BITS: u32 = 32;

/// Identifier of a single consensus round attempt for a key.
///
/// Composed as `node_id << 32 | sequence`, which makes ids globally unique
/// and strictly increasing *per node*. They are **not** ordered in global
/// wall-clock terms: a later proposal from a low-numbered node compares
/// below an earlier proposal from a high-numbered node. Safety only relies
/// on the per-key numeric comparison, never on temporal order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProposalId(u64);

impl ProposalId {
    /// Compose an id from a node identity and that node's local sequence
    /// number.
    pub const fn compose(node: NodeId, sequence: u64) -> Self {
        Self(((node.0 as u64) << SEQUENCE_BITS) | sequence)
    }

    /// The node that issued this proposal.
    pub const fn node(self) -> NodeId {
        NodeId((self.0 >> SEQUENCE_BITS) as u32)
    }

    /// The issuing node's local sequence number.
    pub const fn sequence(self) -> u64 {
        self.0 & ((1 << SEQUENCE_BITS) - 1)
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proposal({}:{})", self.node().0, self.sequence())
    }
}

/// A state-machine command carried through a consensus round.
///
/// The command is statically typed end to end, from the client entry point
/// through prepare/accept/learn to the store apply, so a malformed or
/// foreign payload is unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Set `key` to `value`.
    Write {
        /// The record being written.
        key: String,
        /// The value to store.
        value: String,
    },
    /// Remove `key`.
    Delete {
        /// The record being removed.
        key: String,
    },
}

impl Operation {
    /// The key this operation targets.
    pub fn key(&self) -> &str {
        match self {
            Operation::Write { key, .. } | Operation::Delete { key } => key,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Write { key, value } => write!(f, "write({key}={value})"),
            Operation::Delete { key } => write!(f, "delete({key})"),
        }
    }
}

/// A proposal an acceptor has voted for: the round id and its operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedProposal {
    /// The round that carried the operation.
    pub id: ProposalId,
    /// The operation the acceptor stored.
    pub operation: Operation,
}

/// An acceptor's answer to `prepare`.
///
/// A peer that is unreachable or exceeds the call timeout produces *no*
/// outcome at all: absence is represented at the caller, never folded into
/// this enum, so a timed-out peer can never masquerade as a fresh-key
/// promise during value selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareOutcome {
    /// The acceptor promised not to accept any lower-numbered proposal.
    Promised {
        /// The acceptor's most recent vote for this key, if any. A proposer
        /// that sees one MUST adopt it in place of its own operation.
        prior: Option<AcceptedProposal>,
    },
    /// The proposal id did not exceed the acceptor's existing promise.
    Rejected {
        /// The promise that outranked this proposal.
        promised: ProposalId,
    },
}

/// The quorum phase a round was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Phase 1: collecting promises.
    Prepare,
    /// Phase 2: collecting accepts.
    Accept,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Prepare => write!(f, "prepare"),
            Phase::Accept => write!(f, "accept"),
        }
    }
}

/// Errors surfaced by the protocol.
///
/// Peer-level failures (unreachable, timed out) never abort a round; they
/// are reduced to non-responses in the quorum tally. Only a total quorum
/// shortfall reaches the client, and reads never fail at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaxosError {
    /// The round fell short of a strict majority in the given phase.
    ///
    /// Not fatal: the caller may retry with a freshly generated proposal id.
    #[error("quorum not reached during {phase}: got {got} of {needed} required responses")]
    QuorumNotReached {
        /// The phase that fell short.
        phase: Phase,
        /// Responses counted toward the quorum.
        got: usize,
        /// Strict-majority threshold (⌊N/2⌋ + 1).
        needed: usize,
    },

    /// A peer could not be reached at all.
    ///
    /// Produced by transport implementations of the peer-handle traits;
    /// the in-process handles never raise it.
    #[error("peer {node} is unreachable")]
    Unreachable {
        /// The peer that did not answer.
        node: NodeId,
    },

    /// A peer call exceeded the hard per-call window.
    ///
    /// Like [`PaxosError::Unreachable`], this is a transport-level error
    /// contract; in-process callers express timeouts as absent responses.
    #[error("peer call timed out")]
    Timeout,

    /// The node was asked to propose before its peer lists were installed.
    #[error("node has no peer lists installed")]
    NotBootstrapped,

    /// The node's peer lists were installed twice.
    #[error("node peer lists were already installed")]
    AlreadyBootstrapped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_ids_are_monotonic_per_node() {
        let node = NodeId(3);
        let first = ProposalId::compose(node, 1);
        let second = ProposalId::compose(node, 2);

        assert!(second > first);
        assert_eq!(first.node(), node);
        assert_eq!(first.sequence(), 1);
    }

    #[test]
    fn proposal_ids_never_collide_across_nodes() {
        // Same sequence number, different nodes.
        let a = ProposalId::compose(NodeId(0), 17);
        let b = ProposalId::compose(NodeId(1), 17);
        assert_ne!(a, b);

        // A high-numbered node's first proposal outranks a low-numbered
        // node's millionth. Numeric order is not temporal order.
        let early_big_node = ProposalId::compose(NodeId(4), 1);
        let late_small_node = ProposalId::compose(NodeId(0), 1_000_000);
        assert!(early_big_node > late_small_node);
    }

    #[test]
    fn proposal_id_display() {
        assert_eq!(
            ProposalId::compose(NodeId(2), 9).to_string(),
            "proposal(2:9)"
        );
    }

    #[test]
    fn operation_exposes_its_key() {
        let write = Operation::Write {
            key: "k".to_string(),
            value: "v".to_string(),
        };
        let delete = Operation::Delete {
            key: "k".to_string(),
        };

        assert_eq!(write.key(), "k");
        assert_eq!(delete.key(), "k");
    }

    #[test]
    fn prepare_outcome_serde_roundtrip() {
        let outcome = PrepareOutcome::Promised {
            prior: Some(AcceptedProposal {
                id: ProposalId::compose(NodeId(1), 4),
                operation: Operation::Write {
                    key: "k".to_string(),
                    value: "v".to_string(),
                },
            }),
        };

        let json = serde_json::to_string(&outcome).expect("serialize");
        let decoded: PrepareOutcome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(outcome, decoded);
    }

    #[test]
    fn quorum_error_display() {
        let err = PaxosError::QuorumNotReached {
            phase: Phase::Prepare,
            got: 2,
            needed: 3,
        };
        assert_eq!(
            err.to_string(),
            "quorum not reached during prepare: got 2 of 3 required responses"
        );
    }
}
