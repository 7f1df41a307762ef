//! # Tidepool Paxos: a per-key replicated key-value store
//!
//! This crate implements a replicated key-value store whose writes are
//! ordered and made durable-to-majority by single-decree Paxos, run as an
//! independent consensus instance per key. Every node plays all the roles:
//! it accepts and learns for its peers while proposing for its own clients.
//!
//! ## Protocol Shape
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        client                             │
//! └──────────────────────┬───────────────────────────────────┘
//!                        │ put / delete        get (local read)
//!                        ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                 Node (proposer role)                      │
//! │   Phase 1: prepare → strict majority of promises         │
//! │   value rule: adopt the highest outstanding vote         │
//! │   Phase 2: accept  → strict majority of votes            │
//! │   Phase 3: learn   → every replica applies               │
//! └───────────┬──────────────────────────────┬───────────────┘
//!             │ prepare/accept                │ learn
//!             ▼                              ▼
//! ┌───────────────────┐          ┌───────────────────────────┐
//! │  Acceptor roles    │          │  Learner roles            │
//! │  per-key records   │          │  apply to local store     │
//! └───────────────────┘          └───────────────────────────┘
//! ```
//!
//! Each `put`/`delete` drives exactly one round under one fresh proposal
//! id; a quorum shortfall surfaces as a retryable error, never a panic.
//! Reads bypass consensus entirely and return the local replica's snapshot.
//!
//! ## Fault Tolerance
//!
//! Peer calls are raced against a hard window; slow, crashed, and
//! unreachable peers all reduce to non-responses in the quorum tally, so a
//! round survives any minority of failed peers. The
//! [`tidepool_chaos`] fault injector stalls inbound handlers on demand to
//! exercise exactly those paths under test.
//!
//! ## Crate Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | `NodeId`, `ProposalId`, `Operation`, responses, `PaxosError` |
//! | [`record`] | Per-key `ConsensusRecord` and the sharded `RecordTable` |
//! | [`acceptor`] | `AcceptorHandle` trait and the acceptor role |
//! | [`learner`] | `LearnerHandle` trait and the learner role |
//! | [`store`] | The replicated keyed mapping |
//! | [`proposer`] | `PeerSet` and the three-phase round orchestration |
//! | [`node`] | `Node`: all roles composed behind the client API |
//! | [`cluster`] | In-process bootstrap wiring |

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod acceptor;
pub mod cluster;
pub mod learner;
pub mod node;
pub mod proposer;
pub mod record;
pub mod store;
pub mod types;

// Re-export key types at crate root for convenience
pub use acceptor::{AcceptorHandle, AcceptorRole, SharedAcceptor};
pub use cluster::Cluster;
pub use learner::{LearnerHandle, LearnerRole, SharedLearner};
pub use node::{Node, NodeConfig};
pub use proposer::PeerSet;
pub use record::{ConsensusRecord, RecordTable};
pub use store::ReplicatedStore;
pub use tidepool_chaos::{FaultConfig, FaultInjector, NoFaults, StallInjector};
pub use types::{
    AcceptedProposal, NodeId, Operation, PaxosError, Phase, PrepareOutcome, ProposalId,
};
