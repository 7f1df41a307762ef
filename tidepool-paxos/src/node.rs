//! Node: one cluster member wearing all four hats.
//!
//! A node is simultaneously an acceptor and a learner for every peer
//! (itself included) and a proposer for its own clients. Inbound protocol
//! handlers run through a bounded worker pool and the injectable fault
//! shim; the client-facing entry points serialize through a node-level gate
//! and drive exactly one consensus round per write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info};

use tidepool_chaos::FaultInjector;

use crate::acceptor::{AcceptorHandle, AcceptorRole};
use crate::learner::{LearnerHandle, LearnerRole};
use crate::proposer::{PeerSet, Proposer};
use crate::record::ConsensusRecord;
use crate::store::ReplicatedStore;
use crate::types::{NodeId, Operation, PaxosError, PrepareOutcome, ProposalId};

/// Tunables for a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    /// Hard window for every outbound peer call. Also the window the fault
    /// injector is expected to stall for, so an injected stall reads as a
    /// crashed peer at the caller.
    pub call_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(600),
        }
    }
}

/// One member of the cluster.
///
/// Constructed with its identity and the fixed cluster size, then handed
/// its peer lists exactly once via [`bootstrap`](Self::bootstrap) before the
/// first client request. Wrap it in an [`Arc`] to hand it out as an
/// [`AcceptorHandle`] / [`LearnerHandle`] to peers.
pub struct Node {
    id: NodeId,
    cluster_size: usize,
    sequence: AtomicU64,
    acceptor: AcceptorRole,
    learner: LearnerRole,
    store: Arc<ReplicatedStore>,
    proposer: Proposer,
    peers: OnceLock<PeerSet>,
    /// Bounded pool for inbound protocol handlers, sized to the cluster.
    workers: Semaphore,
    faults: Arc<dyn FaultInjector>,
    /// Serializes client-facing writes: one in-flight operation per node.
    client_gate: Mutex<()>,
}

impl Node {
    /// Create a node. `cluster_size` is the fixed N the quorum math and the
    /// inbound worker pool are sized against.
    pub fn new(
        id: NodeId,
        cluster_size: usize,
        faults: Arc<dyn FaultInjector>,
        config: NodeConfig,
    ) -> Self {
        let store = Arc::new(ReplicatedStore::new());
        info!(node = %id, cluster_size, "node started");
        Self {
            id,
            cluster_size,
            sequence: AtomicU64::new(0),
            acceptor: AcceptorRole::new(id),
            learner: LearnerRole::new(id, Arc::clone(&store)),
            store,
            proposer: Proposer::new(id, config.call_timeout),
            peers: OnceLock::new(),
            workers: Semaphore::new(cluster_size),
            faults,
            client_gate: Mutex::new(()),
        }
    }

    /// This node's identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Install the identically-ordered, cluster-wide peer lists. The
    /// bootstrap collaborator must call this exactly once, before any
    /// client request arrives.
    pub fn bootstrap(&self, peers: PeerSet) -> Result<(), PaxosError> {
        debug_assert_eq!(peers.cluster_size(), self.cluster_size);
        self.peers
            .set(peers)
            .map_err(|_| PaxosError::AlreadyBootstrapped)
    }

    /// Generate a fresh proposal id: monotonic here, collision-free
    /// everywhere.
    fn next_proposal_id(&self) -> ProposalId {
        ProposalId::compose(self.id, self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Read `key` from the local replica. No consensus round, no
    /// cross-node guarantee: just this node's current snapshot.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = self.store.get(key);
        debug!(node = %self.id, key, ?value, "served local read");
        value
    }

    /// Replicate `key = value`, returning the value it displaced on this
    /// node.
    ///
    /// Drives exactly one consensus round under one fresh proposal id. A
    /// quorum shortfall is reported as
    /// [`PaxosError::QuorumNotReached`] and is retryable by the caller.
    pub async fn put(&self, key: &str, value: &str) -> Result<Option<String>, PaxosError> {
        self.commit(Operation::Write {
            key: key.to_owned(),
            value: value.to_owned(),
        })
        .await
    }

    /// Replicate removal of `key`, returning the removed value on this
    /// node. Same round semantics as [`put`](Self::put).
    pub async fn delete(&self, key: &str) -> Result<Option<String>, PaxosError> {
        self.commit(Operation::Delete {
            key: key.to_owned(),
        })
        .await
    }

    /// Proposer-to-self entry point: drive a full round for `operation`
    /// under an already-generated `id`.
    pub async fn propose(
        &self,
        key: &str,
        id: ProposalId,
        operation: Operation,
    ) -> Result<Option<String>, PaxosError> {
        let peers = self.peers.get().ok_or(PaxosError::NotBootstrapped)?;
        self.proposer.propose(peers, key, id, operation).await
    }

    /// Snapshot this node's consensus record for `key`. Introspection for
    /// harnesses and tests.
    pub fn record(&self, key: &str) -> Option<ConsensusRecord> {
        self.acceptor.record(key)
    }

    async fn commit(&self, operation: Operation) -> Result<Option<String>, PaxosError> {
        let _gate = self.client_gate.lock().await;
        let id = self.next_proposal_id();
        info!(node = %self.id, proposal = %id, %operation, "proposing client operation");
        let key = operation.key().to_owned();
        self.propose(&key, id, operation).await
    }

    /// Claim an inbound worker slot, then run the fault shim for `site`.
    async fn admit(&self, site: &'static str) -> tokio::sync::SemaphorePermit<'_> {
        let slot = self
            .workers
            .acquire()
            .await
            .expect("worker pool is never closed");
        self.faults.before_handler(site).await;
        slot
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("cluster_size", &self.cluster_size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AcceptorHandle for Node {
    async fn prepare(&self, key: &str, id: ProposalId) -> Result<PrepareOutcome, PaxosError> {
        let _slot = self.admit("prepare").await;
        Ok(self.acceptor.prepare(key, id))
    }

    async fn accept(
        &self,
        key: &str,
        id: ProposalId,
        operation: Operation,
    ) -> Result<bool, PaxosError> {
        let _slot = self.admit("accept").await;
        Ok(self.acceptor.accept(key, id, operation))
    }
}

#[async_trait]
impl LearnerHandle for Node {
    async fn learn(
        &self,
        key: &str,
        id: ProposalId,
        operation: Operation,
    ) -> Result<Option<String>, PaxosError> {
        let _slot = self.admit("learn").await;
        let previous = self.learner.learn(key, id, &operation);
        // The vote this round carried is now applied; retire it so the next
        // client operation on this key starts a fresh decree instead of
        // re-adopting an already-applied value.
        self.acceptor.conclude(key, id);
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acceptor::SharedAcceptor;
    use crate::learner::SharedLearner;
    use tidepool_chaos::NoFaults;

    fn single_node() -> Arc<Node> {
        let node = Arc::new(Node::new(
            NodeId(0),
            1,
            Arc::new(NoFaults),
            NodeConfig::default(),
        ));
        let peers = PeerSet::new(
            vec![Arc::clone(&node) as SharedAcceptor],
            vec![Arc::clone(&node) as SharedLearner],
            0,
        );
        node.bootstrap(peers).expect("fresh node");
        node
    }

    #[test]
    fn proposal_ids_increase_and_carry_the_node_id() {
        let node = Node::new(NodeId(3), 5, Arc::new(NoFaults), NodeConfig::default());

        let first = node.next_proposal_id();
        let second = node.next_proposal_id();

        assert!(second > first);
        assert_eq!(first.node(), NodeId(3));
        assert_eq!(first.sequence(), 1);
        assert_eq!(second.sequence(), 2);
    }

    #[tokio::test]
    async fn writes_before_bootstrap_are_refused() {
        let node = Node::new(NodeId(0), 3, Arc::new(NoFaults), NodeConfig::default());

        assert_eq!(node.put("k", "v").await, Err(PaxosError::NotBootstrapped));
        // Reads are purely local and never fail.
        assert_eq!(node.get("k"), None);
    }

    #[tokio::test]
    async fn bootstrap_is_once_only() {
        let node = single_node();
        let again = PeerSet::new(
            vec![Arc::clone(&node) as SharedAcceptor],
            vec![Arc::clone(&node) as SharedLearner],
            0,
        );

        assert_eq!(node.bootstrap(again), Err(PaxosError::AlreadyBootstrapped));
    }

    #[tokio::test]
    async fn single_node_cluster_round_trips() {
        let node = single_node();

        assert_eq!(node.put("k", "v1").await, Ok(None));
        assert_eq!(node.get("k"), Some("v1".to_string()));
        assert_eq!(node.put("k", "v2").await, Ok(Some("v1".to_string())));
        assert_eq!(node.delete("k").await, Ok(Some("v2".to_string())));
        assert_eq!(node.get("k"), None);
    }
}
