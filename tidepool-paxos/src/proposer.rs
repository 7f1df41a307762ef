//! Proposer role: driving a full prepare → accept → learn round.
//!
//! One client write maps to exactly one round under one freshly generated
//! proposal id. There is no retry loop: a round that falls short of a
//! strict majority in either quorum phase fails back to the caller, who
//! decides whether to try again with a new id.
//!
//! ## Peer-call discipline
//!
//! The fan-out visits every peer (including the proposer's own node)
//! sequentially. Each call is spawned and raced against the hard per-call
//! window; a call that errors, panics, or outlives the window is reduced to
//! a **non-response** — it never aborts the round, and it is never confused
//! with an explicit rejection. The spawned call is not cancelled: a late
//! promise or accept is wasted work, not a safety hazard.
//!
//! ## Value selection
//!
//! If any promise carries an outstanding vote, the proposer MUST adopt the
//! vote with the highest proposal id (first encountered wins ties) in place
//! of its own operation. An accepted-but-not-yet-learned value may already
//! be on its way to a quorum somewhere else; adopting it is what makes
//! competing rounds agree.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::acceptor::SharedAcceptor;
use crate::learner::SharedLearner;
use crate::types::{AcceptedProposal, NodeId, Operation, PaxosError, Phase, PrepareOutcome, ProposalId};

/// The full, identically-ordered peer membership one node fans out over.
///
/// Installed once at bootstrap and fixed for the cluster's lifetime. Both
/// lists cover all N nodes, including the owning node itself, at
/// `self_index`.
pub struct PeerSet {
    acceptors: Vec<SharedAcceptor>,
    learners: Vec<SharedLearner>,
    self_index: usize,
}

impl PeerSet {
    /// Assemble a peer set. Both lists must have identical order and cover
    /// the whole cluster; `self_index` is the owning node's position.
    pub fn new(
        acceptors: Vec<SharedAcceptor>,
        learners: Vec<SharedLearner>,
        self_index: usize,
    ) -> Self {
        debug_assert_eq!(acceptors.len(), learners.len());
        debug_assert!(self_index < acceptors.len());
        Self {
            acceptors,
            learners,
            self_index,
        }
    }

    /// Fixed cluster size N.
    pub fn cluster_size(&self) -> usize {
        self.acceptors.len()
    }

    /// Strict-majority threshold: ⌊N/2⌋ + 1.
    pub fn majority(&self) -> usize {
        self.cluster_size() / 2 + 1
    }
}

/// Orchestrates consensus rounds on behalf of one node.
#[derive(Debug)]
pub(crate) struct Proposer {
    node: NodeId,
    call_timeout: Duration,
}

impl Proposer {
    pub(crate) fn new(node: NodeId, call_timeout: Duration) -> Self {
        Self { node, call_timeout }
    }

    /// Drive one three-phase round for `operation` under `id`.
    ///
    /// Returns the proposing node's own learn outcome (the value the
    /// learned operation displaced locally) once both quorums are reached.
    pub(crate) async fn propose(
        &self,
        peers: &PeerSet,
        key: &str,
        id: ProposalId,
        operation: Operation,
    ) -> Result<Option<String>, PaxosError> {
        let majority = peers.majority();

        // Phase 1: collect promises from every acceptor.
        let mut promises = 0usize;
        let mut outstanding: Option<AcceptedProposal> = None;

        for (peer, acceptor) in peers.acceptors.iter().enumerate() {
            let Some(outcome) = self.call_prepare(acceptor, peer, key, id).await else {
                continue;
            };
            match outcome {
                PrepareOutcome::Promised { prior } => {
                    promises += 1;
                    if let Some(prior) = prior {
                        let supersedes = outstanding
                            .as_ref()
                            .map_or(true, |current| prior.id > current.id);
                        if supersedes {
                            outstanding = Some(prior);
                        }
                    }
                }
                PrepareOutcome::Rejected { promised } => {
                    debug!(
                        node = %self.node,
                        peer,
                        proposal = %id,
                        %promised,
                        "peer rejected prepare"
                    );
                }
            }
        }

        if promises < majority {
            warn!(
                node = %self.node,
                key,
                proposal = %id,
                promises,
                majority,
                "prepare quorum not reached"
            );
            return Err(PaxosError::QuorumNotReached {
                phase: Phase::Prepare,
                got: promises,
                needed: majority,
            });
        }

        // Value selection: an outstanding vote outranks our own intention.
        let decided = match outstanding {
            Some(prior) => {
                debug!(
                    node = %self.node,
                    key,
                    proposal = %id,
                    adopted_from = %prior.id,
                    "adopting outstanding accepted value"
                );
                prior.operation
            }
            None => operation,
        };

        // Phase 2: collect accepts for the decided value.
        let mut accepts = 0usize;
        for (peer, acceptor) in peers.acceptors.iter().enumerate() {
            if self
                .call_accept(acceptor, peer, key, id, decided.clone())
                .await
            {
                accepts += 1;
            }
        }

        if accepts < majority {
            warn!(
                node = %self.node,
                key,
                proposal = %id,
                accepts,
                majority,
                "accept quorum not reached"
            );
            return Err(PaxosError::QuorumNotReached {
                phase: Phase::Accept,
                got: accepts,
                needed: majority,
            });
        }

        info!(
            node = %self.node,
            key,
            proposal = %id,
            accepts,
            "value chosen, notifying learners"
        );

        // Phase 3: every learner applies the chosen value. Learner failures
        // are logged and ignored — the quorum already decided. The round's
        // result is this node's own apply outcome.
        let mut local_result = None;
        for (peer, learner) in peers.learners.iter().enumerate() {
            let result = self
                .call_learn(learner, peer, key, id, decided.clone())
                .await;
            if peer == peers.self_index {
                local_result = result.flatten();
            }
        }

        Ok(local_result)
    }

    async fn call_prepare(
        &self,
        acceptor: &SharedAcceptor,
        peer: usize,
        key: &str,
        id: ProposalId,
    ) -> Option<PrepareOutcome> {
        let acceptor = Arc::clone(acceptor);
        let key = key.to_owned();
        let call = tokio::spawn(async move { acceptor.prepare(&key, id).await });
        self.settle("prepare", peer, call).await
    }

    async fn call_accept(
        &self,
        acceptor: &SharedAcceptor,
        peer: usize,
        key: &str,
        id: ProposalId,
        operation: Operation,
    ) -> bool {
        let acceptor = Arc::clone(acceptor);
        let key = key.to_owned();
        let call = tokio::spawn(async move { acceptor.accept(&key, id, operation).await });
        self.settle("accept", peer, call).await.unwrap_or(false)
    }

    async fn call_learn(
        &self,
        learner: &SharedLearner,
        peer: usize,
        key: &str,
        id: ProposalId,
        operation: Operation,
    ) -> Option<Option<String>> {
        let learner = Arc::clone(learner);
        let key = key.to_owned();
        let call = tokio::spawn(async move { learner.learn(&key, id, operation).await });
        self.settle("learn", peer, call).await
    }

    /// Race a spawned peer call against the hard call window, reducing
    /// every failure mode to a non-response. The spawned task is left
    /// running on timeout — there is no cooperative cancellation, and late
    /// completions are harmless.
    async fn settle<T>(
        &self,
        what: &'static str,
        peer: usize,
        call: JoinHandle<Result<T, PaxosError>>,
    ) -> Option<T> {
        match timeout(self.call_timeout, call).await {
            Ok(Ok(Ok(value))) => Some(value),
            Ok(Ok(Err(error))) => {
                debug!(node = %self.node, peer, what, %error, "peer call failed");
                None
            }
            Ok(Err(join_error)) => {
                warn!(node = %self.node, peer, what, %join_error, "peer call panicked");
                None
            }
            Err(_) => {
                debug!(node = %self.node, peer, what, "peer call timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acceptor::AcceptorHandle;
    use crate::learner::LearnerHandle;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const CALL_TIMEOUT: Duration = Duration::from_millis(600);

    fn write(value: &str) -> Operation {
        Operation::Write {
            key: "k".to_string(),
            value: value.to_string(),
        }
    }

    fn id(node: u32, sequence: u64) -> ProposalId {
        ProposalId::compose(NodeId(node), sequence)
    }

    /// Acceptor that answers from a fixed script.
    struct Scripted {
        prepare: PrepareOutcome,
        accept: bool,
    }

    impl Scripted {
        fn promising() -> Arc<Self> {
            Arc::new(Self {
                prepare: PrepareOutcome::Promised { prior: None },
                accept: true,
            })
        }

        fn with_prior(prior: AcceptedProposal) -> Arc<Self> {
            Arc::new(Self {
                prepare: PrepareOutcome::Promised { prior: Some(prior) },
                accept: true,
            })
        }

        fn refusing_accept() -> Arc<Self> {
            Arc::new(Self {
                prepare: PrepareOutcome::Promised { prior: None },
                accept: false,
            })
        }
    }

    #[async_trait]
    impl AcceptorHandle for Scripted {
        async fn prepare(&self, _key: &str, _id: ProposalId) -> Result<PrepareOutcome, PaxosError> {
            Ok(self.prepare.clone())
        }

        async fn accept(
            &self,
            _key: &str,
            _id: ProposalId,
            _operation: Operation,
        ) -> Result<bool, PaxosError> {
            Ok(self.accept)
        }
    }

    /// Peer that fails every call outright.
    struct Failing;

    #[async_trait]
    impl AcceptorHandle for Failing {
        async fn prepare(&self, _key: &str, _id: ProposalId) -> Result<PrepareOutcome, PaxosError> {
            Err(PaxosError::Unreachable { node: NodeId(9) })
        }

        async fn accept(
            &self,
            _key: &str,
            _id: ProposalId,
            _operation: Operation,
        ) -> Result<bool, PaxosError> {
            Err(PaxosError::Unreachable { node: NodeId(9) })
        }
    }

    /// Peer that never answers inside any reasonable window.
    struct Silent;

    #[async_trait]
    impl AcceptorHandle for Silent {
        async fn prepare(&self, _key: &str, _id: ProposalId) -> Result<PrepareOutcome, PaxosError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(PrepareOutcome::Promised { prior: None })
        }

        async fn accept(
            &self,
            _key: &str,
            _id: ProposalId,
            _operation: Operation,
        ) -> Result<bool, PaxosError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
    }

    /// Learner that records what it was told to apply.
    struct Recording {
        applied: Mutex<Vec<Operation>>,
        reply: Option<String>,
    }

    impl Recording {
        fn new(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                applied: Mutex::new(Vec::new()),
                reply: reply.map(str::to_string),
            })
        }

        fn applied(&self) -> Vec<Operation> {
            self.applied.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl LearnerHandle for Recording {
        async fn learn(
            &self,
            _key: &str,
            _id: ProposalId,
            operation: Operation,
        ) -> Result<Option<String>, PaxosError> {
            self.applied.lock().expect("lock").push(operation);
            Ok(self.reply.clone())
        }
    }

    fn peer_set(acceptors: Vec<SharedAcceptor>, learners: Vec<SharedLearner>) -> PeerSet {
        PeerSet::new(acceptors, learners, 0)
    }

    #[tokio::test]
    async fn round_adopts_the_outstanding_value() {
        // One acceptor still holds a vote from an earlier round; the
        // proposer must carry that vote, not its own operation.
        let prior = AcceptedProposal {
            id: id(2, 1),
            operation: write("theirs"),
        };
        let acceptors: Vec<SharedAcceptor> = vec![
            Scripted::promising(),
            Scripted::with_prior(prior),
            Scripted::promising(),
        ];
        let learner = Recording::new(None);
        let learners: Vec<SharedLearner> = vec![learner.clone(), Recording::new(None), Recording::new(None)];

        let proposer = Proposer::new(NodeId(0), CALL_TIMEOUT);
        proposer
            .propose(&peer_set(acceptors, learners), "k", id(0, 5), write("mine"))
            .await
            .expect("round should commit");

        assert_eq!(learner.applied(), vec![write("theirs")]);
    }

    #[tokio::test]
    async fn highest_outstanding_vote_wins() {
        let low = AcceptedProposal {
            id: id(1, 1),
            operation: write("low"),
        };
        let high = AcceptedProposal {
            id: id(3, 1),
            operation: write("high"),
        };
        let acceptors: Vec<SharedAcceptor> = vec![
            Scripted::with_prior(low),
            Scripted::with_prior(high),
            Scripted::promising(),
        ];
        let learner = Recording::new(None);
        let learners: Vec<SharedLearner> = vec![learner.clone(), Recording::new(None), Recording::new(None)];

        let proposer = Proposer::new(NodeId(0), CALL_TIMEOUT);
        proposer
            .propose(&peer_set(acceptors, learners), "k", id(0, 9), write("mine"))
            .await
            .expect("round should commit");

        assert_eq!(learner.applied(), vec![write("high")]);
    }

    #[tokio::test]
    async fn failing_peers_do_not_reach_prepare_quorum() {
        // 2 of 5 respond: 2 is not > ⌊5/2⌋.
        let acceptors: Vec<SharedAcceptor> = vec![
            Scripted::promising(),
            Scripted::promising(),
            Arc::new(Failing),
            Arc::new(Failing),
            Arc::new(Failing),
        ];
        let learners: Vec<SharedLearner> =
            (0..5).map(|_| Recording::new(None) as SharedLearner).collect();

        let proposer = Proposer::new(NodeId(0), CALL_TIMEOUT);
        let outcome = proposer
            .propose(&peer_set(acceptors, learners), "k", id(0, 1), write("v"))
            .await;

        assert_eq!(
            outcome,
            Err(PaxosError::QuorumNotReached {
                phase: Phase::Prepare,
                got: 2,
                needed: 3,
            })
        );
    }

    #[tokio::test]
    async fn refused_accepts_fail_the_round_after_promises() {
        let acceptors: Vec<SharedAcceptor> = vec![
            Scripted::promising(),
            Scripted::refusing_accept(),
            Scripted::refusing_accept(),
        ];
        let learners: Vec<SharedLearner> =
            (0..3).map(|_| Recording::new(None) as SharedLearner).collect();

        let proposer = Proposer::new(NodeId(0), CALL_TIMEOUT);
        let outcome = proposer
            .propose(&peer_set(acceptors, learners), "k", id(0, 1), write("v"))
            .await;

        assert_eq!(
            outcome,
            Err(PaxosError::QuorumNotReached {
                phase: Phase::Accept,
                got: 1,
                needed: 2,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peers_count_as_non_responses_not_rejections() {
        // 3 prompt peers out of 5 still clear the quorum; the two silent
        // peers burn one call window each, nothing more.
        let acceptors: Vec<SharedAcceptor> = vec![
            Scripted::promising(),
            Scripted::promising(),
            Scripted::promising(),
            Arc::new(Silent),
            Arc::new(Silent),
        ];
        let learners: Vec<SharedLearner> =
            (0..5).map(|_| Recording::new(None) as SharedLearner).collect();

        let proposer = Proposer::new(NodeId(0), CALL_TIMEOUT);
        let outcome = proposer
            .propose(&peer_set(acceptors, learners), "k", id(0, 1), write("v"))
            .await;

        assert_eq!(outcome, Ok(None));
    }

    #[tokio::test]
    async fn round_result_is_the_local_learn_outcome() {
        let acceptors: Vec<SharedAcceptor> =
            (0..3).map(|_| Scripted::promising() as SharedAcceptor).collect();
        // Peers disagree about the displaced value; index 1 is "us".
        let learners: Vec<SharedLearner> = vec![
            Recording::new(Some("remote")),
            Recording::new(Some("local")),
            Recording::new(Some("remote")),
        ];
        let peers = PeerSet::new(acceptors, learners, 1);

        let proposer = Proposer::new(NodeId(1), CALL_TIMEOUT);
        let outcome = proposer.propose(&peers, "k", id(1, 1), write("v")).await;

        assert_eq!(outcome, Ok(Some("local".to_string())));
    }

    #[test]
    fn majority_is_strict() {
        let acceptors: Vec<SharedAcceptor> =
            (0..5).map(|_| Scripted::promising() as SharedAcceptor).collect();
        let learners: Vec<SharedLearner> =
            (0..5).map(|_| Recording::new(None) as SharedLearner).collect();
        let peers = PeerSet::new(acceptors, learners, 0);

        assert_eq!(peers.cluster_size(), 5);
        assert_eq!(peers.majority(), 3);
    }
}
