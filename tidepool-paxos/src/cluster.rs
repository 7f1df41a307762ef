//! In-process cluster wiring.
//!
//! The bootstrap collaborator contract made concrete: build N nodes, then
//! hand every node the same identically-ordered acceptor and learner lists
//! covering all N members (each node's lists include itself). Membership is
//! fixed for the cluster's lifetime.
//!
//! Real deployments would perform the same wiring with networked handles
//! behind a registry; the protocol core never knows the difference.

use std::sync::Arc;

use tidepool_chaos::FaultInjector;

use crate::acceptor::SharedAcceptor;
use crate::learner::SharedLearner;
use crate::node::{Node, NodeConfig};
use crate::proposer::PeerSet;
use crate::types::NodeId;

/// A fully wired in-process cluster.
#[derive(Debug)]
pub struct Cluster {
    nodes: Vec<Arc<Node>>,
}

impl Cluster {
    /// Build and wire `cluster_size` nodes sharing one fault strategy.
    pub fn launch(
        cluster_size: usize,
        faults: Arc<dyn FaultInjector>,
        config: NodeConfig,
    ) -> Self {
        let nodes: Vec<Arc<Node>> = (0..cluster_size)
            .map(|index| {
                Arc::new(Node::new(
                    NodeId(index as u32),
                    cluster_size,
                    Arc::clone(&faults),
                    config,
                ))
            })
            .collect();

        let acceptors: Vec<SharedAcceptor> = nodes
            .iter()
            .map(|node| Arc::clone(node) as SharedAcceptor)
            .collect();
        let learners: Vec<SharedLearner> = nodes
            .iter()
            .map(|node| Arc::clone(node) as SharedLearner)
            .collect();

        for (index, node) in nodes.iter().enumerate() {
            node.bootstrap(PeerSet::new(acceptors.clone(), learners.clone(), index))
                .expect("freshly created node cannot already be bootstrapped");
        }

        Self { nodes }
    }

    /// The node at `index`.
    pub fn node(&self, index: usize) -> &Arc<Node> {
        &self.nodes[index]
    }

    /// All nodes, in id order.
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Fixed cluster size N.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }
}
