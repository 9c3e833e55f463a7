//! Cluster extraction
//!
//! Grows disjoint clusters of delegatable nodes over a read-only graph.
//! Seeds are visited in topological order; every seed gets a fresh selector
//! and its cluster grows breadth-first through accepted input and output
//! edges. A node belongs to at most one cluster.
//!
//! Contracting a cluster into one node must not create a cycle, so members
//! on either side of a path that leaves and re-enters the cluster are
//! released before the cluster is filtered. Released nodes can join later
//! clusters.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::DelegateResult;
use crate::graph::{ConsumerMap, Graph, NodeId};
use crate::traits::SubgraphProperty;

/// A node-disjoint set of nodes selected for delegation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Node the cluster was grown from
    pub seed: NodeId,
    /// Members in topological order (operators and absorbed variables)
    pub members: Vec<NodeId>,
    /// Accepted `(from, to)` edges through which members joined
    pub accepted: Vec<(NodeId, NodeId)>,
}

impl Cluster {
    /// Check membership
    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members that are operator nodes
    pub fn operators<'a>(&'a self, graph: &'a Graph) -> impl Iterator<Item = NodeId> + 'a {
        self.members
            .iter()
            .copied()
            .filter(move |id| graph.get(*id).is_some_and(|n| !n.is_variable()))
    }
}

/// Per-node cluster assignment during extraction
struct Labels {
    tags: Vec<Option<usize>>,
}

impl Labels {
    fn new(capacity: usize) -> Self {
        Self {
            tags: vec![None; capacity],
        }
    }

    fn is_free(&self, id: NodeId) -> bool {
        self.tags[id.0].is_none()
    }

    fn assign(&mut self, id: NodeId, tag: usize) {
        self.tags[id.0] = Some(tag);
    }

    fn release(&mut self, id: NodeId) {
        self.tags[id.0] = None;
    }

    /// Members of the already accepted cluster owning `id`, if any
    ///
    /// Accepted clusters will be contracted, so reaching one member reaches
    /// all of them.
    fn merged<'a>(&self, id: NodeId, tag: usize, kept: &'a [Cluster]) -> &'a [NodeId] {
        match self.tags[id.0] {
            Some(t) if t != tag => kept.get(t).map(|c| c.members.as_slice()).unwrap_or(&[]),
            _ => &[],
        }
    }
}

/// Extract all clusters the property's selector accepts
///
/// Only reads the graph; the returned clusters stay valid until the graph is
/// mutated.
pub fn extract_clusters(
    graph: &Graph,
    property: &dyn SubgraphProperty,
) -> DelegateResult<Vec<Cluster>> {
    let order = graph.topological_order()?;
    let position: FxHashMap<NodeId, usize> =
        order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let consumers = graph.consumers();
    let mut labels = Labels::new(graph.capacity());
    let mut clusters = Vec::new();

    for &seed in &order {
        if !labels.is_free(seed) {
            continue;
        }

        let mut selector = property.create_selector();
        let seed_ref = graph.node_ref(seed)?;
        if seed_ref.is_variable() || !selector.select(seed_ref)? {
            continue;
        }

        let tag = clusters.len();
        labels.assign(seed, tag);
        let mut members = vec![seed];
        let mut accepted = Vec::new();
        let mut queue = VecDeque::from([seed]);

        while let Some(current) = queue.pop_front() {
            let current_ref = graph.node_ref(current)?;

            for entry in &current_ref.inputs {
                let producer = entry.node;
                if !labels.is_free(producer) {
                    continue;
                }
                if selector.select_input(current_ref, graph.node_ref(producer)?)? {
                    labels.assign(producer, tag);
                    members.push(producer);
                    accepted.push((current, producer));
                    queue.push_back(producer);
                }
            }

            let mut next: SmallVec<[NodeId; 4]> = consumers.get(current).into();
            next.sort_by_key(|id| position[id]);
            for consumer in next {
                if !labels.is_free(consumer) {
                    continue;
                }
                if selector.select_output(current_ref, graph.node_ref(consumer)?)? {
                    labels.assign(consumer, tag);
                    members.push(consumer);
                    accepted.push((current, consumer));
                    queue.push_back(consumer);
                }
            }
        }

        members.sort_by_key(|id| position[id]);
        let grown = members.len();

        let kept = prune_cycles(
            graph,
            &consumers,
            &labels,
            &clusters,
            tag,
            seed,
            members.clone(),
            &accepted,
        );
        let kept = selector.filter(graph, kept);

        for id in &members {
            if !kept.contains(id) {
                labels.release(*id);
            }
        }

        if kept.is_empty() {
            debug!(
                seed = %seed_ref.name,
                grown,
                "cluster dropped by filter"
            );
            continue;
        }

        accepted.retain(|(a, b)| kept.contains(a) && kept.contains(b));
        debug!(
            seed = %seed_ref.name,
            members = kept.len(),
            released = grown - kept.len(),
            "cluster extracted"
        );
        clusters.push(Cluster {
            seed,
            members: kept,
            accepted,
        });
    }

    Ok(clusters)
}

/// Drop members whose contraction would close a cycle
///
/// A cycle appears when a path leaves the cluster and re-enters it, possibly
/// through a cluster accepted earlier (which counts as one node). Either
/// every member downstream of such a path or every member upstream of it is
/// released, whichever keeps the seed; the rest is trimmed to the seed's
/// component under accepted edges. Trimmed members count as outside nodes,
/// so the check repeats until no member is re-entered. `members` must be in
/// topological order and the result keeps that order.
fn prune_cycles(
    graph: &Graph,
    consumers: &ConsumerMap,
    labels: &Labels,
    kept: &[Cluster],
    tag: usize,
    seed: NodeId,
    members: Vec<NodeId>,
    accepted: &[(NodeId, NodeId)],
) -> Vec<NodeId> {
    let mut current = members;

    loop {
        let inside: FxHashSet<NodeId> = current.iter().copied().collect();

        // Members re-entered by a path that left the cluster
        let downstream = reach(
            current
                .iter()
                .flat_map(|m| consumers.get(*m).iter().copied())
                .filter(|c| !inside.contains(c)),
            |n| {
                let mut next = consumers.get(n).to_vec();
                next.extend_from_slice(labels.merged(n, tag, kept));
                next
            },
        );
        if !current.iter().any(|m| downstream.contains(m)) {
            return current;
        }

        let removed = if downstream.contains(&seed) {
            // Members that can leave the cluster and come back
            reach(
                current
                    .iter()
                    .filter_map(|m| graph.get(*m))
                    .flat_map(|n| n.inputs.iter().map(|e| e.node))
                    .filter(|p| !inside.contains(p)),
                |n| {
                    let mut next: Vec<NodeId> = graph
                        .get(n)
                        .map(|node| node.inputs.iter().map(|e| e.node).collect())
                        .unwrap_or_default();
                    next.extend_from_slice(labels.merged(n, tag, kept));
                    next
                },
            )
        } else {
            downstream
        };

        if removed.contains(&seed) {
            return Vec::new();
        }

        // Component of the seed under accepted edges between remaining members
        let mut component: FxHashSet<NodeId> = FxHashSet::default();
        component.insert(seed);
        let mut queue = VecDeque::from([seed]);
        while let Some(n) = queue.pop_front() {
            for &(a, b) in accepted {
                let next = if a == n {
                    b
                } else if b == n {
                    a
                } else {
                    continue;
                };
                if inside.contains(&next) && !removed.contains(&next) && component.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        // Every pass releases at least one member, so this terminates
        current.retain(|m| component.contains(m));
    }
}

/// Nodes reachable from `start` (inclusive) through `next`
fn reach<I, F>(start: I, next: F) -> FxHashSet<NodeId>
where
    I: IntoIterator<Item = NodeId>,
    F: Fn(NodeId) -> Vec<NodeId>,
{
    let mut seen: FxHashSet<NodeId> = FxHashSet::default();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    for id in start {
        if seen.insert(id) {
            queue.push_back(id);
        }
    }
    while let Some(n) = queue.pop_front() {
        for m in next(n) {
            if seen.insert(m) {
                queue.push_back(m);
            }
        }
    }
    seen
}
