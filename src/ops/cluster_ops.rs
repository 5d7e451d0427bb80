//! Groups candidate pairs into duplicate clusters.
//!
//! Clustering is the transitive closure of the candidate-pair graph: if A-B
//! and B-C are candidate pairs, A, B and C form one cluster even when A and
//! C alone would not qualify. Chains are never broken here; an interactive
//! caller can skip a cluster that chained too far.

use log::{debug, info};
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{DedupeError, DedupeResult};
use crate::model::*;

/// Computes connected components over the candidate pairs. Every non-self
/// contact lands in exactly one cluster; contacts without a candidate edge
/// become singletons. Clusters and their members follow input order.
pub fn build_clusters(
    contacts: &[Contact],
    decisions: &[SimilarityDecision],
) -> DedupeResult<Vec<DuplicateCluster>> {
    let mut graph = UnGraph::<Id<Contact>, usize>::new_undirected();
    let mut node_map: BTreeMap<Id<Contact>, NodeIndex> = BTreeMap::new();

    for contact in contacts.iter().filter(|c| !c.is_self()) {
        if node_map.contains_key(&contact.id) {
            return Err(DedupeError::ClusterIntegrity(format!(
                "contact id {} appears more than once in the input",
                contact.id
            )));
        }
        let index = graph.add_node(contact.id);
        node_map.insert(contact.id, index);
    }

    for (n, decision) in decisions.iter().enumerate().filter(|(_, d)| d.is_candidate) {
        let (a, b) = match (node_map.get(&decision.first), node_map.get(&decision.second)) {
            (Some(a), Some(b)) => (*a, *b),
            _ => {
                return Err(DedupeError::ClusterIntegrity(format!(
                    "candidate pair {} / {} references a contact outside the clustering set",
                    decision.first, decision.second
                )))
            }
        };
        graph.add_edge(a, b, n);
    }

    debug!(
        "Candidate graph has {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );

    // Depth-first search from each unvisited node, in insertion order.
    let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
    let mut clusters: Vec<DuplicateCluster> = Vec::new();
    let mut node_cluster: BTreeMap<NodeIndex, usize> = BTreeMap::new();

    for start in graph.node_indices() {
        if visited.contains(&start) {
            continue;
        }
        let cluster_index = clusters.len();
        let mut stack = vec![start];
        let mut members: Vec<NodeIndex> = Vec::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            members.push(current);
            node_cluster.insert(current, cluster_index);
            for neighbor in graph.neighbors(current) {
                if !visited.contains(&neighbor) {
                    stack.push(neighbor);
                }
            }
        }

        members.sort();
        clusters.push(DuplicateCluster {
            id: ClusterId(cluster_index),
            members: members.into_iter().map(|n| graph[n]).collect(),
            confidence: ClusterConfidence::default(),
        });
    }

    for edge in graph.edge_indices() {
        let Some((a, _)) = graph.edge_endpoints(edge) else {
            continue;
        };
        let decision = &decisions[graph[edge]];
        let confidence = &mut clusters[node_cluster[&a]].confidence;
        confidence.edges += 1;
        confidence.min_score = Some(
            confidence
                .min_score
                .map_or(decision.score, |s| s.min(decision.score)),
        );
        confidence.max_score = Some(
            confidence
                .max_score
                .map_or(decision.score, |s| s.max(decision.score)),
        );
        if decision.signals.email_exact {
            confidence.email_edges += 1;
        }
        if decision.signals.phone_exact.is_some() {
            confidence.phone_edges += 1;
        }
        if decision.signals.uid_exact {
            confidence.uid_edges += 1;
        }
        if !decision.signals.has_exact() {
            confidence.name_edges += 1;
        }
    }

    info!(
        "Built {} clusters ({} with duplicates)",
        clusters.len(),
        clusters.iter().filter(|c| !c.is_singleton()).count()
    );
    Ok(clusters)
}

/// Checks that the clusters partition the non-self contacts: no id twice,
/// none missing, no strangers.
pub fn verify_partition(clusters: &[DuplicateCluster], contacts: &[Contact]) -> DedupeResult<()> {
    let mut seen: BTreeSet<Id<Contact>> = BTreeSet::new();
    for cluster in clusters {
        for member in &cluster.members {
            if !seen.insert(*member) {
                return Err(DedupeError::ClusterIntegrity(format!(
                    "contact {} appears in more than one cluster",
                    member
                )));
            }
        }
    }

    let expected: BTreeSet<Id<Contact>> = contacts
        .iter()
        .filter(|c| !c.is_self())
        .map(|c| c.id)
        .collect();
    if let Some(missing) = expected.difference(&seen).next() {
        return Err(DedupeError::ClusterIntegrity(format!(
            "contact {} is not in any cluster",
            missing
        )));
    }
    if let Some(stranger) = seen.difference(&expected).next() {
        return Err(DedupeError::ClusterIntegrity(format!(
            "cluster member {} is not a clusterable contact",
            stranger
        )));
    }
    Ok(())
}
