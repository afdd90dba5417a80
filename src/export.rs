//! Graph snapshot: a serializable view of the merged knowledge graph.
//!
//! Downstream exporters (vector indexing, inspection tooling) consume this
//! instead of the live graph. A snapshot restores into an equivalent graph,
//! so it also serves as the persistence format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::graph::{GraphEdge, GraphNode, KnowledgeGraph, MergeConflict};

/// One edge with resolved endpoint keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeExport {
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub edge: GraphEdge,
}

/// Aggregate counts for quick inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub conflicts: usize,
    pub nodes_by_kind: BTreeMap<String, usize>,
}

/// Serializable state of the whole graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<EdgeExport>,
    pub conflicts: Vec<MergeConflict>,
    pub stats: GraphStats,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl KnowledgeGraph {
    /// Aggregate counts, node counts broken down by kind.
    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for node in self.nodes() {
            *nodes_by_kind.entry(node.kind.to_string()).or_default() += 1;
        }
        GraphStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
            conflicts: self.conflicts().len(),
            nodes_by_kind,
        }
    }

    /// Snapshot the graph: nodes and edges in insertion order.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes: Vec<GraphNode> = self.nodes().cloned().collect();
        let edges: Vec<EdgeExport> = self
            .edges()
            .map(|(from, to, edge)| EdgeExport {
                from: from.to_string(),
                to: to.to_string(),
                edge: edge.clone(),
            })
            .collect();
        GraphSnapshot {
            stats: self.stats(),
            conflicts: self.conflicts().to_vec(),
            nodes,
            edges,
        }
    }

    /// Rebuild a graph from a snapshot. Edge endpoints must resolve to
    /// snapshot nodes.
    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Result<Self, MergeError> {
        let mut graph = Self::new();
        for node in &snapshot.nodes {
            let idx = graph.graph.add_node(node.clone());
            graph.node_index.insert(node.key.clone(), idx);
        }
        for export in &snapshot.edges {
            let (Some(&from), Some(&to)) = (
                graph.node_index.get(&export.from),
                graph.node_index.get(&export.to),
            ) else {
                return Err(MergeError::DanglingEdge {
                    from: export.from.clone(),
                    to: export.to.clone(),
                });
            };
            let idx = graph.graph.add_edge(from, to, export.edge.clone());
            graph.edge_index.insert(
                (export.from.clone(), export.to.clone(), export.edge.relation),
                idx,
            );
        }
        graph.conflicts = snapshot.conflicts.clone();
        Ok(graph)
    }
}
