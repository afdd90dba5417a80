//! Knowledge graph: string-keyed nodes over a petgraph store.
//!
//! Nodes are keyed by the lemma-normalized concept name, so every inflected
//! mention of a concept lands on the same node. The petgraph `DiGraph` holds
//! the structure; a `HashMap` keyed by normalized name and a second map keyed
//! by (from, to, relation) give O(1) node and edge lookup.
//!
//! Mutation happens only through [`KnowledgeGraph::merge`], which applies one
//! document's contribution atomically: the whole contribution is validated
//! before the first write, and any structural violation discards it without
//! touching the graph.

pub mod query;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::MergeError;
use crate::extract::{ConceptLevel, CrossRelation, HierarchyRelation};
use crate::morpho;

/// Normalized node key for a concept name.
pub fn node_key(name: &str) -> String {
    morpho::fold(name)
        .split_whitespace()
        .map(morpho::lemmatize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// What kind of unit produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Concept,
    Pattern,
    ProcessStage,
    Practice,
    Technique,
    Exercise,
}

impl NodeKind {
    /// Hierarchy-derived kinds win over pattern nodes, which win over
    /// process stages.
    fn rank(self) -> u8 {
        match self {
            Self::ProcessStage => 0,
            Self::Pattern => 1,
            Self::Concept | Self::Practice | Self::Technique | Self::Exercise => 2,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Concept => "concept",
            Self::Pattern => "pattern",
            Self::ProcessStage => "process_stage",
            Self::Practice => "practice",
            Self::Technique => "technique",
            Self::Exercise => "exercise",
        };
        f.write_str(s)
    }
}

/// Typed edge relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    IsCoreComponentOf,
    IsPracticeFor,
    IsTechniqueFor,
    IsExerciseFor,
    EmergesFrom,
    Enables,
    Requires,
    LeadsTo,
    RelatedTo,
}

impl Relation {
    /// Hierarchy relations are validated for strict level stepping.
    pub fn is_hierarchy(self) -> bool {
        matches!(
            self,
            Self::IsCoreComponentOf | Self::IsPracticeFor | Self::IsTechniqueFor | Self::IsExerciseFor
        )
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IsCoreComponentOf => "is_core_component_of",
            Self::IsPracticeFor => "is_practice_for",
            Self::IsTechniqueFor => "is_technique_for",
            Self::IsExerciseFor => "is_exercise_for",
            Self::EmergesFrom => "emerges_from",
            Self::Enables => "enables",
            Self::Requires => "requires",
            Self::LeadsTo => "leads_to",
            Self::RelatedTo => "related_to",
        };
        f.write_str(s)
    }
}

impl From<HierarchyRelation> for Relation {
    fn from(relation: HierarchyRelation) -> Self {
        match relation {
            HierarchyRelation::IsCoreComponentOf => Self::IsCoreComponentOf,
            HierarchyRelation::IsPracticeFor => Self::IsPracticeFor,
            HierarchyRelation::IsTechniqueFor => Self::IsTechniqueFor,
            HierarchyRelation::IsExerciseFor => Self::IsExerciseFor,
        }
    }
}

impl From<CrossRelation> for Relation {
    fn from(relation: CrossRelation) -> Self {
        match relation {
            CrossRelation::Enables => Self::Enables,
            CrossRelation::Requires => Self::Requires,
            CrossRelation::LeadsTo => Self::LeadsTo,
        }
    }
}

/// A merged graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub key: String,
    pub name: String,
    pub kind: NodeKind,
    pub description: String,
    /// Dictionary terms associated with the node, union over contributions.
    pub terms: Vec<String>,
    pub tier: Option<u8>,
    pub level: Option<ConceptLevel>,
    /// Maximum confidence over contributions.
    pub confidence: f32,
    /// Contributing document ids.
    pub sources: BTreeSet<String>,
    /// Accumulated confidence per claimed level, for conflict resolution.
    pub level_evidence: BTreeMap<ConceptLevel, f32>,
    pub duration: Option<String>,
    pub frequency: Option<String>,
}

/// A merged graph edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub relation: Relation,
    pub explanation: String,
    pub confidence: f32,
    /// Number of distinct documents asserting this edge.
    pub weight: u32,
    pub sources: BTreeSet<String>,
}

/// A node proposed by one document.
#[derive(Debug, Clone)]
pub struct NodeDraft {
    pub name: String,
    pub kind: NodeKind,
    pub description: String,
    pub terms: Vec<String>,
    pub tier: Option<u8>,
    pub level: Option<ConceptLevel>,
    pub confidence: f32,
    pub duration: Option<String>,
    pub frequency: Option<String>,
}

impl NodeDraft {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            terms: Vec::new(),
            tier: None,
            level: None,
            confidence: 0.5,
            duration: None,
            frequency: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_terms(mut self, terms: Vec<String>) -> Self {
        self.terms = terms;
        self
    }

    pub fn with_tier(mut self, tier: Option<u8>) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_level(mut self, level: ConceptLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_schedule(mut self, duration: Option<String>, frequency: Option<String>) -> Self {
        self.duration = duration;
        self.frequency = frequency;
        self
    }
}

/// An edge proposed by one document. Endpoints are concept names, resolved
/// through [`node_key`] at merge time.
#[derive(Debug, Clone)]
pub struct EdgeDraft {
    pub from: String,
    pub to: String,
    pub relation: Relation,
    pub explanation: String,
    pub confidence: f32,
}

impl EdgeDraft {
    pub fn new(from: impl Into<String>, to: impl Into<String>, relation: Relation) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation,
            explanation: String::new(),
            confidence: 0.5,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Everything one document proposes to add.
#[derive(Debug, Clone, Default)]
pub struct GraphContribution {
    pub nodes: Vec<NodeDraft>,
    pub edges: Vec<EdgeDraft>,
}

impl GraphContribution {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn add_node(&mut self, node: NodeDraft) {
        self.nodes.push(node);
    }

    pub fn add_edge(&mut self, edge: EdgeDraft) {
        self.edges.push(edge);
    }
}

/// A level disagreement resolved during merge. Recorded, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub key: String,
    pub kept: ConceptLevel,
    pub rejected: ConceptLevel,
    pub source: String,
}

/// What one merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub nodes_added: usize,
    pub nodes_merged: usize,
    pub edges_added: usize,
    pub edges_reinforced: usize,
    pub conflicts: usize,
}

/// The merged knowledge graph.
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    pub(crate) graph: DiGraph<GraphNode, GraphEdge>,
    pub(crate) node_index: HashMap<String, NodeIndex>,
    pub(crate) edge_index: HashMap<(String, String, Relation), EdgeIndex>,
    pub(crate) conflicts: Vec<MergeConflict>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_index.contains_key(&node_key(name))
    }

    /// Node by concept name (any inflected form).
    pub fn get(&self, name: &str) -> Option<&GraphNode> {
        self.node_index
            .get(&node_key(name))
            .map(|&idx| &self.graph[idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    /// Edges as (from key, to key, edge), insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &GraphEdge)> {
        self.graph.edge_indices().map(|idx| {
            let (from, to) = self
                .graph
                .edge_endpoints(idx)
                .unwrap_or_else(|| unreachable!());
            (
                self.graph[from].key.as_str(),
                self.graph[to].key.as_str(),
                &self.graph[idx],
            )
        })
    }

    /// Level disagreements recorded across all merges.
    pub fn conflicts(&self) -> &[MergeConflict] {
        &self.conflicts
    }

    /// Merge one document's contribution atomically.
    ///
    /// The contribution is validated in full before the first write; on any
    /// [`MergeError`] the graph is untouched. Re-merging the same source id
    /// is a no-op for weights and evidence.
    pub fn merge(
        &mut self,
        contribution: &GraphContribution,
        source_id: &str,
    ) -> Result<MergeReport, MergeError> {
        let accepted_edges = self.check(contribution)?;
        let mut report = MergeReport::default();

        for draft in &contribution.nodes {
            self.upsert_node(draft, source_id, &mut report);
        }
        for edge in accepted_edges {
            self.upsert_edge(edge, source_id, &mut report);
        }

        info!(
            source = source_id,
            nodes_added = report.nodes_added,
            nodes_merged = report.nodes_merged,
            edges_added = report.edges_added,
            edges_reinforced = report.edges_reinforced,
            conflicts = report.conflicts,
            "contribution merged"
        );
        Ok(report)
    }

    /// Validate a contribution without mutating anything. Returns the edges
    /// to apply; non-hierarchy self-loops are dropped here rather than
    /// rejected.
    fn check<'a>(
        &self,
        contribution: &'a GraphContribution,
    ) -> Result<Vec<&'a EdgeDraft>, MergeError> {
        let mut draft_levels: HashMap<String, Option<ConceptLevel>> = HashMap::new();
        for draft in &contribution.nodes {
            // first claim wins for validation purposes
            draft_levels
                .entry(node_key(&draft.name))
                .or_insert(draft.level);
        }
        let level_of = |key: &str| -> Option<ConceptLevel> {
            match draft_levels.get(key) {
                Some(&level) => level,
                None => self
                    .node_index
                    .get(key)
                    .and_then(|&idx| self.graph[idx].level),
            }
        };
        let known = |key: &str| -> bool {
            draft_levels.contains_key(key) || self.node_index.contains_key(key)
        };

        let mut accepted = Vec::new();
        for edge in &contribution.edges {
            let from_key = node_key(&edge.from);
            let to_key = node_key(&edge.to);
            if !known(&from_key) || !known(&to_key) {
                return Err(MergeError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
            }
            if from_key == to_key {
                if edge.relation.is_hierarchy() {
                    return Err(MergeError::SelfLoop {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                    });
                }
                debug!(from = %edge.from, relation = %edge.relation, "self-loop dropped");
                continue;
            }
            if edge.relation.is_hierarchy() {
                if let (Some(child), Some(parent)) = (level_of(&from_key), level_of(&to_key)) {
                    if child.depth() != parent.depth() + 1 {
                        return Err(MergeError::LevelInversion {
                            from: edge.from.clone(),
                            from_level: child.to_string(),
                            to: edge.to.clone(),
                            to_level: parent.to_string(),
                        });
                    }
                }
            }
            accepted.push(edge);
        }
        Ok(accepted)
    }

    fn upsert_node(&mut self, draft: &NodeDraft, source_id: &str, report: &mut MergeReport) {
        let key = node_key(&draft.name);
        match self.node_index.get(&key) {
            Some(&idx) => {
                let node = &mut self.graph[idx];
                report.nodes_merged += 1;
                let new_source = node.sources.insert(source_id.to_string());
                node.confidence = node.confidence.max(draft.confidence);
                if node.description.is_empty() {
                    node.description = draft.description.clone();
                }
                for term in &draft.terms {
                    if !node.terms.contains(term) {
                        node.terms.push(term.clone());
                    }
                }
                if node.tier.is_none() {
                    node.tier = draft.tier;
                }
                if node.duration.is_none() {
                    node.duration = draft.duration.clone();
                }
                if node.frequency.is_none() {
                    node.frequency = draft.frequency.clone();
                }
                if draft.kind.rank() > node.kind.rank() {
                    node.kind = draft.kind;
                }
                if let Some(level) = draft.level {
                    if new_source {
                        *node.level_evidence.entry(level).or_default() += draft.confidence;
                    }
                    match node.level {
                        None => node.level = Some(level),
                        Some(current) if current != level => {
                            let kept = winner(&node.level_evidence, current);
                            let rejected = if kept == level { current } else { level };
                            node.level = Some(kept);
                            report.conflicts += 1;
                            self.conflicts.push(MergeConflict {
                                key: key.clone(),
                                kept,
                                rejected,
                                source: source_id.to_string(),
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
            None => {
                let mut level_evidence = BTreeMap::new();
                if let Some(level) = draft.level {
                    level_evidence.insert(level, draft.confidence);
                }
                let node = GraphNode {
                    key: key.clone(),
                    name: draft.name.clone(),
                    kind: draft.kind,
                    description: draft.description.clone(),
                    terms: draft.terms.clone(),
                    tier: draft.tier,
                    level: draft.level,
                    confidence: draft.confidence,
                    sources: BTreeSet::from([source_id.to_string()]),
                    level_evidence,
                    duration: draft.duration.clone(),
                    frequency: draft.frequency.clone(),
                };
                let idx = self.graph.add_node(node);
                self.node_index.insert(key, idx);
                report.nodes_added += 1;
            }
        }
    }

    fn upsert_edge(&mut self, draft: &EdgeDraft, source_id: &str, report: &mut MergeReport) {
        let from_key = node_key(&draft.from);
        let to_key = node_key(&draft.to);
        let triple = (from_key.clone(), to_key.clone(), draft.relation);
        match self.edge_index.get(&triple) {
            Some(&idx) => {
                let edge = &mut self.graph[idx];
                if edge.sources.insert(source_id.to_string()) {
                    edge.weight += 1;
                    report.edges_reinforced += 1;
                }
                edge.confidence = edge.confidence.max(draft.confidence);
                if edge.explanation.is_empty() {
                    edge.explanation = draft.explanation.clone();
                }
            }
            None => {
                // endpoints exist: check() demanded it and upsert_node ran first
                let (Some(&from), Some(&to)) =
                    (self.node_index.get(&from_key), self.node_index.get(&to_key))
                else {
                    return;
                };
                let idx = self.graph.add_edge(
                    from,
                    to,
                    GraphEdge {
                        relation: draft.relation,
                        explanation: draft.explanation.clone(),
                        confidence: draft.confidence,
                        weight: 1,
                        sources: BTreeSet::from([source_id.to_string()]),
                    },
                );
                self.edge_index.insert(triple, idx);
                report.edges_added += 1;
            }
        }
    }
}

/// Level with the highest accumulated evidence; ties keep the currently
/// assigned level.
fn winner(evidence: &BTreeMap<ConceptLevel, f32>, current: ConceptLevel) -> ConceptLevel {
    let current_score = evidence.get(&current).copied().unwrap_or_default();
    let mut best = (current, current_score);
    for (&level, &score) in evidence {
        if score > best.1 {
            best = (level, score);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(name: &str, level: ConceptLevel, confidence: f32) -> NodeDraft {
        NodeDraft::new(name, NodeKind::Concept)
            .with_level(level)
            .with_confidence(confidence)
    }

    #[test]
    fn inflected_names_share_a_node() {
        let mut graph = KnowledgeGraph::new();
        let mut c = GraphContribution::default();
        c.add_node(concept("осознавание", ConceptLevel::Domain, 0.6));
        graph.merge(&c, "doc-1").unwrap();

        let mut c2 = GraphContribution::default();
        c2.add_node(concept("осознавания", ConceptLevel::Domain, 0.8));
        let report = graph.merge(&c2, "doc-2").unwrap();

        assert_eq!(graph.node_count(), 1);
        assert_eq!(report.nodes_merged, 1);
        let node = graph.get("осознавание").unwrap();
        assert_eq!(node.confidence, 0.8);
        assert_eq!(node.sources.len(), 2);
    }

    #[test]
    fn merge_is_idempotent_per_source() {
        let mut graph = KnowledgeGraph::new();
        let mut c = GraphContribution::default();
        c.add_node(concept("поле внимания", ConceptLevel::Domain, 0.7));
        c.add_node(concept("метанаблюдение", ConceptLevel::Practice, 0.7));
        c.add_edge(EdgeDraft::new(
            "метанаблюдение",
            "поле внимания",
            Relation::IsPracticeFor,
        ));
        graph.merge(&c, "doc-1").unwrap();
        let before: Vec<u32> = graph.edges().map(|(_, _, e)| e.weight).collect();

        graph.merge(&c, "doc-1").unwrap();
        let after: Vec<u32> = graph.edges().map(|(_, _, e)| e.weight).collect();
        assert_eq!(before, after);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);

        // a second document reinforces
        graph.merge(&c, "doc-2").unwrap();
        assert_eq!(graph.edges().next().unwrap().2.weight, 2);
    }

    #[test]
    fn dangling_edge_discards_whole_contribution() {
        let mut graph = KnowledgeGraph::new();
        let mut c = GraphContribution::default();
        c.add_node(concept("осознавание", ConceptLevel::Domain, 0.6));
        c.add_edge(EdgeDraft::new("осознавание", "нигде", Relation::Enables));
        let err = graph.merge(&c, "doc-1").unwrap_err();
        assert!(matches!(err, MergeError::DanglingEdge { .. }));
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn hierarchy_self_loop_is_fatal_for_contribution() {
        let mut graph = KnowledgeGraph::new();
        let mut c = GraphContribution::default();
        c.add_node(concept("метанаблюдение", ConceptLevel::Practice, 0.6));
        c.add_edge(EdgeDraft::new(
            "метанаблюдение",
            "метанаблюдения",
            Relation::IsPracticeFor,
        ));
        let err = graph.merge(&c, "doc-1").unwrap_err();
        assert!(matches!(err, MergeError::SelfLoop { .. }));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn hierarchy_edge_must_step_one_level_up() {
        let mut graph = KnowledgeGraph::new();
        let mut c = GraphContribution::default();
        c.add_node(concept("нейро-сталкинг", ConceptLevel::Root, 0.9));
        c.add_node(concept("метанаблюдение", ConceptLevel::Practice, 0.7));
        // practice attached directly to root skips the domain level
        c.add_edge(EdgeDraft::new(
            "метанаблюдение",
            "нейро-сталкинг",
            Relation::IsPracticeFor,
        ));
        let err = graph.merge(&c, "doc-1").unwrap_err();
        assert!(matches!(err, MergeError::LevelInversion { .. }));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn level_conflict_is_recorded_and_resolved_by_evidence() {
        let mut graph = KnowledgeGraph::new();
        let mut c1 = GraphContribution::default();
        c1.add_node(concept("центрирование", ConceptLevel::Practice, 0.9));
        graph.merge(&c1, "doc-1").unwrap();

        let mut c2 = GraphContribution::default();
        c2.add_node(concept("центрирование", ConceptLevel::Technique, 0.6));
        let report = graph.merge(&c2, "doc-2").unwrap();

        assert_eq!(report.conflicts, 1);
        assert_eq!(graph.conflicts().len(), 1);
        let node = graph.get("центрирование").unwrap();
        // 0.9 of practice evidence outweighs 0.6 of technique evidence
        assert_eq!(node.level, Some(ConceptLevel::Practice));
        assert_eq!(graph.conflicts()[0].rejected, ConceptLevel::Technique);
    }

    #[test]
    fn non_hierarchy_self_loop_is_dropped_silently() {
        let mut graph = KnowledgeGraph::new();
        let mut c = GraphContribution::default();
        c.add_node(concept("осознавание", ConceptLevel::Domain, 0.6));
        c.add_edge(EdgeDraft::new("осознавание", "осознавание", Relation::RelatedTo));
        let report = graph.merge(&c, "doc-1").unwrap();
        assert_eq!(report.edges_added, 0);
        assert_eq!(graph.node_count(), 1);
    }
}
