//! Read-side queries over the knowledge graph.
//!
//! All traversals run in edge insertion order so results are deterministic
//! for a given merge history. petgraph yields adjacent edges newest-first,
//! so neighbor lists are collected and reversed before use.

use std::collections::{HashMap, VecDeque};

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::morpho;

use super::{node_key, GraphNode, KnowledgeGraph, NodeKind, Relation};

use crate::extract::ConceptLevel;

/// A practice reachable from a concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeRecommendation {
    pub practice: String,
    pub relation: Relation,
    pub explanation: String,
    pub confidence: f32,
}

/// One hop of a path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathStep {
    pub from: String,
    pub to: String,
    pub relation: Relation,
    pub explanation: String,
}

/// An exercise recommended for a practice, through its technique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseRecommendation {
    pub exercise: String,
    pub technique: String,
    pub practice: String,
    pub duration: Option<String>,
    pub frequency: Option<String>,
    pub description: String,
}

fn is_practice(node: &GraphNode) -> bool {
    node.kind == NodeKind::Practice || node.level == Some(ConceptLevel::Practice)
}

impl KnowledgeGraph {
    /// Adjacent edges in insertion order.
    fn adjacent(&self, idx: NodeIndex, direction: Direction) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut edges: Vec<(EdgeIndex, NodeIndex)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|edge| {
                use petgraph::visit::EdgeRef;
                let other = if direction == Direction::Outgoing {
                    edge.target()
                } else {
                    edge.source()
                };
                (edge.id(), other)
            })
            .collect();
        edges.reverse();
        edges
    }

    /// Practices connected to a concept: lateral edges from the concept to a
    /// practice node, plus practices attached via `is_practice_for`.
    pub fn find_practices_for_concept(&self, name: &str) -> Vec<PracticeRecommendation> {
        let Some(&idx) = self.node_index.get(&node_key(name)) else {
            return Vec::new();
        };
        let mut found: Vec<PracticeRecommendation> = Vec::new();
        let mut push = |practice: &GraphNode, relation: Relation, edge: &super::GraphEdge| {
            if found.iter().any(|r| r.practice == practice.name) {
                return;
            }
            found.push(PracticeRecommendation {
                practice: practice.name.clone(),
                relation,
                explanation: edge.explanation.clone(),
                confidence: edge.confidence,
            });
        };

        for (edge_idx, target) in self.adjacent(idx, Direction::Outgoing) {
            let edge = &self.graph[edge_idx];
            let node = &self.graph[target];
            if !edge.relation.is_hierarchy() && is_practice(node) {
                push(node, edge.relation, edge);
            }
        }
        for (edge_idx, source) in self.adjacent(idx, Direction::Incoming) {
            let edge = &self.graph[edge_idx];
            let node = &self.graph[source];
            if edge.relation == Relation::IsPracticeFor && is_practice(node) {
                push(node, edge.relation, edge);
            }
        }
        found
    }

    /// Unweighted BFS shortest path between two concepts. Returns the first
    /// discovered path by edge insertion order, `Some(vec![])` when both
    /// names resolve to the same node, `None` when either node is missing or
    /// the target is unreachable.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<PathStep>> {
        let &start = self.node_index.get(&node_key(from))?;
        let &goal = self.node_index.get(&node_key(to))?;
        if start == goal {
            return Some(Vec::new());
        }

        let mut predecessor: HashMap<NodeIndex, (NodeIndex, EdgeIndex)> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        'search: while let Some(current) = queue.pop_front() {
            for (edge_idx, next) in self.adjacent(current, Direction::Outgoing) {
                if next == start || predecessor.contains_key(&next) {
                    continue;
                }
                predecessor.insert(next, (current, edge_idx));
                if next == goal {
                    break 'search;
                }
                queue.push_back(next);
            }
        }

        predecessor.get(&goal)?;
        let mut steps = Vec::new();
        let mut cursor = goal;
        while cursor != start {
            let &(prev, edge_idx) = predecessor
                .get(&cursor)
                .unwrap_or_else(|| unreachable!("predecessor chain is complete"));
            let edge = &self.graph[edge_idx];
            steps.push(PathStep {
                from: self.graph[prev].name.clone(),
                to: self.graph[cursor].name.clone(),
                relation: edge.relation,
                explanation: edge.explanation.clone(),
            });
            cursor = prev;
        }
        steps.reverse();
        Some(steps)
    }

    /// Exercise for a practice, resolved through its techniques. A duration
    /// hint matches as a folded substring and yields nothing when no exercise
    /// matches it; without a hint the highest-confidence exercise wins, first
    /// inserted on ties.
    pub fn recommend_exercise_for_practice(
        &self,
        practice: &str,
        duration_hint: Option<&str>,
    ) -> Option<ExerciseRecommendation> {
        let &practice_idx = self.node_index.get(&node_key(practice))?;
        let practice_node = &self.graph[practice_idx];

        let mut candidates: Vec<(&GraphNode, &GraphNode)> = Vec::new();
        for (edge_idx, technique) in self.adjacent(practice_idx, Direction::Incoming) {
            if self.graph[edge_idx].relation != Relation::IsTechniqueFor {
                continue;
            }
            for (exercise_edge, exercise) in self.adjacent(technique, Direction::Incoming) {
                if self.graph[exercise_edge].relation == Relation::IsExerciseFor {
                    candidates.push((&self.graph[exercise], &self.graph[technique]));
                }
            }
        }
        if candidates.is_empty() {
            return None;
        }

        let (exercise, technique) = match duration_hint {
            Some(hint) => {
                let folded = morpho::fold(hint);
                candidates
                    .iter()
                    .find(|(exercise, _)| {
                        exercise
                            .duration
                            .as_deref()
                            .is_some_and(|d| morpho::fold(d).contains(&folded))
                    })
                    .copied()?
            }
            None => {
                let mut best = candidates[0];
                for &candidate in &candidates[1..] {
                    if candidate.0.confidence > best.0.confidence {
                        best = candidate;
                    }
                }
                best
            }
        };

        Some(ExerciseRecommendation {
            exercise: exercise.name.clone(),
            technique: technique.name.clone(),
            practice: practice_node.name.clone(),
            duration: exercise.duration.clone(),
            frequency: exercise.frequency.clone(),
            description: exercise.description.clone(),
        })
    }
}
