//! Document processing orchestrator.
//!
//! One [`Processor`] owns the validator, an extraction strategy and the
//! shared knowledge graph. Each document flows through validate → extract
//! (patterns, chains, hierarchy) → one atomic graph merge. Batches extract in
//! parallel; merges serialize on the graph mutex, so graph state never
//! depends on thread scheduling beyond document arrival order.

use std::sync::{Arc, Mutex, MutexGuard};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ProcessorConfig;
use crate::error::LektonResult;
use crate::export::GraphSnapshot;
use crate::extract::{
    CausalChain, ConceptHierarchy, ConceptLevel, Extractor, Pattern, RuleBasedExtractor,
};
use crate::graph::{
    EdgeDraft, GraphContribution, KnowledgeGraph, MergeReport, NodeDraft, NodeKind, Relation,
    node_key,
};
use crate::terminology::TerminologyIndex;
use crate::validate::{TerminologyValidator, ValidationResult};

/// Opaque source timing carried through the pipeline untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// One transcript fragment to process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub id: String,
    pub text: String,
    pub span: Option<SourceSpan>,
}

impl DocumentInput {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, start_secs: f64, end_secs: f64) -> Self {
        self.span = Some(SourceSpan {
            start_secs,
            end_secs,
        });
        self
    }
}

/// Everything the pipeline produced for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document_id: String,
    pub span: Option<SourceSpan>,
    pub validation: ValidationResult,
    pub patterns: Vec<Pattern>,
    pub chains: Vec<CausalChain>,
    pub hierarchy: Option<ConceptHierarchy>,
    /// `None` when the document was rejected or contributed nothing.
    pub merge: Option<MergeReport>,
}

/// The orchestrator.
pub struct Processor {
    validator: TerminologyValidator,
    extractor: Arc<dyn Extractor>,
    graph: Mutex<KnowledgeGraph>,
}

impl Processor {
    /// Processor with the rule-based extraction strategy.
    pub fn new(index: Arc<TerminologyIndex>, config: ProcessorConfig) -> LektonResult<Self> {
        let validator =
            TerminologyValidator::new(Arc::clone(&index), config.validator.clone())?;
        let extractor = Arc::new(RuleBasedExtractor::new(
            index,
            validator.clone(),
            config.extractor,
        ));
        Ok(Self {
            validator,
            extractor,
            graph: Mutex::new(KnowledgeGraph::new()),
        })
    }

    /// Processor with a custom extraction strategy behind the same gate.
    pub fn with_extractor(
        index: Arc<TerminologyIndex>,
        config: ProcessorConfig,
        extractor: Arc<dyn Extractor>,
    ) -> LektonResult<Self> {
        let validator = TerminologyValidator::new(index, config.validator.clone())?;
        Ok(Self {
            validator,
            extractor,
            graph: Mutex::new(KnowledgeGraph::new()),
        })
    }

    fn graph_guard(&self) -> MutexGuard<'_, KnowledgeGraph> {
        match self.graph.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run one document through the full pipeline.
    pub fn process(&self, document: &DocumentInput) -> LektonResult<DocumentReport> {
        let validation = self.validator.validate(&document.text);
        if !validation.accepted {
            info!(
                document = %document.id,
                density = validation.density,
                reason = ?validation.reason,
                "document rejected"
            );
            return Ok(DocumentReport {
                document_id: document.id.clone(),
                span: document.span,
                validation,
                patterns: Vec::new(),
                chains: Vec::new(),
                hierarchy: None,
                merge: None,
            });
        }

        let patterns = self.extractor.patterns(&document.text)?;
        let chains = self.extractor.chains(&document.text, None)?;
        let hierarchy = self.extractor.hierarchy(&document.text)?;
        if let Some(reason) = &hierarchy.reason {
            debug!(document = %document.id, %reason, "no hierarchy for document");
        }

        let mut graph = self.graph_guard();
        let contribution = build_contribution(
            &patterns.patterns,
            &chains.chains,
            hierarchy.hierarchy.as_ref(),
            &graph,
        );
        let merge = if contribution.is_empty() {
            None
        } else {
            Some(graph.merge(&contribution, &document.id)?)
        };
        drop(graph);

        info!(
            document = %document.id,
            density = validation.density,
            patterns = patterns.patterns.len(),
            chains = chains.chains.len(),
            hierarchy = hierarchy.hierarchy.is_some(),
            merged = merge.is_some(),
            "document processed"
        );
        Ok(DocumentReport {
            document_id: document.id.clone(),
            span: document.span,
            validation,
            patterns: patterns.patterns,
            chains: chains.chains,
            hierarchy: hierarchy.hierarchy,
            merge,
        })
    }

    /// Process a batch: extraction in parallel, merges serialized.
    pub fn process_all(&self, documents: &[DocumentInput]) -> Vec<LektonResult<DocumentReport>> {
        documents
            .par_iter()
            .map(|document| self.process(document))
            .collect()
    }

    /// Read access to the merged graph.
    pub fn with_graph<R>(&self, f: impl FnOnce(&KnowledgeGraph) -> R) -> R {
        f(&self.graph_guard())
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.with_graph(|graph| graph.snapshot())
    }
}

fn hierarchy_kind(level: ConceptLevel) -> NodeKind {
    match level {
        ConceptLevel::Root | ConceptLevel::Domain => NodeKind::Concept,
        ConceptLevel::Practice => NodeKind::Practice,
        ConceptLevel::Technique => NodeKind::Technique,
        ConceptLevel::Exercise => NodeKind::Exercise,
    }
}

/// Turn the surviving units of one document into a graph contribution.
fn build_contribution(
    patterns: &[Pattern],
    chains: &[CausalChain],
    hierarchy: Option<&ConceptHierarchy>,
    graph: &KnowledgeGraph,
) -> GraphContribution {
    let mut contribution = GraphContribution::default();
    let mut known_keys: Vec<String> = Vec::new();
    fn add_node(
        contribution: &mut GraphContribution,
        known_keys: &mut Vec<String>,
        draft: NodeDraft,
    ) {
        known_keys.push(node_key(&draft.name));
        contribution.add_node(draft);
    }

    if let Some(h) = hierarchy {
        for node in h.nodes() {
            add_node(
                &mut contribution,
                &mut known_keys,
                NodeDraft::new(node.name.as_str(), hierarchy_kind(node.level))
                    .with_level(node.level)
                    .with_description(node.description.as_str())
                    .with_terms(node.terms.clone())
                    .with_tier(node.tier)
                    .with_confidence(h.confidence)
                    .with_schedule(node.duration.clone(), node.frequency.clone()),
            );
            if let (Some(parent), Some(relation)) = (&node.parent, node.relation) {
                contribution.add_edge(
                    EdgeDraft::new(node.name.as_str(), parent.as_str(), relation.into())
                        .with_explanation(node.description.as_str())
                        .with_confidence(h.confidence),
                );
            }
        }
        for connection in &h.cross_connections {
            contribution.add_edge(
                EdgeDraft::new(
                    connection.from_node.as_str(),
                    connection.to_node.as_str(),
                    connection.relation.into(),
                )
                .with_explanation(connection.explanation.as_str())
                .with_confidence(h.confidence),
            );
        }
    }

    for pattern in patterns {
        add_node(
            &mut contribution,
            &mut known_keys,
            NodeDraft::new(pattern.name.as_str(), NodeKind::Pattern)
                .with_description(pattern.description.as_str())
                .with_terms(pattern.key_terms.clone())
                .with_confidence(pattern.confidence),
        );
        for practice in &pattern.related_practices {
            // only link practices that exist somewhere, otherwise the static
            // mapping would dangle the whole contribution
            let key = node_key(practice);
            if known_keys.contains(&key) || graph.contains(practice) {
                contribution.add_edge(
                    EdgeDraft::new(pattern.name.as_str(), practice.as_str(), Relation::RelatedTo)
                        .with_explanation(pattern.source_excerpt.as_str())
                        .with_confidence(pattern.confidence),
                );
            }
        }
    }

    for chain in chains {
        for stage in &chain.stages {
            add_node(
                &mut contribution,
                &mut known_keys,
                NodeDraft::new(stage.name.as_str(), NodeKind::ProcessStage)
                    .with_description(stage.description.as_str())
                    .with_terms(stage.terms.clone())
                    .with_confidence(chain.confidence),
            );
        }
        for stage in &chain.stages {
            for &target in &stage.enables {
                contribution.add_edge(
                    EdgeDraft::new(
                        stage.name.as_str(),
                        chain.stages[target - 1].name.as_str(),
                        Relation::Enables,
                    )
                    .with_explanation(chain.process_name.as_str())
                    .with_confidence(chain.confidence),
                );
            }
            for &origin in &stage.emerges_from {
                contribution.add_edge(
                    EdgeDraft::new(
                        stage.name.as_str(),
                        chain.stages[origin - 1].name.as_str(),
                        Relation::EmergesFrom,
                    )
                    .with_explanation(chain.process_name.as_str())
                    .with_confidence(chain.confidence),
                );
            }
        }
    }

    contribution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ChainStage, ConceptNode, HierarchyRelation};
    use std::collections::BTreeSet;

    fn stage(index: usize, name: &str, terms: &[&str]) -> ChainStage {
        ChainStage {
            index,
            name: name.to_string(),
            description: format!("этап {name}"),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            emerges_from: BTreeSet::new(),
            enables: BTreeSet::new(),
        }
    }

    #[test]
    fn chain_stages_become_linked_process_nodes() {
        let mut first = stage(1, "захват внимания", &["захват внимания"]);
        let mut second = stage(2, "осознавание", &["осознавание", "захват внимания"]);
        first.enables.insert(2);
        second.emerges_from.insert(1);
        let chain = CausalChain {
            process_name: "захват внимания → осознавание".to_string(),
            category: "attention_work".to_string(),
            stages: vec![first, second],
            interventions: Vec::new(),
            is_cyclical: false,
            wholeness_markers: Vec::new(),
            confidence: 0.7,
            density: 0.5,
            source_excerpt: String::new(),
        };
        let graph = KnowledgeGraph::new();
        let contribution = build_contribution(&[], &[chain], None, &graph);
        assert_eq!(contribution.nodes.len(), 2);
        assert_eq!(contribution.edges.len(), 2);
        assert!(contribution
            .edges
            .iter()
            .any(|e| e.relation == Relation::Enables && e.from == "захват внимания"));
        assert!(contribution
            .edges
            .iter()
            .any(|e| e.relation == Relation::EmergesFrom && e.from == "осознавание"));
    }

    #[test]
    fn pattern_practice_links_require_an_existing_practice() {
        let pattern = Pattern {
            category: "transformation_triad".to_string(),
            name: "триада трансформации".to_string(),
            description: String::new(),
            key_terms: vec!["осознавание".to_string()],
            markers: Vec::new(),
            related_practices: vec!["метанаблюдение".to_string()],
            source_excerpt: String::new(),
            confidence: 0.6,
        };
        let graph = KnowledgeGraph::new();
        let contribution = build_contribution(&[pattern.clone()], &[], None, &graph);
        // practice node exists nowhere, the edge is suppressed
        assert!(contribution.edges.is_empty());

        let hierarchy = ConceptHierarchy {
            root: ConceptNode {
                name: "нейро-сталкинг".to_string(),
                level: ConceptLevel::Root,
                parent: None,
                relation: None,
                description: String::new(),
                terms: Vec::new(),
                tier: Some(1),
                duration: None,
                frequency: None,
            },
            domains: vec![ConceptNode {
                name: "поле внимания".to_string(),
                level: ConceptLevel::Domain,
                parent: Some("нейро-сталкинг".to_string()),
                relation: Some(HierarchyRelation::IsCoreComponentOf),
                description: String::new(),
                terms: Vec::new(),
                tier: Some(2),
                duration: None,
                frequency: None,
            }],
            practices: vec![ConceptNode {
                name: "метанаблюдение".to_string(),
                level: ConceptLevel::Practice,
                parent: Some("поле внимания".to_string()),
                relation: Some(HierarchyRelation::IsPracticeFor),
                description: String::new(),
                terms: Vec::new(),
                tier: Some(3),
                duration: None,
                frequency: None,
            }],
            techniques: Vec::new(),
            exercises: Vec::new(),
            cross_connections: Vec::new(),
            confidence: 0.8,
            density: 0.5,
        };
        let contribution = build_contribution(&[pattern], &[], Some(&hierarchy), &graph);
        assert!(contribution
            .edges
            .iter()
            .any(|e| e.relation == Relation::RelatedTo && e.to == "метанаблюдение"));
    }
}
