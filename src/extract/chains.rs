//! Emergent causal-chain extraction.
//!
//! A chain is a sequence of process stages built from the sentences of one
//! fragment that touch a process category. Stages are linked by shared
//! terminology: any two stages sharing a dictionary term are related by
//! emergence (later from earlier) and enablement (earlier to later), not only
//! adjacent ones. Practices from the catalog become intervention points at
//! the first stage that names them.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::morpho;
use crate::terminology::TerminologyIndex;
use crate::validate::{TerminologyValidator, ValidationMode};

use super::{entities_in_sentence, split_sentences, ChainExtraction, SentenceCtx};

/// Longest excerpt kept on a chain, in chars.
const MAX_EXCERPT_CHARS: usize = 500;

/// One stage of a causal chain. Indices are 1-based within the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStage {
    pub index: usize,
    pub name: String,
    pub description: String,
    /// Canonical dictionary terms named by the stage sentence.
    pub terms: Vec<String>,
    /// Stages this one emerges from (shared terminology, earlier stages).
    pub emerges_from: BTreeSet<usize>,
    /// Later stages this one enables.
    pub enables: BTreeSet<usize>,
}

/// A practice applicable at a specific stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionPoint {
    pub stage_index: usize,
    pub practice: String,
    pub triggers: Vec<String>,
    pub expected_outcome: String,
}

/// An extracted process chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalChain {
    pub process_name: String,
    /// Process category id.
    pub category: String,
    pub stages: Vec<ChainStage>,
    pub interventions: Vec<InterventionPoint>,
    pub is_cyclical: bool,
    pub wholeness_markers: Vec<String>,
    pub confidence: f32,
    /// Terminology density of the source fragment.
    pub density: f32,
    pub source_excerpt: String,
}

pub struct CausalChainExtractor {
    index: Arc<TerminologyIndex>,
    validator: TerminologyValidator,
    config: ExtractorConfig,
}

impl CausalChainExtractor {
    pub fn new(
        index: Arc<TerminologyIndex>,
        validator: TerminologyValidator,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            index,
            validator,
            config,
        }
    }

    /// Extract chains, optionally restricted to one process category (by id
    /// or name). Validation always runs under the permissive policy; the
    /// forbidden-term decision belongs to the document gate, not to chains.
    pub fn extract(&self, text: &str, category_filter: Option<&str>) -> ChainExtraction {
        let validation = self.validator.validate_with(text, ValidationMode::Smart, None);
        if !validation.accepted {
            return ChainExtraction {
                accepted: false,
                reason: validation.reason,
                density: validation.density,
                chains: Vec::new(),
            };
        }

        let entity_lemmas: Vec<&str> = validation
            .matched_entities
            .iter()
            .map(|e| e.entry.canonical_lemma.as_str())
            .collect();
        let sentences = split_sentences(text);
        let mut chains = Vec::new();

        for category in self.index.process_categories() {
            if let Some(filter) = category_filter {
                if category.id != filter && category.name != filter {
                    continue;
                }
            }
            let key_lemmas: Vec<(String, &str)> = category
                .key_terms
                .iter()
                .map(|t| (morpho::lemmatize(t), t.as_str()))
                .collect();
            let present = key_lemmas
                .iter()
                .filter(|(lemma, _)| entity_lemmas.contains(&lemma.as_str()))
                .count();
            if present < 2 {
                debug!(category = %category.id, present, "process category not relevant");
                continue;
            }

            let selected: Vec<&SentenceCtx> = sentences
                .iter()
                .filter(|s| {
                    key_lemmas
                        .iter()
                        .any(|(lemma, _)| super::lemma_present(&s.lemmas, lemma))
                        || entity_lemmas
                            .iter()
                            .any(|lemma| super::lemma_present(&s.lemmas, lemma))
                })
                .take(self.config.max_stages)
                .collect();
            if selected.len() < self.config.min_stages {
                debug!(category = %category.id, stages = selected.len(), "too few stages");
                continue;
            }

            if let Some(chain) =
                self.build_chain(category.id.clone(), &key_lemmas, &selected, &validation)
            {
                chains.push(chain);
            }
        }

        ChainExtraction {
            accepted: true,
            reason: None,
            density: validation.density,
            chains,
        }
    }

    fn build_chain(
        &self,
        category_id: String,
        key_lemmas: &[(String, &str)],
        selected: &[&SentenceCtx],
        validation: &crate::validate::ValidationResult,
    ) -> Option<CausalChain> {
        let mut stages = Vec::new();
        let mut stage_lemmas: Vec<BTreeSet<&str>> = Vec::new();
        for (pos, sentence) in selected.iter().enumerate() {
            let entities = entities_in_sentence(sentence, &validation.matched_entities);
            let lemmas: BTreeSet<&str> = entities
                .iter()
                .map(|e| e.entry.canonical_lemma.as_str())
                .collect();
            let name = key_lemmas
                .iter()
                .find(|(lemma, _)| super::lemma_present(&sentence.lemmas, lemma))
                .map(|(_, surface)| surface.to_string())
                .or_else(|| entities.first().map(|e| e.entry.surface_form.clone()))
                .unwrap_or_else(|| "этап процесса".to_string());
            stages.push(ChainStage {
                index: pos + 1,
                name,
                description: sentence.text.clone(),
                terms: entities
                    .iter()
                    .map(|e| e.entry.surface_form.clone())
                    .collect(),
                emerges_from: BTreeSet::new(),
                enables: BTreeSet::new(),
            });
            stage_lemmas.push(lemmas);
        }

        // systemic links: any two stages sharing a term, not only neighbors
        for i in 0..stages.len() {
            for j in i + 1..stages.len() {
                if !stage_lemmas[i].is_disjoint(&stage_lemmas[j]) {
                    stages[j].emerges_from.insert(i + 1);
                    stages[i].enables.insert(j + 1);
                }
            }
        }

        let distinct: BTreeSet<&str> = stage_lemmas.iter().flatten().copied().collect();
        if distinct.len() < self.config.min_chain_terms {
            warn!(
                category = %category_id,
                terms = distinct.len(),
                required = self.config.min_chain_terms,
                "chain dropped: too few distinct terms"
            );
            return None;
        }

        let interventions: Vec<InterventionPoint> = self
            .index
            .practices()
            .iter()
            .filter_map(|practice| {
                let lemma = morpho::lemmatize(&practice.name);
                stages
                    .iter()
                    .zip(&stage_lemmas)
                    .find(|(_, lemmas)| lemmas.contains(lemma.as_str()))
                    .map(|(stage, _)| InterventionPoint {
                        stage_index: stage.index,
                        practice: practice.name.clone(),
                        triggers: practice.triggers.clone(),
                        expected_outcome: practice.outcome.clone(),
                    })
            })
            .collect();

        let span = selected
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(". ");
        let folded_span = morpho::fold(&span);
        let markers = self.index.markers();
        let is_cyclical = markers.cyclical.iter().any(|m| folded_span.contains(m.as_str()));
        let wholeness_markers: Vec<String> = markers
            .wholeness
            .iter()
            .filter(|m| folded_span.contains(m.as_str()))
            .cloned()
            .collect();

        let linked = stages
            .iter()
            .filter(|s| !s.emerges_from.is_empty() || !s.enables.is_empty())
            .count();
        let confidence = self.confidence(stages.len(), distinct.len(), linked);

        let process_name = match stages.len() {
            0 => return None,
            1 => stages[0].name.clone(),
            _ => format!(
                "{} → {}",
                stages[0].name,
                stages[stages.len() - 1].name
            ),
        };

        Some(CausalChain {
            process_name,
            category: category_id,
            stages,
            interventions,
            is_cyclical,
            wholeness_markers,
            confidence,
            density: validation.density,
            source_excerpt: span.chars().take(MAX_EXCERPT_CHARS).collect(),
        })
    }

    fn confidence(&self, stages: usize, distinct_terms: usize, linked_stages: usize) -> f32 {
        let w = &self.config.chain;
        let value = w.base
            + (stages as f32 * w.per_stage).min(w.stage_cap)
            + (distinct_terms as f32 * w.per_term).min(w.term_cap)
            + (linked_stages as f32 * w.per_link).min(w.link_cap);
        value.min(1.0)
    }
}
