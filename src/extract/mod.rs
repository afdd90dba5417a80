//! Rule-based extraction of typed knowledge units.
//!
//! Three extractors share the validator gate and the sentence machinery here:
//! [`patterns::PatternExtractor`], [`chains::CausalChainExtractor`] and
//! [`hierarchy::ConceptHierarchyExtractor`]. The [`Extractor`] trait is the
//! seam for swapping the rule-based strategy for a model-backed one.

pub mod chains;
pub mod hierarchy;
pub mod patterns;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ExtractorConfig;
use crate::error::LektonResult;
use crate::morpho;
use crate::terminology::TerminologyIndex;
use crate::validate::{MatchedEntity, RejectReason, TerminologyValidator};

pub use chains::{CausalChain, CausalChainExtractor, ChainStage, InterventionPoint};
pub use hierarchy::{
    ConceptHierarchy, ConceptHierarchyExtractor, ConceptLevel, ConceptNode, CrossConnection,
    CrossRelation, HierarchyReject, HierarchyRelation,
};
pub use patterns::{Pattern, PatternExtractor};

/// Sentences shorter than this (in chars) carry no extractable structure.
pub(crate) const MIN_SENTENCE_CHARS: usize = 10;

/// Result of a pattern pass over one fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternExtraction {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub density: f32,
    pub patterns: Vec<Pattern>,
}

/// Result of a causal-chain pass over one fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExtraction {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub density: f32,
    pub chains: Vec<CausalChain>,
}

/// Result of a hierarchy pass over one fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyExtraction {
    pub accepted: bool,
    pub reason: Option<HierarchyReject>,
    pub density: f32,
    pub hierarchy: Option<ConceptHierarchy>,
}

/// Extraction strategy. The rule-based implementation is the reference; an
/// LLM-backed implementation can be dropped in behind the same trait.
pub trait Extractor: Send + Sync {
    fn patterns(&self, text: &str) -> LektonResult<PatternExtraction>;
    fn chains(&self, text: &str, category: Option<&str>) -> LektonResult<ChainExtraction>;
    fn hierarchy(&self, text: &str) -> LektonResult<HierarchyExtraction>;
}

/// The reference extractor: one instance of each rule-based pass.
pub struct RuleBasedExtractor {
    patterns: PatternExtractor,
    chains: CausalChainExtractor,
    hierarchy: ConceptHierarchyExtractor,
}

impl RuleBasedExtractor {
    pub fn new(
        index: Arc<TerminologyIndex>,
        validator: TerminologyValidator,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            patterns: PatternExtractor::new(
                Arc::clone(&index),
                validator.clone(),
                config.pattern.clone(),
            ),
            chains: CausalChainExtractor::new(
                Arc::clone(&index),
                validator.clone(),
                config.clone(),
            ),
            hierarchy: ConceptHierarchyExtractor::new(index, validator, config),
        }
    }
}

impl Extractor for RuleBasedExtractor {
    fn patterns(&self, text: &str) -> LektonResult<PatternExtraction> {
        Ok(self.patterns.extract(text))
    }

    fn chains(&self, text: &str, category: Option<&str>) -> LektonResult<ChainExtraction> {
        Ok(self.chains.extract(text, category))
    }

    fn hierarchy(&self, text: &str) -> LektonResult<HierarchyExtraction> {
        Ok(self.hierarchy.extract(text))
    }
}

/// One sentence with its folded form and lemmatized tokens.
#[derive(Debug, Clone)]
pub(crate) struct SentenceCtx {
    /// 0-based position in the fragment, counted before length filtering.
    pub index: usize,
    pub text: String,
    pub folded: String,
    pub lemmas: Vec<String>,
}

/// Split on sentence punctuation, dropping fragments too short to carry
/// structure.
pub(crate) fn split_sentences(text: &str) -> Vec<SentenceCtx> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .enumerate()
        .filter(|(_, s)| s.chars().count() > MIN_SENTENCE_CHARS)
        .map(|(index, s)| {
            let folded = morpho::fold(s);
            let lemmas = morpho::tokenize(&folded)
                .into_iter()
                .map(morpho::lemmatize)
                .collect();
            SentenceCtx {
                index,
                text: s.to_string(),
                folded,
                lemmas,
            }
        })
        .collect()
}

/// First position of a (possibly compound) lemma in a lemma sequence.
pub(crate) fn lemma_position(lemmas: &[String], target: &str) -> Option<usize> {
    let parts: Vec<&str> = target.split_whitespace().collect();
    let k = parts.len();
    if k == 0 || k > lemmas.len() {
        return None;
    }
    (0..=lemmas.len() - k)
        .find(|&start| lemmas[start..start + k].iter().map(String::as_str).eq(parts.iter().copied()))
}

pub(crate) fn lemma_present(lemmas: &[String], target: &str) -> bool {
    lemma_position(lemmas, target).is_some()
}

/// Matched entities whose lemma occurs in the sentence, in sentence order.
pub(crate) fn entities_in_sentence<'a>(
    sentence: &SentenceCtx,
    entities: &'a [MatchedEntity],
) -> Vec<&'a MatchedEntity> {
    let mut found: Vec<(usize, &MatchedEntity)> = entities
        .iter()
        .filter_map(|e| {
            lemma_position(&sentence.lemmas, &e.entry.canonical_lemma).map(|pos| (pos, e))
        })
        .collect();
    found.sort_by_key(|&(pos, _)| pos);
    found.into_iter().map(|(_, e)| e).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_fragments_are_dropped_by_sentence_split() {
        let sentences = split_sentences("Да. Метанаблюдение раскрывает осознавание! Нет?");
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].index, 1);
        assert!(sentences[0].folded.starts_with("метанаблюдение"));
    }

    #[test]
    fn compound_lemmas_are_found_by_window_scan() {
        let lemmas: Vec<String> = ["захват", "пол", "вним", "сужает"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(lemma_present(&lemmas, "пол вним"));
        assert_eq!(lemma_position(&lemmas, "пол вним"), Some(1));
        assert!(!lemma_present(&lemmas, "вним пол"));
    }
}
