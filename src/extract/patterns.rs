//! Terminological pattern extraction.
//!
//! A pattern is a sentence that names enough of a category's key terms to
//! count as an instance of that category. Categories, their key terms,
//! recognition markers and related practices all come from the category
//! catalog; nothing is inferred from text beyond term presence.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PatternWeights;
use crate::morpho;
use crate::terminology::TerminologyIndex;
use crate::validate::TerminologyValidator;

use super::{entities_in_sentence, split_sentences, PatternExtraction};

/// Minimum distinct key terms for a category to be relevant to a fragment,
/// and for a sentence to instantiate it.
const MIN_CATEGORY_TERMS: usize = 2;

/// One recognized pattern instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Category id from the catalog.
    pub category: String,
    pub name: String,
    pub description: String,
    /// Dictionary terms present in the instantiating sentence.
    pub key_terms: Vec<String>,
    /// Recognition markers found in the sentence.
    pub markers: Vec<String>,
    /// Static category → practice mapping.
    pub related_practices: Vec<String>,
    pub source_excerpt: String,
    pub confidence: f32,
}

pub struct PatternExtractor {
    index: Arc<TerminologyIndex>,
    validator: TerminologyValidator,
    weights: PatternWeights,
}

impl PatternExtractor {
    pub fn new(
        index: Arc<TerminologyIndex>,
        validator: TerminologyValidator,
        weights: PatternWeights,
    ) -> Self {
        Self {
            index,
            validator,
            weights,
        }
    }

    /// Extract under the validator's configured policy.
    pub fn extract(&self, text: &str) -> PatternExtraction {
        self.extract_with(text, None)
    }

    /// Extract with a caller-supplied minimum density.
    pub fn extract_with(&self, text: &str, min_density: Option<f32>) -> PatternExtraction {
        let validation =
            self.validator
                .validate_with(text, self.validator.config().mode, min_density);
        if !validation.accepted {
            return PatternExtraction {
                accepted: false,
                reason: validation.reason,
                density: validation.density,
                patterns: Vec::new(),
            };
        }

        let entity_lemmas: Vec<&str> = validation
            .matched_entities
            .iter()
            .map(|e| e.entry.canonical_lemma.as_str())
            .collect();
        let sentences = split_sentences(text);
        let mut patterns = Vec::new();

        for category in self.index.pattern_categories() {
            let key_lemmas: Vec<(String, &str)> = category
                .key_terms
                .iter()
                .map(|t| (morpho::lemmatize(t), t.as_str()))
                .collect();
            let present = key_lemmas
                .iter()
                .filter(|(lemma, _)| entity_lemmas.contains(&lemma.as_str()))
                .count();
            if present < MIN_CATEGORY_TERMS {
                debug!(category = %category.id, present, "pattern category not relevant");
                continue;
            }

            for sentence in &sentences {
                let matching: Vec<&str> = key_lemmas
                    .iter()
                    .filter(|(lemma, _)| super::lemma_present(&sentence.lemmas, lemma))
                    .map(|(_, surface)| *surface)
                    .collect();
                if matching.len() < MIN_CATEGORY_TERMS {
                    continue;
                }

                let sentence_entities = entities_in_sentence(sentence, &validation.matched_entities);
                let markers: Vec<String> = category
                    .recognition_markers
                    .iter()
                    .filter(|m| sentence.folded.contains(&morpho::fold(m)))
                    .cloned()
                    .collect();
                let confidence = self.confidence(sentence_entities.len(), matching.len());

                patterns.push(Pattern {
                    category: category.id.clone(),
                    name: category.name.clone(),
                    description: category.description.clone(),
                    key_terms: sentence_entities
                        .iter()
                        .map(|e| e.entry.surface_form.clone())
                        .collect(),
                    markers,
                    related_practices: category.practices.clone(),
                    source_excerpt: sentence.text.clone(),
                    confidence,
                });
            }
        }

        PatternExtraction {
            accepted: true,
            reason: None,
            density: validation.density,
            patterns,
        }
    }

    fn confidence(&self, sentence_entities: usize, category_matches: usize) -> f32 {
        let entity_part =
            (sentence_entities as f32 * self.weights.per_entity).min(self.weights.entity_cap);
        let category_part = (category_matches as f32 * self.weights.per_category_term)
            .min(self.weights.category_cap);
        (entity_part + category_part).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorConfig;
    use crate::validate::ValidationMode;

    fn extractor() -> PatternExtractor {
        let index = Arc::new(TerminologyIndex::bundled().unwrap());
        let validator =
            TerminologyValidator::new(Arc::clone(&index), ValidatorConfig::default()).unwrap();
        PatternExtractor::new(index, validator, PatternWeights::default())
    }

    #[test]
    fn rejected_fragment_yields_no_patterns() {
        let result = extractor().extract("Сегодня была хорошая погода в городе.");
        assert!(!result.accepted);
        assert!(result.patterns.is_empty());
    }

    #[test]
    fn triad_sentence_becomes_a_pattern() {
        let result = extractor()
            .extract("Метанаблюдение раскрывает осознавание и ведет к трансформации восприятия.");
        assert!(result.accepted);
        let pattern = result
            .patterns
            .iter()
            .find(|p| p.category == "transformation_triad")
            .expect("triad pattern");
        assert!(pattern.confidence >= 0.5);
        assert!(pattern.key_terms.contains(&"метанаблюдение".to_string()));
        assert_eq!(
            pattern.related_practices,
            vec!["метанаблюдение".to_string(), "свидетельствование".to_string()]
        );
    }

    #[test]
    fn single_key_term_sentences_do_not_instantiate() {
        // category relevant overall, but each sentence names only one key term
        let result = extractor().extract(
            "Осознавание растет постепенно и спокойно сегодня. Трансформация приходит потом неожиданно и тихо.",
        );
        assert!(result.accepted);
        assert!(result.patterns.is_empty());
    }
}
