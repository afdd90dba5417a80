//! Strict 5-level concept hierarchy extraction.
//!
//! Root (tier 1) → domain → practice → technique → exercise. Levels never
//! skip: every non-root node attaches to the nearest already-established
//! parent exactly one level up, with the fixed relation for that level pair.
//! Exercises are synthesized from imperative marker sentences naming a
//! technique; lateral cross-connections come from relation-marker sentences
//! naming two identified nodes.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExtractorConfig;
use crate::morpho;
use crate::terminology::{TermEntry, TerminologyIndex};
use crate::validate::{RejectReason, TerminologyValidator};

use super::{split_sentences, HierarchyExtraction, SentenceCtx};

/// Hierarchy level, strictly ordered from root down.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConceptLevel {
    Root,
    Domain,
    Practice,
    Technique,
    Exercise,
}

impl ConceptLevel {
    /// Distance from the root, 0..=4.
    pub fn depth(self) -> u8 {
        match self {
            Self::Root => 0,
            Self::Domain => 1,
            Self::Practice => 2,
            Self::Technique => 3,
            Self::Exercise => 4,
        }
    }

    /// The level a node of this level attaches under.
    pub fn parent_level(self) -> Option<Self> {
        match self {
            Self::Root => None,
            Self::Domain => Some(Self::Root),
            Self::Practice => Some(Self::Domain),
            Self::Technique => Some(Self::Practice),
            Self::Exercise => Some(Self::Technique),
        }
    }

    /// Level encoded by a dictionary tier, for tiers 1..=4.
    pub fn from_tier(tier: u8) -> Option<Self> {
        match tier {
            1 => Some(Self::Root),
            2 => Some(Self::Domain),
            3 => Some(Self::Practice),
            4 => Some(Self::Technique),
            _ => None,
        }
    }
}

impl fmt::Display for ConceptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Root => "root",
            Self::Domain => "domain",
            Self::Practice => "practice",
            Self::Technique => "technique",
            Self::Exercise => "exercise",
        };
        f.write_str(s)
    }
}

/// Fixed child → parent relation per level pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyRelation {
    IsCoreComponentOf,
    IsPracticeFor,
    IsTechniqueFor,
    IsExerciseFor,
}

impl HierarchyRelation {
    pub fn for_child_level(level: ConceptLevel) -> Option<Self> {
        match level {
            ConceptLevel::Root => None,
            ConceptLevel::Domain => Some(Self::IsCoreComponentOf),
            ConceptLevel::Practice => Some(Self::IsPracticeFor),
            ConceptLevel::Technique => Some(Self::IsTechniqueFor),
            ConceptLevel::Exercise => Some(Self::IsExerciseFor),
        }
    }
}

/// Lateral relation between identified nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossRelation {
    Enables,
    Requires,
    LeadsTo,
}

/// A node of the extracted hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    pub name: String,
    pub level: ConceptLevel,
    /// Parent node name; `None` only for the root.
    pub parent: Option<String>,
    pub relation: Option<HierarchyRelation>,
    /// First sentence mentioning the concept.
    pub description: String,
    /// Dictionary terms named alongside the concept.
    pub terms: Vec<String>,
    /// Dictionary tier for dictionary-backed nodes.
    pub tier: Option<u8>,
    pub duration: Option<String>,
    pub frequency: Option<String>,
}

/// A lateral connection between two identified nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossConnection {
    pub from_node: String,
    pub to_node: String,
    pub relation: CrossRelation,
    pub explanation: String,
}

/// The extracted hierarchy: exactly one root, strict level stepping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptHierarchy {
    pub root: ConceptNode,
    pub domains: Vec<ConceptNode>,
    pub practices: Vec<ConceptNode>,
    pub techniques: Vec<ConceptNode>,
    pub exercises: Vec<ConceptNode>,
    pub cross_connections: Vec<CrossConnection>,
    pub confidence: f32,
    pub density: f32,
}

impl ConceptHierarchy {
    /// All nodes, root first, level by level.
    pub fn nodes(&self) -> impl Iterator<Item = &ConceptNode> {
        std::iter::once(&self.root)
            .chain(&self.domains)
            .chain(&self.practices)
            .chain(&self.techniques)
            .chain(&self.exercises)
    }
}

/// Why no hierarchy came out of a fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HierarchyReject {
    Validation(RejectReason),
    NoValidRoot,
    TooFewTerms { found: usize, required: usize },
}

impl fmt::Display for HierarchyReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(reason) => write!(f, "validation failed: {reason}"),
            Self::NoValidRoot => f.write_str("no tier-1 root concept in fragment"),
            Self::TooFewTerms { found, required } => {
                write!(f, "hierarchy names {found} distinct terms, {required} required")
            }
        }
    }
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+(?:[-–]\d+)?\s*(?:минут|час|секунд)[а-я]*")
            .unwrap_or_else(|_| unreachable!())
    })
}

fn frequency_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+\s*раза?\s*(?:в|на)\s*(?:день|неделю|месяц)")
            .unwrap_or_else(|_| unreachable!())
    })
}

/// A dictionary-backed candidate with its first-mention sentence.
struct Candidate<'a> {
    entry: &'a TermEntry,
    mention: usize,
}

pub struct ConceptHierarchyExtractor {
    index: Arc<TerminologyIndex>,
    validator: TerminologyValidator,
    config: ExtractorConfig,
}

impl ConceptHierarchyExtractor {
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

    pub fn extract(&self, text: &str) -> HierarchyExtraction {
        let validation = self.validator.validate(text);
        if !validation.accepted {
            return HierarchyExtraction {
                accepted: false,
                reason: validation.reason.map(HierarchyReject::Validation),
                density: validation.density,
                hierarchy: None,
            };
        }

        let sentences = split_sentences(text);
        let roots = candidates_at(&validation.matched_entities, &sentences, 1);
        let Some(root_candidate) = roots.first() else {
            debug!("hierarchy rejected: no tier-1 concept");
            return HierarchyExtraction {
                accepted: true,
                reason: Some(HierarchyReject::NoValidRoot),
                density: validation.density,
                hierarchy: None,
            };
        };
        let root = self.dictionary_node(root_candidate, None, &sentences, &validation);

        let mut parents: Vec<(String, usize)> =
            vec![(root.name.clone(), root_candidate.mention)];
        let mut levels: Vec<Vec<ConceptNode>> = Vec::new();
        for tier in 2..=4u8 {
            let mut nodes = Vec::new();
            let mut next_parents = Vec::new();
            for candidate in candidates_at(&validation.matched_entities, &sentences, tier) {
                // strict stepping: no parents one level up means candidates
                // at this level cannot be instantiated
                let Some(parent) = nearest_parent(&parents, candidate.mention) else {
                    debug!(tier, term = %candidate.entry.surface_form, "no parent level, candidate skipped");
                    continue;
                };
                let parent = parent.to_string();
                let node =
                    self.dictionary_node(&candidate, Some(&parent), &sentences, &validation);
                next_parents.push((node.name.clone(), candidate.mention));
                nodes.push(node);
            }
            parents = next_parents;
            levels.push(nodes);
        }
        let mut levels = levels.into_iter();
        let domains = levels.next().unwrap_or_default();
        let practices = levels.next().unwrap_or_default();
        let techniques = levels.next().unwrap_or_default();

        let exercises = self.exercises(&techniques, &sentences);
        let cross_connections = self.cross_connections(
            &root,
            [&domains, &practices, &techniques],
            &sentences,
        );

        let distinct: BTreeSet<String> = std::iter::once(&root)
            .chain(&domains)
            .chain(&practices)
            .chain(&techniques)
            .map(|n| morpho::lemmatize(&n.name))
            .collect();
        if distinct.len() < self.config.min_hierarchy_terms {
            debug!(
                found = distinct.len(),
                required = self.config.min_hierarchy_terms,
                "hierarchy rejected: too few distinct terms"
            );
            return HierarchyExtraction {
                accepted: true,
                reason: Some(HierarchyReject::TooFewTerms {
                    found: distinct.len(),
                    required: self.config.min_hierarchy_terms,
                }),
                density: validation.density,
                hierarchy: None,
            };
        }

        let confidence = self.confidence(domains.len(), practices.len(), techniques.len());
        HierarchyExtraction {
            accepted: true,
            reason: None,
            density: validation.density,
            hierarchy: Some(ConceptHierarchy {
                root,
                domains,
                practices,
                techniques,
                exercises,
                cross_connections,
                confidence,
                density: validation.density,
            }),
        }
    }

    fn dictionary_node(
        &self,
        candidate: &Candidate<'_>,
        parent: Option<&str>,
        sentences: &[SentenceCtx],
        validation: &crate::validate::ValidationResult,
    ) -> ConceptNode {
        let level = ConceptLevel::from_tier(candidate.entry.tier)
            .unwrap_or(ConceptLevel::Technique);
        let sentence = sentences.iter().find(|s| s.index == candidate.mention);
        let (description, terms) = match sentence {
            Some(s) => (
                s.text.clone(),
                super::entities_in_sentence(s, &validation.matched_entities)
                    .iter()
                    .map(|e| e.entry.surface_form.clone())
                    .collect(),
            ),
            None => (String::new(), Vec::new()),
        };
        ConceptNode {
            name: candidate.entry.surface_form.clone(),
            level,
            parent: parent.map(str::to_string),
            relation: HierarchyRelation::for_child_level(level),
            description,
            terms,
            tier: Some(candidate.entry.tier),
            duration: None,
            frequency: None,
        }
    }

    /// Imperative marker sentences naming a technique (same or previous
    /// sentence) become exercise nodes under that technique.
    fn exercises(
        &self,
        techniques: &[ConceptNode],
        sentences: &[SentenceCtx],
    ) -> Vec<ConceptNode> {
        let markers = self.index.markers();
        let mut exercises: Vec<ConceptNode> = Vec::new();
        for (pos, sentence) in sentences.iter().enumerate() {
            if !markers.exercise.iter().any(|m| sentence.folded.contains(m.as_str())) {
                continue;
            }
            let technique = techniques.iter().find(|t| {
                let lemma = morpho::lemmatize(&t.name);
                super::lemma_present(&sentence.lemmas, &lemma)
                    || pos
                        .checked_sub(1)
                        .map(|p| super::lemma_present(&sentences[p].lemmas, &lemma))
                        .unwrap_or(false)
            });
            let Some(technique) = technique else {
                continue;
            };
            let name = format!("упражнение: {}", technique.name);
            if exercises.iter().any(|e| e.name == name) {
                continue;
            }
            exercises.push(ConceptNode {
                name,
                level: ConceptLevel::Exercise,
                parent: Some(technique.name.clone()),
                relation: Some(HierarchyRelation::IsExerciseFor),
                description: sentence.text.clone(),
                terms: vec![technique.name.clone()],
                tier: None,
                duration: duration_regex()
                    .find(&sentence.folded)
                    .map(|m| m.as_str().to_string()),
                frequency: frequency_regex()
                    .find(&sentence.folded)
                    .map(|m| m.as_str().to_string())
                    .or_else(|| {
                        sentence
                            .folded
                            .contains("ежедневно")
                            .then(|| "ежедневно".to_string())
                    }),
            });
        }
        exercises
    }

    /// Sentences naming two identified nodes plus a relation marker yield a
    /// lateral edge, directed by order of appearance in the sentence.
    fn cross_connections(
        &self,
        root: &ConceptNode,
        levels: [&Vec<ConceptNode>; 3],
        sentences: &[SentenceCtx],
    ) -> Vec<CrossConnection> {
        let markers = self.index.markers();
        let named: Vec<(String, String)> = std::iter::once(root)
            .chain(levels.into_iter().flatten())
            .map(|n| (n.name.clone(), morpho::lemmatize(&n.name)))
            .collect();
        let mut connections: Vec<CrossConnection> = Vec::new();
        for sentence in sentences {
            let relation = [
                (&markers.enables, CrossRelation::Enables),
                (&markers.requires, CrossRelation::Requires),
                (&markers.leads_to, CrossRelation::LeadsTo),
            ]
            .into_iter()
            .find(|(vocab, _)| vocab.iter().any(|m| sentence.folded.contains(m.as_str())))
            .map(|(_, relation)| relation);
            let Some(relation) = relation else {
                continue;
            };

            let mut present: Vec<(usize, &str)> = named
                .iter()
                .filter_map(|(name, lemma)| {
                    super::lemma_position(&sentence.lemmas, lemma).map(|pos| (pos, name.as_str()))
                })
                .collect();
            present.sort_by_key(|&(pos, _)| pos);
            if present.len() < 2 {
                continue;
            }
            let (from, to) = (present[0].1, present[1].1);
            if from == to
                || connections
                    .iter()
                    .any(|c| c.from_node == from && c.to_node == to && c.relation == relation)
            {
                continue;
            }
            connections.push(CrossConnection {
                from_node: from.to_string(),
                to_node: to.to_string(),
                relation,
                explanation: sentence.text.clone(),
            });
        }
        connections
    }

    fn confidence(&self, domains: usize, practices: usize, techniques: usize) -> f32 {
        let w = &self.config.hierarchy;
        let mut value = w.base
            + (domains as f32 * w.per_domain).min(w.domain_cap)
            + (practices as f32 * w.per_practice).min(w.practice_cap)
            + (techniques as f32 * w.per_technique).min(w.technique_cap);
        if domains > 0 && practices > 0 && techniques > 0 {
            value += w.completeness_bonus;
        }
        value.min(1.0)
    }
}

/// Dictionary entities at a tier that are actually mentioned in a kept
/// sentence, ordered by first mention.
fn candidates_at<'a>(
    entities: &'a [crate::validate::MatchedEntity],
    sentences: &[SentenceCtx],
    tier: u8,
) -> Vec<Candidate<'a>> {
    let mut found: Vec<Candidate<'a>> = entities
        .iter()
        .filter(|e| e.entry.tier == tier)
        .filter_map(|e| {
            first_mention(sentences, &e.entry.canonical_lemma).map(|mention| Candidate {
                entry: &e.entry,
                mention,
            })
        })
        .collect();
    found.sort_by_key(|c| c.mention);
    found
}

/// Sentence index of the first sentence containing a lemma.
fn first_mention(sentences: &[SentenceCtx], lemma: &str) -> Option<usize> {
    sentences
        .iter()
        .find(|s| super::lemma_present(&s.lemmas, lemma))
        .map(|s| s.index)
}

/// Parent with the closest first mention at or before the candidate's; when
/// none precedes the candidate, the earliest parent.
fn nearest_parent(parents: &[(String, usize)], mention: usize) -> Option<&str> {
    if parents.is_empty() {
        return None;
    }
    let mut best: Option<&(String, usize)> = None;
    for parent in parents.iter().filter(|(_, m)| *m <= mention) {
        match best {
            Some((_, m)) if parent.1 <= *m => {}
            _ => best = Some(parent),
        }
    }
    let chosen = best.or_else(|| parents.iter().min_by_key(|(_, m)| *m));
    chosen.map(|(name, _)| name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorConfig;

    fn extractor() -> ConceptHierarchyExtractor {
        let index = Arc::new(TerminologyIndex::bundled().unwrap());
        let validator =
            TerminologyValidator::new(Arc::clone(&index), ValidatorConfig::default()).unwrap();
        ConceptHierarchyExtractor::new(index, validator, ExtractorConfig::default())
    }

    const FULL_TEXT: &str = "Нейро-сталкинг включает поле внимания и наблюдающее сознание. \
        Метанаблюдение это практика для поля внимания. \
        Практикуй остановку внутреннего диалога 5 минут ежедневно.";

    #[test]
    fn builds_all_five_levels() {
        let result = extractor().extract(FULL_TEXT);
        assert!(result.accepted, "reason: {:?}", result.reason);
        let h = result.hierarchy.expect("hierarchy");
        assert_eq!(h.root.name, "нейро-сталкинг");
        assert_eq!(h.root.level, ConceptLevel::Root);
        assert!(h.root.parent.is_none());
        assert_eq!(h.domains.len(), 2);
        assert_eq!(h.practices.len(), 1);
        assert_eq!(h.techniques.len(), 1);
        assert_eq!(h.exercises.len(), 1);
        assert!(h.confidence > 0.8);
    }

    #[test]
    fn strict_level_stepping() {
        let result = extractor().extract(FULL_TEXT);
        let h = result.hierarchy.expect("hierarchy");
        for node in h.nodes() {
            match node.level.parent_level() {
                None => assert!(node.parent.is_none()),
                Some(expected) => {
                    let parent_name = node.parent.as_deref().expect("parent");
                    let parent = h.nodes().find(|n| n.name == parent_name).expect("resolvable");
                    assert_eq!(parent.level, expected, "node {}", node.name);
                }
            }
        }
    }

    #[test]
    fn exercise_captures_duration_and_frequency() {
        let result = extractor().extract(FULL_TEXT);
        let h = result.hierarchy.expect("hierarchy");
        let exercise = &h.exercises[0];
        assert_eq!(
            exercise.parent.as_deref(),
            Some("остановка внутреннего диалога")
        );
        assert_eq!(exercise.duration.as_deref(), Some("5 минут"));
        assert_eq!(exercise.frequency.as_deref(), Some("ежедневно"));
    }

    #[test]
    fn missing_root_is_reported() {
        let result = extractor()
            .extract("Метанаблюдение раскрывает осознавание. Поле внимания расширяется присутствием.");
        assert!(result.accepted);
        assert_eq!(result.reason, Some(HierarchyReject::NoValidRoot));
        assert!(result.hierarchy.is_none());
    }

    #[test]
    fn cross_connection_from_relation_marker() {
        let text = "Нейро-сталкинг включает поле внимания и наблюдающее сознание. \
            Метанаблюдение это практика для поля внимания. \
            Центрирование ведет к метанаблюдению напрямую.";
        let result = extractor().extract(text);
        let h = result.hierarchy.expect("hierarchy");
        let connection = h
            .cross_connections
            .iter()
            .find(|c| c.relation == CrossRelation::LeadsTo)
            .expect("leads_to connection");
        assert_eq!(connection.from_node, "центрирование");
        assert_eq!(connection.to_node, "метанаблюдение");
    }

    #[test]
    fn nearest_parent_prefers_latest_earlier_mention() {
        let parents = vec![("a".to_string(), 0), ("b".to_string(), 2), ("c".to_string(), 5)];
        assert_eq!(nearest_parent(&parents, 3), Some("b"));
        assert_eq!(nearest_parent(&parents, 0), Some("a"));
        // nothing at or before: earliest parent
        let later = vec![("x".to_string(), 4)];
        assert_eq!(nearest_parent(&later, 1), Some("x"));
    }
}
