//! Terminology validation: density scoring plus a four-mode forbidden-term
//! policy.
//!
//! Density is the fraction of significant tokens that are dictionary-term
//! occurrences, computed for every fragment regardless of mode. The mode only
//! decides what a forbidden general term does: `strict` rejects on sight,
//! `soft` demands an explanatory local context for every occurrence, `smart`
//! and `off` merely report.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ValidatorConfig;
use crate::error::ConfigError;
use crate::morpho;
use crate::terminology::{TermEntry, TerminologyIndex};

/// Forbidden-term policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Low threshold, forbidden terms reported only.
    Smart,
    /// High threshold, forbidden terms allowed in explanatory context.
    Soft,
    /// High threshold, any forbidden occurrence rejects.
    Strict,
    /// Identical to `smart`; kept as an explicit caller intent.
    Off,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Smart => "smart",
            Self::Soft => "soft",
            Self::Strict => "strict",
            Self::Off => "off",
        };
        f.write_str(s)
    }
}

/// Why a fragment was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    InsufficientDensity { density: f32, required: f32 },
    ForbiddenTerm { terms: Vec<String> },
    NonExplanatoryForbidden { terms: Vec<String> },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientDensity { density, required } => {
                write!(f, "terminology density {density:.2} below required {required:.2}")
            }
            Self::ForbiddenTerm { terms } => {
                write!(f, "forbidden terms present: {}", terms.join(", "))
            }
            Self::NonExplanatoryForbidden { terms } => write!(
                f,
                "forbidden terms outside explanatory context: {}",
                terms.join(", ")
            ),
        }
    }
}

/// A dictionary term found in the fragment, with its occurrence count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedEntity {
    pub entry: TermEntry,
    pub count: usize,
}

/// Outcome of validating one fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    /// Always computed, even for rejected fragments. In [0, 1].
    pub density: f32,
    /// Canonical forms of non-tolerated forbidden terms found.
    pub forbidden_hits: Vec<String>,
    /// Deduplicated matches in first-appearance order.
    pub matched_entities: Vec<MatchedEntity>,
}

impl ValidationResult {
    fn rejected(self, reason: RejectReason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            ..self
        }
    }
}

fn cased_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[а-яёА-ЯЁ]+(?:-[а-яёА-ЯЁ]+)*").unwrap_or_else(|_| unreachable!())
    })
}

/// Validator over one terminology index.
#[derive(Debug, Clone)]
pub struct TerminologyValidator {
    index: Arc<TerminologyIndex>,
    config: ValidatorConfig,
}

struct Scan {
    density: f32,
    matched_entities: Vec<MatchedEntity>,
    forbidden_hits: Vec<String>,
    /// Per significant token: is it part of a dictionary-term match.
    significant_domain: Vec<bool>,
    /// Ranks (into `significant_domain`) of non-tolerated forbidden tokens,
    /// paired with the canonical forbidden term.
    forbidden_ranks: Vec<(usize, String)>,
}

impl TerminologyValidator {
    pub fn new(
        index: Arc<TerminologyIndex>,
        config: ValidatorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { index, config })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<TerminologyIndex> {
        &self.index
    }

    /// Validate under the configured default mode.
    pub fn validate(&self, text: &str) -> ValidationResult {
        self.validate_with(text, self.config.mode, None)
    }

    /// Validate under an explicit mode, optionally overriding the minimum
    /// density.
    pub fn validate_with(
        &self,
        text: &str,
        mode: ValidationMode,
        min_density: Option<f32>,
    ) -> ValidationResult {
        let scan = self.scan(text);
        let required = min_density.unwrap_or_else(|| self.config.min_density(mode));
        let result = ValidationResult {
            accepted: true,
            reason: None,
            density: scan.density,
            forbidden_hits: scan.forbidden_hits.clone(),
            matched_entities: scan.matched_entities.clone(),
        };

        if scan.density < required {
            debug!(density = scan.density, required, %mode, "fragment below density threshold");
            return result.rejected(RejectReason::InsufficientDensity {
                density: scan.density,
                required,
            });
        }

        match mode {
            ValidationMode::Smart | ValidationMode::Off => result,
            ValidationMode::Strict => {
                if scan.forbidden_hits.is_empty() {
                    result
                } else {
                    result.rejected(RejectReason::ForbiddenTerm {
                        terms: scan.forbidden_hits,
                    })
                }
            }
            ValidationMode::Soft => {
                let offending = self.non_explanatory(&scan);
                if offending.is_empty() {
                    result
                } else {
                    result.rejected(RejectReason::NonExplanatoryForbidden { terms: offending })
                }
            }
        }
    }

    /// Replace forbidden terms with their advisory replacements, preserving
    /// the rest of the text byte for byte. Never applied to scored text.
    pub fn rewrite_forbidden(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in cased_word_regex().find_iter(text) {
            let lemma = morpho::lemmatize(m.as_str());
            if let Some(entry) = self.index.forbidden_for_lemma(&lemma) {
                out.push_str(&text[last..m.start()]);
                out.push_str(&entry.replacement);
                last = m.end();
            }
        }
        out.push_str(&text[last..]);
        out
    }

    fn scan(&self, text: &str) -> Scan {
        let folded = morpho::fold(text);
        let tokens = morpho::tokenize(&folded);
        let lemmas: Vec<String> = tokens.iter().map(|t| morpho::lemmatize(t)).collect();
        let n = tokens.len();

        let mut is_domain = vec![false; n];
        // (first token position, canonical lemma) per occurrence
        let mut occurrences: Vec<(usize, &str)> = Vec::new();

        // only significant tokens count as occurrences, so the numerator
        // stays inside the denominator's universe
        for (i, lemma) in lemmas.iter().enumerate() {
            if !morpho::is_significant(tokens[i]) {
                continue;
            }
            if let Some(entry) = self.index.lookup_lemma(lemma) {
                is_domain[i] = true;
                occurrences.push((i, entry.canonical_lemma.as_str()));
            }
        }
        for (parts, entry) in self.index.compounds() {
            let k = parts.len();
            if k > n {
                continue;
            }
            for start in 0..=n - k {
                if lemmas[start..start + k]
                    .iter()
                    .map(String::as_str)
                    .eq(parts.iter().map(String::as_str))
                {
                    for flag in &mut is_domain[start..start + k] {
                        *flag = true;
                    }
                    if morpho::is_significant(tokens[start]) {
                        occurrences.push((start, entry.canonical_lemma.as_str()));
                    }
                }
            }
        }
        occurrences.sort_by_key(|&(pos, _)| pos);

        let mut matched_entities: Vec<MatchedEntity> = Vec::new();
        let mut entity_slot: HashMap<&str, usize> = HashMap::new();
        for &(_, lemma) in &occurrences {
            match entity_slot.get(lemma) {
                Some(&slot) => matched_entities[slot].count += 1,
                None => {
                    // compound aliases resolve to the same entry, lookup is total here
                    if let Some(entry) = self.index.lookup_lemma(lemma) {
                        entity_slot.insert(lemma, matched_entities.len());
                        matched_entities.push(MatchedEntity {
                            entry: entry.clone(),
                            count: 1,
                        });
                    }
                }
            }
        }

        let mut significant_domain = Vec::new();
        let mut forbidden_ranks = Vec::new();
        let mut forbidden_hits: Vec<String> = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if !morpho::is_significant(token) {
                continue;
            }
            let rank = significant_domain.len();
            significant_domain.push(is_domain[i]);
            if let Some(entry) = self.index.forbidden_for_lemma(&lemmas[i]) {
                if !entry.allowed {
                    forbidden_ranks.push((rank, entry.term.clone()));
                    if !forbidden_hits.contains(&entry.term) {
                        forbidden_hits.push(entry.term.clone());
                    }
                }
            }
        }

        let significant = significant_domain.len();
        let density = if significant == 0 {
            0.0
        } else {
            (occurrences.len() as f32 / significant as f32).min(1.0)
        };

        Scan {
            density,
            matched_entities,
            forbidden_hits,
            significant_domain,
            forbidden_ranks,
        }
    }

    /// Canonical forms of forbidden occurrences whose local window is not
    /// explanatory: a window is explanatory iff it contains at least one
    /// dictionary term and its domain share reaches the contextual threshold.
    fn non_explanatory(&self, scan: &Scan) -> Vec<String> {
        let w = self.config.context_window;
        let total = scan.significant_domain.len();
        let mut offending = Vec::new();
        for (rank, term) in &scan.forbidden_ranks {
            let lo = rank.saturating_sub(w);
            let hi = (rank + w + 1).min(total);
            let window = &scan.significant_domain[lo..hi];
            let domain = window.iter().filter(|&&d| d).count();
            let share = domain as f32 / window.len() as f32;
            let explanatory = domain >= 1 && share >= self.config.contextual_density;
            if !explanatory && !offending.contains(term) {
                debug!(term, share, "forbidden occurrence lacks explanatory context");
                offending.push(term.clone());
            }
        }
        offending
    }
}
