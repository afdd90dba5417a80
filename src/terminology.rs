//! Terminology dictionary: tiered terms, forbidden lexicon, category catalog.
//!
//! Three TOML documents describe the author's vocabulary. They are bundled
//! into the binary and can also be loaded from a directory. Loading is
//! all-or-nothing: any malformed file, out-of-range tier or lemma collision
//! is a fatal [`ConfigError`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::morpho;

const BUNDLED_TERMS: &str = include_str!("../data/terminology/terms.toml");
const BUNDLED_FORBIDDEN: &str = include_str!("../data/terminology/forbidden.toml");
const BUNDLED_CATEGORIES: &str = include_str!("../data/terminology/categories.toml");

/// Hierarchy role encoded by a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLevel {
    Root,
    Domain,
    Practice,
    Technique,
    Diagnostic,
    State,
}

/// One canonical dictionary term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermEntry {
    /// Canonical surface form as the author writes it.
    pub surface_form: String,
    /// Tier rank, 1..=6.
    pub tier: u8,
    /// Hierarchy role of the tier.
    pub level: TierLevel,
    /// Normalized matching form.
    pub canonical_lemma: String,
    /// Registered spelling variants.
    pub aliases: Vec<String>,
}

/// A forbidden general term with its proprietary replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForbiddenEntry {
    pub term: String,
    pub lemma: String,
    pub replacement: String,
    /// Tolerated terms keep their replacement advice but never reject.
    pub allowed: bool,
}

/// Terminological pattern category (§ pattern extractor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub key_terms: Vec<String>,
    #[serde(default)]
    pub recognition_markers: Vec<String>,
    /// Static category → practice mapping; never inferred from text.
    #[serde(default)]
    pub practices: Vec<String>,
}

/// Process category for causal-chain extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCategory {
    pub id: String,
    pub name: String,
    pub key_terms: Vec<String>,
}

/// A practice with its trigger conditions and expected outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeProfile {
    pub name: String,
    pub triggers: Vec<String>,
    pub outcome: String,
}

/// Marker vocabularies shared by the extractors. All matched as substrings
/// of folded text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerSets {
    pub cyclical: Vec<String>,
    pub wholeness: Vec<String>,
    pub exercise: Vec<String>,
    pub enables: Vec<String>,
    pub requires: Vec<String>,
    pub leads_to: Vec<String>,
}

// ---------------------------------------------------------------------------
// TOML shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TermsDoc {
    #[allow(dead_code)]
    meta: MetaDoc,
    #[serde(default)]
    tier: Vec<TierDoc>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

#[derive(Deserialize)]
struct MetaDoc {
    #[allow(dead_code)]
    name: String,
    #[allow(dead_code)]
    version: String,
}

#[derive(Deserialize)]
struct TierDoc {
    rank: u8,
    level: TierLevel,
    terms: Vec<String>,
}

#[derive(Deserialize)]
struct ForbiddenDoc {
    #[serde(default)]
    replacements: HashMap<String, String>,
    #[serde(default)]
    allowed: Vec<String>,
}

#[derive(Deserialize)]
struct CategoriesDoc {
    #[serde(default)]
    pattern_category: Vec<PatternCategory>,
    #[serde(default)]
    process_category: Vec<ProcessCategory>,
    #[serde(default)]
    practice: Vec<PracticeProfile>,
    #[serde(default)]
    markers: MarkerSets,
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Loaded, lemma-indexed terminology.
#[derive(Debug)]
pub struct TerminologyIndex {
    entries: Vec<TermEntry>,
    by_lemma: HashMap<String, usize>,
    /// (part lemmas, entry index) for every space compound, for n-gram scans.
    compounds: Vec<(Vec<String>, usize)>,
    forbidden: Vec<ForbiddenEntry>,
    forbidden_by_lemma: HashMap<String, usize>,
    pattern_categories: Vec<PatternCategory>,
    process_categories: Vec<ProcessCategory>,
    practices: Vec<PracticeProfile>,
    markers: MarkerSets,
}

impl TerminologyIndex {
    /// Load the dictionaries bundled into the binary.
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_sources(BUNDLED_TERMS, BUNDLED_FORBIDDEN, BUNDLED_CATEGORIES, "bundled")
    }

    /// Load `terms.toml`, `forbidden.toml` and `categories.toml` from a
    /// directory.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        let read = |name: &str| -> Result<String, ConfigError> {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })
        };
        let terms = read("terms.toml")?;
        let forbidden = read("forbidden.toml")?;
        let categories = read("categories.toml")?;
        Self::from_sources(&terms, &forbidden, &categories, &dir.display().to_string())
    }

    fn from_sources(
        terms_src: &str,
        forbidden_src: &str,
        categories_src: &str,
        origin: &str,
    ) -> Result<Self, ConfigError> {
        let parse_err = |file: &str, e: toml::de::Error| ConfigError::Parse {
            origin: format!("{origin}/{file}"),
            message: e.message().to_string(),
        };
        let terms_doc: TermsDoc =
            toml::from_str(terms_src).map_err(|e| parse_err("terms.toml", e))?;
        let forbidden_doc: ForbiddenDoc =
            toml::from_str(forbidden_src).map_err(|e| parse_err("forbidden.toml", e))?;
        let categories_doc: CategoriesDoc =
            toml::from_str(categories_src).map_err(|e| parse_err("categories.toml", e))?;

        let mut entries = Vec::new();
        let mut by_lemma: HashMap<String, usize> = HashMap::new();
        let mut by_surface: HashMap<String, usize> = HashMap::new();

        for tier in &terms_doc.tier {
            if !(1..=6).contains(&tier.rank) {
                return Err(ConfigError::InvalidTier { rank: tier.rank });
            }
            for surface in &tier.terms {
                let lemma = morpho::lemmatize(surface);
                let idx = entries.len();
                if let Some(&prev) = by_lemma.get(&lemma) {
                    let prev_entry: &TermEntry = &entries[prev];
                    return Err(ConfigError::AmbiguousTerm {
                        first: prev_entry.surface_form.clone(),
                        second: surface.clone(),
                        lemma,
                    });
                }
                by_lemma.insert(lemma.clone(), idx);
                by_surface.insert(morpho::fold(surface), idx);
                entries.push(TermEntry {
                    surface_form: surface.clone(),
                    tier: tier.rank,
                    level: tier.level,
                    canonical_lemma: lemma,
                    aliases: Vec::new(),
                });
            }
        }

        for (alias, target) in &terms_doc.aliases {
            let Some(&idx) = by_surface.get(&morpho::fold(target)) else {
                return Err(ConfigError::DanglingAlias {
                    alias: alias.clone(),
                    target: target.clone(),
                });
            };
            let lemma = morpho::lemmatize(alias);
            if let Some(&prev) = by_lemma.get(&lemma) {
                if prev != idx {
                    return Err(ConfigError::AmbiguousTerm {
                        first: entries[prev].surface_form.clone(),
                        second: alias.clone(),
                        lemma,
                    });
                }
            }
            by_lemma.insert(lemma, idx);
            entries[idx].aliases.push(alias.clone());
        }

        let compounds = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.canonical_lemma.contains(' '))
            .map(|(i, e)| {
                let parts = e
                    .canonical_lemma
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                (parts, i)
            })
            .collect();

        let allowed: HashSet<String> = forbidden_doc
            .allowed
            .iter()
            .map(|t| morpho::lemmatize(t))
            .collect();
        let mut forbidden = Vec::new();
        let mut forbidden_by_lemma = HashMap::new();
        let mut forbidden_terms: Vec<_> = forbidden_doc.replacements.into_iter().collect();
        forbidden_terms.sort();
        for (term, replacement) in forbidden_terms {
            let lemma = morpho::lemmatize(&term);
            forbidden_by_lemma.insert(lemma.clone(), forbidden.len());
            forbidden.push(ForbiddenEntry {
                allowed: allowed.contains(&lemma),
                term,
                lemma,
                replacement,
            });
        }

        let index = Self {
            entries,
            by_lemma,
            compounds,
            forbidden,
            forbidden_by_lemma,
            pattern_categories: categories_doc.pattern_category,
            process_categories: categories_doc.process_category,
            practices: categories_doc.practice,
            markers: categories_doc.markers,
        };
        info!(
            origin,
            terms = index.entries.len(),
            forbidden = index.forbidden.len(),
            pattern_categories = index.pattern_categories.len(),
            process_categories = index.process_categories.len(),
            "terminology loaded"
        );
        Ok(index)
    }

    /// Resolve a word (any inflected form or alias) to its dictionary entry.
    pub fn lookup(&self, word: &str) -> Option<&TermEntry> {
        self.lookup_lemma(&morpho::lemmatize(word))
    }

    /// Resolve an already-normalized lemma.
    pub fn lookup_lemma(&self, lemma: &str) -> Option<&TermEntry> {
        self.by_lemma.get(lemma).map(|&i| &self.entries[i])
    }

    /// Tier of a term, if it belongs to the dictionary.
    pub fn tier_of(&self, word: &str) -> Option<u8> {
        self.lookup(word).map(|e| e.tier)
    }

    pub fn entries(&self) -> &[TermEntry] {
        &self.entries
    }

    /// All entries at a tier rank, dictionary order.
    pub fn terms_at_tier(&self, tier: u8) -> impl Iterator<Item = &TermEntry> {
        self.entries.iter().filter(move |e| e.tier == tier)
    }

    /// Space-compound entries as (part lemmas, entry).
    pub fn compounds(&self) -> impl Iterator<Item = (&[String], &TermEntry)> {
        self.compounds
            .iter()
            .map(|(parts, i)| (parts.as_slice(), &self.entries[*i]))
    }

    /// Forbidden entry for a lemma, tolerated terms included.
    pub fn forbidden_for_lemma(&self, lemma: &str) -> Option<&ForbiddenEntry> {
        self.forbidden_by_lemma.get(lemma).map(|&i| &self.forbidden[i])
    }

    pub fn forbidden(&self) -> &[ForbiddenEntry] {
        &self.forbidden
    }

    pub fn pattern_categories(&self) -> &[PatternCategory] {
        &self.pattern_categories
    }

    pub fn process_categories(&self) -> &[ProcessCategory] {
        &self.process_categories
    }

    pub fn practices(&self) -> &[PracticeProfile] {
        &self.practices
    }

    pub fn markers(&self) -> &MarkerSets {
        &self.markers
    }
}
