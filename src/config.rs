//! Explicit configuration for the validator, extractors and processor.
//!
//! All values are plain struct fields with documented defaults. Nothing is read
//! from the environment; callers construct a config and pass it in.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::validate::ValidationMode;

/// Validator thresholds and policy mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Default policy mode applied by `validate`.
    pub mode: ValidationMode,
    /// Minimum density under `smart` and `off`.
    pub min_density_smart: f32,
    /// Minimum density under `soft` and `strict`.
    pub min_density_strict: f32,
    /// Minimum density of the local window for a forbidden occurrence to
    /// count as explanatory in `soft` mode.
    pub contextual_density: f32,
    /// Half-width of the explanatory window, in significant words.
    pub context_window: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Smart,
            min_density_smart: 0.15,
            min_density_strict: 0.25,
            contextual_density: 0.35,
            context_window: 4,
        }
    }
}

impl ValidatorConfig {
    /// Check all thresholds are valid fractions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("min_density_smart", self.min_density_smart),
            ("min_density_strict", self.min_density_strict),
            ("contextual_density", self.contextual_density),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }
        Ok(())
    }

    /// Threshold applied for a given mode.
    pub fn min_density(&self, mode: ValidationMode) -> f32 {
        match mode {
            ValidationMode::Smart | ValidationMode::Off => self.min_density_smart,
            ValidationMode::Soft | ValidationMode::Strict => self.min_density_strict,
        }
    }
}

/// Additive confidence weights for causal chains.
///
/// confidence = base + min(per_stage * stages, stage_cap)
///            + min(per_term * distinct_terms, term_cap)
///            + min(per_link * linked_stages, link_cap), capped at 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainWeights {
    pub base: f32,
    pub per_stage: f32,
    pub stage_cap: f32,
    pub per_term: f32,
    pub term_cap: f32,
    pub per_link: f32,
    pub link_cap: f32,
}

impl Default for ChainWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            per_stage: 0.05,
            stage_cap: 0.2,
            per_term: 0.02,
            term_cap: 0.2,
            per_link: 0.05,
            link_cap: 0.1,
        }
    }
}

/// Additive confidence weights for terminological patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternWeights {
    pub per_entity: f32,
    pub entity_cap: f32,
    pub per_category_term: f32,
    pub category_cap: f32,
}

impl Default for PatternWeights {
    fn default() -> Self {
        Self {
            per_entity: 0.15,
            entity_cap: 0.7,
            per_category_term: 0.10,
            category_cap: 0.3,
        }
    }
}

/// Additive confidence weights for concept hierarchies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyWeights {
    pub base: f32,
    pub per_domain: f32,
    pub domain_cap: f32,
    pub per_practice: f32,
    pub practice_cap: f32,
    pub per_technique: f32,
    pub technique_cap: f32,
    /// Added when all of domains, practices and techniques are present.
    pub completeness_bonus: f32,
}

impl Default for HierarchyWeights {
    fn default() -> Self {
        Self {
            base: 0.5,
            per_domain: 0.1,
            domain_cap: 0.2,
            per_practice: 0.05,
            practice_cap: 0.15,
            per_technique: 0.02,
            technique_cap: 0.1,
            completeness_bonus: 0.05,
        }
    }
}

/// Structural limits and weights shared by the rule-based extractors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Minimum stages for a chain to be emitted.
    pub min_stages: usize,
    /// Maximum stages taken from a category's sentence sequence.
    pub max_stages: usize,
    /// Minimum distinct domain terms across a chain's stages.
    pub min_chain_terms: usize,
    /// Minimum distinct domain terms across a hierarchy's nodes.
    pub min_hierarchy_terms: usize,
    pub chain: ChainWeights,
    pub pattern: PatternWeights,
    pub hierarchy: HierarchyWeights,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_stages: 2,
            max_stages: 10,
            min_chain_terms: 3,
            min_hierarchy_terms: 3,
            chain: ChainWeights::default(),
            pattern: PatternWeights::default(),
            hierarchy: HierarchyWeights::default(),
        }
    }
}

/// Full processor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub validator: ValidatorConfig,
    pub extractor: ExtractorConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let cfg = ValidatorConfig::default();
        assert_eq!(cfg.min_density(ValidationMode::Smart), 0.15);
        assert_eq!(cfg.min_density(ValidationMode::Off), 0.15);
        assert_eq!(cfg.min_density(ValidationMode::Soft), 0.25);
        assert_eq!(cfg.min_density(ValidationMode::Strict), 0.25);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let cfg = ValidatorConfig {
            contextual_density: 1.5,
            ..ValidatorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
