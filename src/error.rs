//! Rich diagnostic error types for the lekton pipeline.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text so users know exactly what
//! went wrong and how to fix it.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the lekton pipeline.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text, source chains) through to the
/// user.
#[derive(Debug, Error, Diagnostic)]
pub enum LektonError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Merge(#[from] MergeError),
}

/// Convenience result alias used throughout the crate.
pub type LektonResult<T> = Result<T, LektonError>;

// ---------------------------------------------------------------------------
// Configuration and dictionary errors (always fatal)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read dictionary file {path}: {source}")]
    #[diagnostic(
        code(lekton::config::io),
        help(
            "Check that the terminology directory exists and contains \
             terms.toml, forbidden.toml and categories.toml with read \
             permissions."
        )
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed TOML in {origin}: {message}")]
    #[diagnostic(
        code(lekton::config::parse),
        help("Fix the TOML syntax or field types in the named dictionary file.")
    )]
    Parse { origin: String, message: String },

    #[error("ambiguous terminology: '{first}' and '{second}' both normalize to lemma '{lemma}'")]
    #[diagnostic(
        code(lekton::config::ambiguous_term),
        help(
            "Every dictionary entry must normalize to a unique lemma, otherwise \
             text matches cannot be attributed to a single canonical term. \
             Remove one of the entries or register it as an alias of the other."
        )
    )]
    AmbiguousTerm {
        first: String,
        second: String,
        lemma: String,
    },

    #[error("alias '{alias}' points to unknown term '{target}'")]
    #[diagnostic(
        code(lekton::config::dangling_alias),
        help("Alias targets must be canonical surface forms declared in a tier.")
    )]
    DanglingAlias { alias: String, target: String },

    #[error("tier rank {rank} is outside the supported range 1..=6")]
    #[diagnostic(
        code(lekton::config::invalid_tier),
        help(
            "Tiers encode the terminology hierarchy: 1=root, 2=domain, \
             3=practice, 4=technique, 5=diagnostic, 6=state."
        )
    )]
    InvalidTier { rank: u8 },

    #[error("threshold '{name}' = {value} is outside [0.0, 1.0]")]
    #[diagnostic(
        code(lekton::config::invalid_threshold),
        help("Density thresholds are fractions of significant tokens.")
    )]
    InvalidThreshold { name: &'static str, value: f32 },
}

// ---------------------------------------------------------------------------
// Graph merge errors (contribution discarded, graph untouched)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MergeError {
    #[error("edge '{from}' -> '{to}' references a node absent from both the contribution and the graph")]
    #[diagnostic(
        code(lekton::merge::dangling_edge),
        help(
            "Every edge endpoint must resolve to a node in the contribution or \
             an existing graph node. The whole contribution was discarded; the \
             graph is unchanged."
        )
    )]
    DanglingEdge { from: String, to: String },

    #[error("hierarchy edge '{from}' -> '{to}' is a self-reference")]
    #[diagnostic(
        code(lekton::merge::self_loop),
        help("Hierarchy relations must connect two distinct concepts.")
    )]
    SelfLoop { from: String, to: String },

    #[error(
        "hierarchy edge '{from}' ({from_level}) -> '{to}' ({to_level}) does not step exactly one level up"
    )]
    #[diagnostic(
        code(lekton::merge::level_inversion),
        help(
            "Hierarchy edges point from a child to its parent one level above \
             (exercise -> technique -> practice -> domain -> root). Anything \
             else would let cycles into the hierarchy."
        )
    )]
    LevelInversion {
        from: String,
        from_level: String,
        to: String,
        to_level: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: LektonError = ConfigError::InvalidTier { rank: 9 }.into();
        assert!(matches!(
            err,
            LektonError::Config(ConfigError::InvalidTier { rank: 9 })
        ));
    }

    #[test]
    fn merge_error_display_names_both_endpoints() {
        let err = MergeError::DanglingEdge {
            from: "a".into(),
            to: "b".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'a'") && msg.contains("'b'"));
    }
}
