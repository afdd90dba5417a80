//! # lekton
//!
//! Terminology-gated knowledge extraction for single-author lecture corpora.
//!
//! The pipeline turns transcript fragments into typed knowledge units and
//! merges them into a persistent knowledge graph:
//!
//! - **Terminology** ([`terminology`]): tiered domain dictionary, forbidden
//!   general-vocabulary lexicon, and category catalog, loaded from TOML
//! - **Validation** ([`validate`]): term-density scoring with four policy
//!   modes (`smart`/`soft`/`strict`/`off`) governing forbidden-term handling
//! - **Extraction** ([`extract`]): rule-based extractors for terminological
//!   patterns, emergent causal chains, and strict 5-level concept hierarchies
//! - **Graph** ([`graph`]): string-keyed knowledge graph with idempotent,
//!   all-or-nothing per-document merges and path queries
//! - **Pipeline** ([`pipeline`]): orchestrator sequencing validation, the
//!   three extractors, and the graph merge for each document
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use lekton::config::ProcessorConfig;
//! use lekton::pipeline::{DocumentInput, Processor};
//! use lekton::terminology::TerminologyIndex;
//!
//! # fn main() -> Result<(), lekton::error::LektonError> {
//! let index = Arc::new(TerminologyIndex::bundled()?);
//! let processor = Processor::new(index, ProcessorConfig::default())?;
//! let report = processor.process(&DocumentInput::new("lecture-001", "…"))?;
//! println!("accepted: {}", report.validation.accepted);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod morpho;
pub mod pipeline;
pub mod terminology;
pub mod validate;
