//! # Trialmap Zones
//!
//! Rule configuration loading shared by every rule file (JSON or TOML, strict
//! unknown-key validation, schema version check, source digests) and the
//! source-zone classifier built on per-document-type zone rules.
//!
//! Rule sets are constructed once and never mutated; reloading configuration
//! means building a new [`ZoneRegistry`].

mod classifier;
pub mod config;
mod rules;

pub use classifier::{ZoneClassifier, ZoneDecision};
pub use config::{ConfigSource, Shape, RULES_SCHEMA_VERSION};
pub use rules::{ZoneRegistry, ZoneRule, ZoneRuleSet};
