//! genomen-logic: Decision-value runtime for expert-system rules.
//!
//! Covers the rule side of an analysis:
//! - `DecisionValue`: the typed, composable value rule expressions operate on
//! - Allele pattern matching with `N` wildcards
//! - `RuleEvaluator`: binds a sample to rule evaluation, resolves attribute
//!   lookups and sub-rule calls
//! - A built-in rule script engine implementing the `LogicEngine` seam

pub mod allele;
pub mod error;
pub mod evaluator;
pub mod repository;
pub mod script;
pub mod value;

pub use error::LogicError;
pub use evaluator::{Bindings, LogicEngine, LogicHost, RuleEvaluator};
pub use repository::{RuleRepository, SampleDataRepository, ALLELE_FIELD, PHENOTYPE, PHENOTYPE_FIELD, SNP};
pub use script::ScriptEngine;
pub use value::{DecisionValue, ValueKind};
