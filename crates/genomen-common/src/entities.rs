//! Core entity types shared by the rule runtime and the task orchestration.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// Identity record of one genomic individual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub id: String,
    #[serde(default)]
    pub family_id: Option<String>,
}

impl Sample {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), family_id: None }
    }

    pub fn with_family(id: impl Into<String>, family_id: impl Into<String>) -> Self {
        Self { id: id.into(), family_id: Some(family_id.into()) }
    }
}

// ---------------------------------------------------------------------------
// DataSet
// ---------------------------------------------------------------------------

/// Data stored in one or several files of a single format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSet {
    pub name: String,
    pub files: Vec<String>,
    pub format: String,
}

impl DataSet {
    pub fn new(name: impl Into<String>, files: Vec<String>, format: impl Into<String>) -> Self {
        Self { name: name.into(), files, format: format.into() }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// The declared value category a rule's outcome represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EffectType {
    Numeric,
    Risk,
    Text,
}

impl EffectType {
    /// Serialize to the string stored with results.
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectType::Numeric => "NUMERIC",
            EffectType::Risk    => "RISK",
            EffectType::Text    => "TEXT",
        }
    }

    /// Inverse of [`EffectType::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        [EffectType::Numeric, EffectType::Risk, EffectType::Text]
            .into_iter()
            .find(|t| t.as_str() == name)
    }

    /// Numeric and risk effects carry their value directly; text effects
    /// are looked up as result descriptions.
    pub fn is_quantitative(&self) -> bool {
        matches!(self, EffectType::Numeric | EffectType::Risk)
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, scripted decision over sample data producing a trait verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub effect_type: EffectType,
    pub trait_id: String,
    #[serde(default)]
    pub default_interest_level: i32,
    pub logic: String,
    /// Sub-rules are only reachable through `RULE(id)` from other rules.
    #[serde(default)]
    pub sub_rule: bool,
}

/// Display metadata for a trait that rules report on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
}
