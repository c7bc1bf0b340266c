//! Per-task state: the samples under analysis and the results produced for
//! them.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use genomen_common::{Rule, Sample};
use genomen_logic::DecisionValue;
use serde::{Deserialize, Serialize};

/// Verdict of one rule for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntity {
    pub effect: String,
    pub effect_type: String,
    pub trait_id: String,
    pub interest_level: f64,
    pub rule_id: String,
    pub undefined_genotypes: Vec<String>,
    pub undefined_phenotypes: Vec<String>,
    pub tags: Vec<String>,
}

impl ResultEntity {
    pub fn from_decision(rule: &Rule, value: &DecisionValue, tag: &str) -> Self {
        Self {
            effect: value.text_value().to_string(),
            effect_type: rule.effect_type.as_str().to_string(),
            trait_id: rule.trait_id.clone(),
            interest_level: value.interest_level(),
            rule_id: rule.id.clone(),
            undefined_genotypes: value.missing_genotypes().to_vec(),
            undefined_phenotypes: value.missing_phenotypes().to_vec(),
            tags: vec![tag.to_string()],
        }
    }

    /// True when the verdict rests on complete data.
    pub fn resolved(&self) -> bool {
        self.undefined_genotypes.is_empty() && self.undefined_phenotypes.is_empty()
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Output of one analysis for one sample, or for the whole task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Results {
    pub tag: String,
    pub entities: Vec<ResultEntity>,
}

impl Results {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), entities: Vec::new() }
    }

    pub fn push(&mut self, entity: ResultEntity) {
        self.entities.push(entity);
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }
}

type SampleResults = HashMap<String, HashMap<String, Results>>;

/// Mutable state of one task run. Samples are fixed before analysis starts;
/// results may be written concurrently from several workers.
#[derive(Debug)]
pub struct TaskContext {
    task_id: String,
    samples: Vec<Sample>,
    per_sample: RwLock<SampleResults>,
    global: RwLock<HashMap<String, Results>>,
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            samples: Vec::new(),
            per_sample: RwLock::new(HashMap::new()),
            global: RwLock::new(HashMap::new()),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Add a sample unless one with the same id is already present.
    pub fn add_sample(&mut self, sample: Sample) -> bool {
        if self.samples.iter().any(|s| s.id == sample.id) {
            return false;
        }
        self.samples.push(sample);
        true
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn sample(&self, sample_id: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.id == sample_id)
    }

    /// Store results for a sample under their tag. The last write wins.
    pub fn add_result(&self, sample_id: &str, results: Results) {
        let mut per_sample = self.per_sample.write().unwrap_or_else(PoisonError::into_inner);
        per_sample
            .entry(sample_id.to_string())
            .or_default()
            .insert(results.tag.clone(), results);
    }

    pub fn add_global_result(&self, results: Results) {
        let mut global = self.global.write().unwrap_or_else(PoisonError::into_inner);
        global.insert(results.tag.clone(), results);
    }

    /// Results for `(sample_id, tag)`, or an empty `Results` for that tag.
    pub fn get_results(&self, sample_id: &str, tag: &str) -> Results {
        let per_sample = self.per_sample.read().unwrap_or_else(PoisonError::into_inner);
        per_sample
            .get(sample_id)
            .and_then(|by_tag| by_tag.get(tag))
            .cloned()
            .unwrap_or_else(|| Results::new(tag))
    }

    /// Snapshot of every result set recorded for a sample, ordered by tag.
    pub fn get_all_results(&self, sample_id: &str) -> Vec<Results> {
        let per_sample = self.per_sample.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<Results> = per_sample
            .get(sample_id)
            .map(|by_tag| by_tag.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.tag.cmp(&b.tag));
        all
    }

    pub fn get_global_results(&self, tag: &str) -> Results {
        let global = self.global.read().unwrap_or_else(PoisonError::into_inner);
        global.get(tag).cloned().unwrap_or_else(|| Results::new(tag))
    }
}
