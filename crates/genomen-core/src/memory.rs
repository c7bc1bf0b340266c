//! In-process store backing rules, sample data and task bookkeeping.
//!
//! Handles:
//! - Rule catalog loading from JSON or YAML
//! - Sample and attribute storage for importers
//! - Task records and task-scoped cleanup

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use genomen_common::{GenomenError, Rule, Sample, TraitInfo};
use genomen_logic::{RuleRepository, SampleDataRepository};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::importer::{AttributeRow, ImporterError, SampleSink};
use crate::request::TaskState;
use crate::task::TaskRepository;

/// Rules plus the display text used when reporting on them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleCatalog {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub traits: Vec<TraitInfo>,
    /// Text effect to human-readable description.
    #[serde(default)]
    pub result_descriptions: HashMap<String, String>,
}

impl RuleCatalog {
    /// Read a catalog file. `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> genomen_common::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let catalog = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(catalog)
    }
}

/// (data type, sample id, attribute key, field)
type AttributeKey = (String, String, String, String);

#[derive(Debug, Default)]
struct TaskRecord {
    state: Option<TaskState>,
    samples: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    rules: RwLock<HashMap<String, Rule>>,
    /// Catalog order, so top-level rules are evaluated as listed.
    rule_order: RwLock<Vec<String>>,
    traits: RwLock<HashMap<String, TraitInfo>>,
    descriptions: RwLock<HashMap<String, String>>,
    samples: RwLock<HashMap<String, Sample>>,
    attributes: RwLock<HashMap<AttributeKey, String>>,
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog_file(path: impl AsRef<Path>) -> genomen_common::Result<Self> {
        let store = Self::new();
        store.load_catalog(RuleCatalog::from_path(path)?);
        Ok(store)
    }

    /// Add the catalog's contents. Rules with an id already present are
    /// replaced in place.
    pub fn load_catalog(&self, catalog: RuleCatalog) {
        let rule_count = catalog.rules.len();
        {
            let mut rules = write(&self.rules);
            let mut order = write(&self.rule_order);
            for rule in catalog.rules {
                if !rules.contains_key(&rule.id) {
                    order.push(rule.id.clone());
                }
                rules.insert(rule.id.clone(), rule);
            }
        }
        write(&self.traits).extend(catalog.traits.into_iter().map(|t| (t.id.clone(), t)));
        write(&self.descriptions).extend(catalog.result_descriptions);
        info!(rules = rule_count, "Rule catalog loaded");
    }

    pub fn put_attribute(&self, sample_id: &str, data_type: &str, key: &str, field: &str, value: &str) {
        write(&self.attributes).insert(
            (data_type.into(), sample_id.into(), key.into(), field.into()),
            value.into(),
        );
    }

    /// Store a sample outside of any task, as if kept by an earlier run.
    pub fn put_sample(&self, sample: Sample) {
        write(&self.samples).insert(sample.id.clone(), sample);
    }

    pub fn contains_sample(&self, sample_id: &str) -> bool {
        read(&self.samples).contains_key(sample_id)
    }

    /// Last state recorded for a task, if the task record still exists.
    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        read(&self.tasks).get(task_id).and_then(|t| t.state)
    }

    pub fn task_count(&self) -> usize {
        read(&self.tasks).len()
    }

    pub fn attribute_count(&self) -> usize {
        read(&self.attributes).len()
    }

    fn drop_samples(&self, sample_ids: &HashSet<String>) {
        write(&self.samples).retain(|id, _| !sample_ids.contains(id));
        write(&self.attributes).retain(|(_, sample_id, _, _), _| !sample_ids.contains(sample_id));
    }
}

// ── Rule catalog ─────────────────────────────────────────────────────────────

impl RuleRepository for InMemoryStore {
    fn top_level_rules(&self) -> genomen_common::Result<Vec<Rule>> {
        let rules = read(&self.rules);
        Ok(read(&self.rule_order)
            .iter()
            .filter_map(|id| rules.get(id))
            .filter(|r| !r.sub_rule)
            .cloned()
            .collect())
    }

    fn rule(&self, rule_id: &str) -> genomen_common::Result<Option<Rule>> {
        Ok(read(&self.rules).get(rule_id).cloned())
    }

    fn trait_info(&self, trait_id: &str, _language: &str) -> genomen_common::Result<Option<TraitInfo>> {
        Ok(read(&self.traits).get(trait_id).cloned())
    }

    fn result_description(&self, effect: &str, _language: &str) -> genomen_common::Result<Option<String>> {
        Ok(read(&self.descriptions).get(effect).cloned())
    }
}

// ── Sample data ──────────────────────────────────────────────────────────────

impl SampleDataRepository for InMemoryStore {
    fn attribute(
        &self,
        data_type: &str,
        sample_id: &str,
        attribute_key: &str,
        field: &str,
    ) -> genomen_common::Result<Option<String>> {
        let key = (data_type.into(), sample_id.into(), attribute_key.into(), field.into());
        Ok(read(&self.attributes).get(&key).cloned())
    }

    fn find_sample(&self, sample_id: &str) -> genomen_common::Result<Option<Sample>> {
        Ok(read(&self.samples).get(sample_id).cloned())
    }
}

impl SampleSink for InMemoryStore {
    fn insert_sample(&self, task_id: &str, sample: &Sample) -> Result<(), ImporterError> {
        {
            let mut samples = write(&self.samples);
            if samples.contains_key(&sample.id) {
                return Err(ImporterError::DuplicateSample(sample.id.clone()));
            }
            samples.insert(sample.id.clone(), sample.clone());
        }
        write(&self.tasks)
            .entry(task_id.to_string())
            .or_default()
            .samples
            .insert(sample.id.clone());
        Ok(())
    }

    fn insert_attributes(
        &self,
        sample_id: &str,
        data_type: &str,
        rows: Vec<AttributeRow>,
    ) -> Result<(), ImporterError> {
        let mut attributes = write(&self.attributes);
        for row in rows {
            attributes.insert(
                (data_type.to_string(), sample_id.to_string(), row.key, row.field),
                row.value,
            );
        }
        Ok(())
    }
}

// ── Tasks ────────────────────────────────────────────────────────────────────

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn task_exists(&self, task_id: &str) -> genomen_common::Result<bool> {
        Ok(read(&self.tasks).contains_key(task_id))
    }

    async fn create_task(&self, task_id: &str) -> genomen_common::Result<()> {
        let mut tasks = write(&self.tasks);
        if tasks.contains_key(task_id) {
            return Err(GenomenError::Repository(format!("task {task_id} already exists")));
        }
        tasks.insert(
            task_id.to_string(),
            TaskRecord { state: Some(TaskState::Initialized), samples: HashSet::new() },
        );
        Ok(())
    }

    async fn change_state(&self, task_id: &str, state: TaskState) -> genomen_common::Result<()> {
        match write(&self.tasks).get_mut(task_id) {
            Some(record) => {
                record.state = Some(state);
                Ok(())
            }
            None => Err(GenomenError::NotFound(format!("task {task_id}"))),
        }
    }

    async fn add_sample(&self, task_id: &str, sample_id: &str) -> genomen_common::Result<()> {
        write(&self.tasks)
            .entry(task_id.to_string())
            .or_default()
            .samples
            .insert(sample_id.to_string());
        Ok(())
    }

    async fn clear_task_data(&self, task_id: &str) -> genomen_common::Result<()> {
        let record = write(&self.tasks).remove(task_id);
        if let Some(record) = record {
            debug!(task_id, samples = record.samples.len(), "Clearing task data");
            self.drop_samples(&record.samples);
        }
        Ok(())
    }

    async fn remove_task(&self, task_id: &str) -> genomen_common::Result<()> {
        write(&self.tasks).remove(task_id);
        Ok(())
    }
}
