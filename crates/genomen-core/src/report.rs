//! Report assembly.
//!
//! A [`ReportBuilder`] walks the task's samples and lets each registered
//! [`Reporter`] add components to the sample's entry. Reports are plain
//! serde data; rendering them to XML/CSV/HTML happens outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genomen_common::{EffectType, Sample};
use genomen_logic::RuleRepository;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::analyzer::TraitAnalyzer;
use crate::context::{ResultEntity, TaskContext};
use crate::error::{CoreError, Result};

// ── Report model ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub name: String,
    pub language: String,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    /// Output formats the requester wants rendered from this report.
    #[serde(default)]
    pub formats: Vec<String>,
    pub entries: Vec<SampleEntry>,
}

impl Report {
    pub fn entry(&self, sample_id: &str) -> Option<&SampleEntry> {
        self.entries.iter().find(|e| e.sample.id == sample_id)
    }
}

/// Everything reported for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    pub sample: Sample,
    pub components: Vec<ReportComponent>,
}

impl SampleEntry {
    pub fn new(sample: Sample) -> Self {
        Self { sample, components: Vec::new() }
    }

    pub fn add_component(&mut self, component: ReportComponent) {
        self.components.push(component);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportComponent {
    TraitTable(TraitTable),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitTable {
    pub title: String,
    pub headers: Vec<String>,
    pub traits: Vec<TraitEntry>,
}

/// Rows of one trait, with the trait's display text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitEntry {
    pub trait_id: String,
    pub name: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub rows: Vec<TraitRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitRow {
    pub status: String,
    pub trait_name: String,
    pub interest_level: f64,
    pub effect_size: String,
    pub resolvable: String,
    pub logic: String,
}

// ── Reporters ────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Reporter: Send + Sync {
    /// Add this reporter's components for one sample.
    async fn build_component(
        &self,
        context: &TaskContext,
        entry: &mut SampleEntry,
        language: &str,
    ) -> Result<()>;
}

pub const TRAIT_TABLE_TITLE: &str = "SNP";
pub const TRAIT_TABLE_HEADERS: [&str; 6] =
    ["Status", "TraitName", "InterestLevel", "EffectSize", "Resolvable", "Logic"];

/// Tabulates the trait analyzer's verdicts, one entry per trait.
pub struct TraitReporter {
    rules: Arc<dyn RuleRepository>,
}

impl TraitReporter {
    pub fn new(rules: Arc<dyn RuleRepository>) -> Self {
        Self { rules }
    }

    fn row(&self, result: &ResultEntity, trait_name: &str, language: &str) -> Result<TraitRow> {
        let quantitative =
            EffectType::from_name(&result.effect_type).is_some_and(|t| t.is_quantitative());

        let (status, effect_size) = if quantitative {
            (String::new(), result.effect.clone())
        } else {
            let status = self
                .rules
                .result_description(&result.effect, language)?
                .unwrap_or_else(|| result.effect.clone());
            (status, String::new())
        };

        Ok(TraitRow {
            status,
            trait_name: trait_name.to_string(),
            interest_level: result.interest_level,
            effect_size,
            resolvable: if result.resolved() { "True" } else { "False" }.to_string(),
            logic: self.rules.rule_logic(&result.rule_id)?.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Reporter for TraitReporter {
    async fn build_component(
        &self,
        context: &TaskContext,
        entry: &mut SampleEntry,
        language: &str,
    ) -> Result<()> {
        let results = context.get_results(&entry.sample.id, TraitAnalyzer::TAG);
        if results.is_empty() {
            return Ok(());
        }

        // Group by trait, keeping first-seen order.
        let mut by_trait: Vec<(String, Vec<&ResultEntity>)> = Vec::new();
        for result in &results.entities {
            match by_trait.iter_mut().find(|(id, _)| *id == result.trait_id) {
                Some((_, group)) => group.push(result),
                None => by_trait.push((result.trait_id.clone(), vec![result])),
            }
        }

        let mut traits = Vec::with_capacity(by_trait.len());
        for (trait_id, group) in by_trait {
            let info = self.rules.trait_info(&trait_id, language)?;
            let name = info.as_ref().map(|i| i.name.clone()).unwrap_or_else(|| trait_id.clone());
            let rows = group
                .into_iter()
                .map(|result| self.row(result, &name, language))
                .collect::<Result<Vec<_>>>()?;
            traits.push(TraitEntry {
                short_description: info.as_ref().and_then(|i| i.short_description.clone()),
                long_description: info.and_then(|i| i.long_description),
                trait_id,
                name,
                rows,
            });
        }

        entry.add_component(ReportComponent::TraitTable(TraitTable {
            title: TRAIT_TABLE_TITLE.to_string(),
            headers: TRAIT_TABLE_HEADERS.iter().map(|h| h.to_string()).collect(),
            traits,
        }));
        Ok(())
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
pub struct ReportBuilder {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// One entry per task sample, in task order. A failing reporter is
    /// logged and skipped for that sample.
    pub async fn build(
        &self,
        context: &TaskContext,
        name: &str,
        language: &str,
        formats: &[String],
    ) -> Result<Report> {
        let mut entries = Vec::with_capacity(context.samples().len());
        let mut failures = 0usize;

        for sample in context.samples() {
            let mut entry = SampleEntry::new(sample.clone());
            for reporter in &self.reporters {
                if let Err(e) = reporter.build_component(context, &mut entry, language).await {
                    warn!(sample_id = %sample.id, error = %e, "Reporter failed");
                    failures += 1;
                }
            }
            entries.push(entry);
        }

        if failures > 0 && failures == context.samples().len() * self.reporters.len() {
            return Err(CoreError::Report(format!("all {failures} reporter runs failed")));
        }

        debug!(task_id = context.task_id(), entries = entries.len(), "Report built");
        Ok(Report {
            id: Uuid::new_v4(),
            name: name.to_string(),
            language: language.to_string(),
            task_id: context.task_id().to_string(),
            created_at: Utc::now(),
            formats: formats.to_vec(),
            entries,
        })
    }
}
