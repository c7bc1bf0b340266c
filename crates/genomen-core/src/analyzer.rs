//! Analyses run against a task, and the rule-based trait analyzer.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use genomen_common::{Rule, Sample, TaskConfig};
use genomen_logic::{LogicEngine, RuleEvaluator, RuleRepository, SampleDataRepository};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use crate::context::{ResultEntity, Results, TaskContext};
use crate::error::{CoreError, Result};

/// One kind of analysis. Results are written into the task context under
/// the analysis tag.
#[async_trait]
pub trait Analysis: Send + Sync {
    fn tag(&self) -> &str;

    async fn analyze(&self, context: Arc<TaskContext>) -> Result<()>;
}

/// Analyses a request may name, keyed by tag.
#[derive(Default, Clone)]
pub struct AnalysisRegistry {
    analyses: BTreeMap<String, Arc<dyn Analysis>>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, analysis: Arc<dyn Analysis>) {
        self.analyses.insert(analysis.tag().to_string(), analysis);
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn Analysis>> {
        self.analyses.get(tag).cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.analyses.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.analyses.keys().map(String::as_str)
    }
}

// ── Trait analyzer ───────────────────────────────────────────────────────────

/// Evaluates every top-level rule against every sample of the task.
pub struct TraitAnalyzer {
    rules: Arc<dyn RuleRepository>,
    data: Arc<dyn SampleDataRepository>,
    engine: Arc<dyn LogicEngine>,
    max_rule_depth: usize,
    max_concurrent_samples: usize,
}

impl TraitAnalyzer {
    pub const TAG: &'static str = "snp";

    pub fn new(
        rules: Arc<dyn RuleRepository>,
        data: Arc<dyn SampleDataRepository>,
        engine: Arc<dyn LogicEngine>,
        config: &TaskConfig,
    ) -> Self {
        Self {
            rules,
            data,
            engine,
            max_rule_depth: config.max_rule_depth,
            max_concurrent_samples: config.max_concurrent_samples_per_task.max(1),
        }
    }

    fn evaluator(&self) -> RuleEvaluator {
        RuleEvaluator::new(
            self.rules.clone(),
            self.data.clone(),
            self.engine.clone(),
            self.max_rule_depth,
        )
    }
}

/// Evaluate `rules` in order for one sample. Rules that yield nothing are
/// skipped.
pub fn analyze_sample(evaluator: &RuleEvaluator, rules: &[Rule], sample: &Sample, tag: &str) -> Results {
    let mut results = Results::new(tag);
    for rule in rules {
        match evaluator.apply(rule, sample) {
            Some(value) => results.push(ResultEntity::from_decision(rule, &value, tag)),
            None => debug!(rule_id = %rule.id, sample_id = %sample.id, "Rule produced no result"),
        }
    }
    results
}

#[async_trait]
impl Analysis for TraitAnalyzer {
    fn tag(&self) -> &str {
        Self::TAG
    }

    #[instrument(skip_all, fields(task_id = %context.task_id()))]
    async fn analyze(&self, context: Arc<TaskContext>) -> Result<()> {
        let repo = self.rules.clone();
        let rules = Arc::new(tokio::task::spawn_blocking(move || repo.top_level_rules()).await??);
        info!(rules = rules.len(), samples = context.samples().len(), "Running trait analysis");

        let permits = Arc::new(Semaphore::new(self.max_concurrent_samples));
        let mut workers = JoinSet::new();

        for sample in context.samples().iter().cloned() {
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CoreError::Worker(e.to_string()))?;
            let evaluator = self.evaluator();
            let rules = rules.clone();
            let context = context.clone();

            workers.spawn_blocking(move || {
                let _permit = permit;
                let results = analyze_sample(&evaluator, &rules, &sample, TraitAnalyzer::TAG);
                debug!(sample_id = %sample.id, results = results.len(), "Sample analysed");
                context.add_result(&sample.id, results);
            });
        }

        while let Some(joined) = workers.join_next().await {
            joined?;
        }
        Ok(())
    }
}
