//! Shared fixtures for the genomen-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use genomen_common::{DataSet, EffectType, Rule, Sample, TaskConfig};
use genomen_core::importer::{Importer, ImporterError, SampleSink};
use genomen_core::{
    AnalysisRegistry, ImporterRegistry, InMemoryStore, Orchestrator, OrchestratorDeps, Reporter,
    ReportBuilder, Results, RuleCatalog, SampleEntry, TaskContext, TraitAnalyzer,
    TwentyThreeAndMeImporter,
};
use genomen_logic::ScriptEngine;
use tokio::sync::Semaphore;

pub fn rule(id: &str, logic: &str) -> Rule {
    Rule {
        id: id.into(),
        effect_type: EffectType::Risk,
        trait_id: "lactose".into(),
        default_interest_level: 1,
        logic: logic.into(),
        sub_rule: false,
    }
}

/// Write a 23andMe export holding `calls` as `(rsid, genotype)` pairs.
pub fn genome_file(dir: &Path, name: &str, calls: &[(&str, &str)]) -> PathBuf {
    let mut body = String::from("# rsid\tchromosome\tposition\tgenotype\n");
    for (i, (rsid, genotype)) in calls.iter().enumerate() {
        body.push_str(&format!("{rsid}\t1\t{}\t{genotype}\n", 1000 + i));
    }
    let path = dir.join(format!("{name}.txt"));
    std::fs::write(&path, body).unwrap();
    path
}

pub fn dataset(name: &str, path: &Path) -> DataSet {
    DataSet::new(name, vec![path.display().to_string()], "23andme")
}

/// Reporter that keeps the trait analyzer's results per sample.
#[derive(Default)]
pub struct Capture {
    seen: Mutex<HashMap<String, Results>>,
}

impl Capture {
    pub fn results(&self, sample_id: &str) -> Option<Results> {
        self.seen.lock().unwrap().get(sample_id).cloned()
    }

    pub fn samples(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.seen.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Reporter for Capture {
    async fn build_component(
        &self,
        context: &TaskContext,
        entry: &mut SampleEntry,
        _language: &str,
    ) -> genomen_core::Result<()> {
        let results = context.get_results(&entry.sample.id, TraitAnalyzer::TAG);
        self.seen.lock().unwrap().insert(entry.sample.id.clone(), results);
        Ok(())
    }
}

/// Importer for format `"gated"` that holds every import until a permit is
/// released, then imports one empty sample named after the dataset.
pub struct GatedImporter {
    sink: Arc<dyn SampleSink>,
    pub gate: Semaphore,
}

impl GatedImporter {
    pub fn new(sink: Arc<dyn SampleSink>) -> Self {
        Self { sink, gate: Semaphore::new(0) }
    }
}

#[async_trait]
impl Importer for GatedImporter {
    fn format(&self) -> &str {
        "gated"
    }

    async fn import_dataset(
        &self,
        _schema: &str,
        task_id: &str,
        dataset_name: &str,
        _files: &[String],
    ) -> Result<Vec<Sample>, ImporterError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ImporterError::Connection(e.to_string()))?;
        permit.forget();
        let sample = Sample::new(dataset_name);
        self.sink.insert_sample(task_id, &sample)?;
        Ok(vec![sample])
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub capture: Arc<Capture>,
    pub gated: Arc<GatedImporter>,
    pub orchestrator: Orchestrator,
}

pub fn harness(rules: Vec<Rule>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    store.load_catalog(RuleCatalog { rules, ..RuleCatalog::default() });

    let config = TaskConfig::default();
    let capture = Arc::new(Capture::default());
    let gated = Arc::new(GatedImporter::new(store.clone()));

    let mut importers = ImporterRegistry::new();
    importers.register(Arc::new(TwentyThreeAndMeImporter::new(store.clone())));
    importers.register(gated.clone());

    let mut analyses = AnalysisRegistry::new();
    analyses.register(Arc::new(TraitAnalyzer::new(
        store.clone(),
        store.clone(),
        Arc::new(ScriptEngine::new()),
        &config,
    )));

    let orchestrator = Orchestrator::new(OrchestratorDeps {
        rules: store.clone(),
        data: store.clone(),
        tasks: store.clone(),
        importers,
        analyses,
        reports: ReportBuilder::new().with_reporter(capture.clone()),
        config,
    });

    Harness { store, capture, gated, orchestrator }
}
