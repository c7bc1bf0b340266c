//! Drives one request through its task states.
//!
//! INITIALIZED → LOADING_DATASETS → PERFORMING_ANALYSIS → CREATING_REPORTS
//! → CLEARING_DATA → FINISHED
//!
//! A failed import ends the task at FINISHED straight away. Failures in the
//! later stages are recorded on the request and the task still advances.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use genomen_common::{Sample, TaskConfig};
use genomen_logic::{RuleRepository, SampleDataRepository};
use tracing::{debug, info, instrument, warn};

use crate::analyzer::{Analysis, AnalysisRegistry};
use crate::context::TaskContext;
use crate::importer::{ImporterError, ImporterRegistry};
use crate::report::ReportBuilder;
use crate::request::{AnalysisRequest, ErrorKind, RequestError, TaskState};
use crate::task::{generate_task_id, TaskRepository};

/// Collaborators handed to the orchestrator.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub rules: Arc<dyn RuleRepository>,
    pub data: Arc<dyn SampleDataRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub importers: ImporterRegistry,
    pub analyses: AnalysisRegistry,
    pub reports: ReportBuilder,
    pub config: TaskConfig,
}

#[derive(Clone)]
pub struct Orchestrator {
    deps: Arc<OrchestratorDeps>,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self { deps: Arc::new(deps) }
    }

    pub fn rules(&self) -> &Arc<dyn RuleRepository> {
        &self.deps.rules
    }

    /// Run the request to completion. Every outcome is recorded on the
    /// request itself; this never fails.
    #[instrument(skip_all, fields(request = %request.name()))]
    pub async fn run(&self, request: &AnalysisRequest) {
        let t0 = Instant::now();

        let analyses = self.performable_analyses(request);

        self.advance(request, None, TaskState::LoadingDatasets).await;

        let task_id = match self.open_task().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Unable to create task");
                request.add_error(RequestError::with_source(ErrorKind::Internal, e.to_string()));
                request.change_state(TaskState::Finished);
                return;
            }
        };
        info!(task_id = %task_id, analyses = analyses.len(), "Task started");

        let context = match self.load_datasets(request, &task_id).await {
            Some(context) => Arc::new(context),
            None => {
                request.change_state(TaskState::Finished);
                info!(task_id = %task_id, "Task aborted during import");
                return;
            }
        };

        self.advance(request, Some(&task_id), TaskState::PerformingAnalysis).await;
        self.perform_analyses(request, &analyses, context.clone()).await;

        self.advance(request, Some(&task_id), TaskState::CreatingReports).await;
        let report = self
            .deps
            .reports
            .build(&context, request.name(), request.language(), request.required_formats())
            .await;
        match report {
            Ok(report) => request.add_report(report),
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Report assembly failed");
                request.add_error(RequestError::with_source(ErrorKind::Internal, e.to_string()));
            }
        }

        self.advance(request, Some(&task_id), TaskState::ClearingData).await;
        self.clear(request, &task_id).await;

        request.change_state(TaskState::Finished);
        info!(
            task_id = %task_id,
            samples = context.samples().len(),
            errors = request.errors().len(),
            duration_ms = t0.elapsed().as_millis() as u64,
            "Task finished"
        );
    }

    /// Requested analyses that exist. Unknown tags are reported and dropped.
    fn performable_analyses(&self, request: &AnalysisRequest) -> Vec<Arc<dyn Analysis>> {
        let mut performable: Vec<Arc<dyn Analysis>> = Vec::new();
        for tag in request.required_analyses() {
            match self.deps.analyses.get(tag) {
                Some(analysis) => {
                    if !performable.iter().any(|a| a.tag() == analysis.tag()) {
                        performable.push(analysis);
                    }
                }
                None => request.add_error(RequestError::with_source(ErrorKind::AnalysisNotAvailable, tag)),
            }
        }
        performable
    }

    async fn open_task(&self) -> genomen_common::Result<String> {
        let task_id = generate_task_id(self.deps.tasks.as_ref(), self.deps.config.task_id_length).await?;
        self.deps.tasks.create_task(&task_id).await?;
        Ok(task_id)
    }

    /// Move the request forward and mirror the state into the task store.
    async fn advance(&self, request: &AnalysisRequest, task_id: Option<&str>, state: TaskState) {
        request.change_state(state);
        if let Some(task_id) = task_id {
            if let Err(e) = self.deps.tasks.change_state(task_id, state).await {
                warn!(task_id, state = %state, error = %e, "Failed to record task state");
            }
        }
    }

    /// Import every dataset and pick the task's samples. Returns `None` when
    /// an import failed and the task was torn down.
    async fn load_datasets(&self, request: &AnalysisRequest, task_id: &str) -> Option<TaskContext> {
        if let Err(e) = self.deps.tasks.change_state(task_id, TaskState::LoadingDatasets).await {
            warn!(task_id, error = %e, "Failed to record task state");
        }

        let mut imported: Vec<Sample> = Vec::new();

        for dataset in request.datasets() {
            let missing: Vec<&String> = dataset.files.iter().filter(|f| !Path::new(f).exists()).collect();
            if !missing.is_empty() {
                for path in missing {
                    request.add_error(RequestError::with_source(ErrorKind::FileNotFound, path.as_str()));
                }
                continue;
            }

            let Some(importer) = self.deps.importers.get(&dataset.format) else {
                warn!(dataset = %dataset.name, format = %dataset.format, "No importer for format");
                request.add_error(RequestError::with_source(ErrorKind::CannotReadFile, dataset.name.as_str()));
                continue;
            };

            let result = importer
                .import_dataset(&self.deps.config.schema, task_id, &dataset.name, &dataset.files)
                .await;

            match result {
                Ok(samples) => {
                    debug!(dataset = %dataset.name, samples = samples.len(), "Dataset imported");
                    for sample in samples {
                        if let Err(e) = self.deps.tasks.add_sample(task_id, &sample.id).await {
                            warn!(task_id, sample_id = %sample.id, error = %e, "Failed to record task sample");
                        }
                        imported.push(sample);
                    }
                }
                Err(e) => {
                    warn!(task_id, dataset = %dataset.name, error = %e, "Import failed, aborting task");
                    if let ImporterError::DuplicateSample(id) = &e {
                        request.add_error(RequestError::with_source(ErrorKind::IndividualExists, id.as_str()));
                    }
                    if let Err(e) = self.deps.tasks.clear_task_data(task_id).await {
                        warn!(task_id, error = %e, "Failed to clear partially imported data");
                    }
                    request.add_error(RequestError::with_source(ErrorKind::UnableToImport, dataset.name.as_str()));
                    return None;
                }
            }
        }

        let mut context = TaskContext::new(task_id);
        for sample in self.select_samples(request, imported) {
            context.add_sample(sample);
        }
        info!(task_id, samples = context.samples().len(), "Datasets loaded");
        Some(context)
    }

    /// Keep only the samples the request names. With nothing imported, the
    /// named samples are looked up among those kept by earlier tasks.
    fn select_samples(&self, request: &AnalysisRequest, imported: Vec<Sample>) -> Vec<Sample> {
        let wanted = request.samples();
        if wanted.is_empty() {
            return imported;
        }
        if !imported.is_empty() {
            return imported.into_iter().filter(|s| wanted.contains(&s.id)).collect();
        }

        let mut found = Vec::new();
        for id in wanted {
            match self.deps.data.find_sample(id) {
                Ok(Some(sample)) => found.push(sample),
                Ok(None) => debug!(sample_id = %id, "Requested sample not stored"),
                Err(e) => warn!(sample_id = %id, error = %e, "Sample lookup failed"),
            }
        }
        found
    }

    async fn perform_analyses(
        &self,
        request: &AnalysisRequest,
        analyses: &[Arc<dyn Analysis>],
        context: Arc<TaskContext>,
    ) {
        let limit = self.deps.config.max_concurrent_analyses_per_task.max(1);
        let outcomes: Vec<_> = stream::iter(analyses.iter().cloned())
            .map(|analysis| {
                let context = context.clone();
                async move {
                    let outcome = analysis.analyze(context).await;
                    (analysis.tag().to_string(), outcome)
                }
            })
            .buffer_unordered(limit)
            .boxed()
            .collect()
            .await;

        for (tag, outcome) in outcomes {
            if let Err(e) = outcome {
                warn!(task_id = context.task_id(), analysis = %tag, error = %e, "Analysis failed");
                request.add_error(RequestError::with_source(ErrorKind::Internal, format!("{tag}: {e}")));
            }
        }
    }

    async fn clear(&self, request: &AnalysisRequest, task_id: &str) {
        let cleared = if request.persist_datasets() {
            self.deps.tasks.remove_task(task_id).await
        } else {
            self.deps.tasks.clear_task_data(task_id).await
        };
        if let Err(e) = cleared {
            warn!(task_id, error = %e, "Cleanup failed");
            request.add_error(RequestError::with_source(ErrorKind::Internal, e.to_string()));
        }
    }
}
