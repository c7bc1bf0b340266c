//! The client-visible analysis request.
//!
//! An `AnalysisRequest` is shared between the caller and the scheduler as
//! `Arc<AnalysisRequest>`. Inputs are fixed at construction; state, errors
//! and reports change while the request runs, and every state transition
//! and error is published to subscribers in order.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use genomen_common::DataSet;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::report::Report;

// ── Task state ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Initialized,
    LoadingDatasets,
    PerformingAnalysis,
    CreatingReports,
    ClearingData,
    Finished,
}

impl TaskState {
    pub fn id(self) -> u8 {
        match self {
            TaskState::Initialized        => 0,
            TaskState::LoadingDatasets    => 1,
            TaskState::PerformingAnalysis => 2,
            TaskState::CreatingReports    => 3,
            TaskState::ClearingData       => 4,
            TaskState::Finished           => 5,
        }
    }

    pub fn next(self) -> Option<TaskState> {
        match self {
            TaskState::Initialized        => Some(TaskState::LoadingDatasets),
            TaskState::LoadingDatasets    => Some(TaskState::PerformingAnalysis),
            TaskState::PerformingAnalysis => Some(TaskState::CreatingReports),
            TaskState::CreatingReports    => Some(TaskState::ClearingData),
            TaskState::ClearingData       => Some(TaskState::Finished),
            TaskState::Finished           => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Initialized        => "INITIALIZED",
            TaskState::LoadingDatasets    => "LOADING_DATASETS",
            TaskState::PerformingAnalysis => "PERFORMING_ANALYSIS",
            TaskState::CreatingReports    => "CREATING_REPORTS",
            TaskState::ClearingData       => "CLEARING_DATA",
            TaskState::Finished           => "FINISHED",
        };
        f.write_str(s)
    }
}

// ── Request errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    FileNotFound,
    Cancelled,
    CoreShutdown,
    CannotReadFile,
    AnalysisNotAvailable,
    UnableToImport,
    IndividualExists,
    /// Waited in the queue longer than the configured limit.
    QueueTimeout,
    /// An analysis, reporter or cleanup step failed unexpectedly.
    Internal,
}

impl ErrorKind {
    /// Stable numeric id, used as the key for localised messages.
    pub fn id(self) -> u8 {
        match self {
            ErrorKind::FileNotFound         => 1,
            ErrorKind::Cancelled            => 2,
            ErrorKind::CoreShutdown         => 3,
            ErrorKind::CannotReadFile       => 4,
            ErrorKind::AnalysisNotAvailable => 5,
            ErrorKind::UnableToImport       => 6,
            ErrorKind::IndividualExists     => 7,
            ErrorKind::QueueTimeout         => 8,
            ErrorKind::Internal             => 9,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::FileNotFound         => "File not found",
            ErrorKind::Cancelled            => "Request was cancelled",
            ErrorKind::CoreShutdown         => "Analysis core is shut down",
            ErrorKind::CannotReadFile       => "Dataset format cannot be read",
            ErrorKind::AnalysisNotAvailable => "Analysis is not available",
            ErrorKind::UnableToImport       => "Unable to import datasets",
            ErrorKind::IndividualExists     => "Individual already exists",
            ErrorKind::QueueTimeout         => "Request waited too long in the queue",
            ErrorKind::Internal             => "Internal error",
        }
    }
}

/// An error attached to a request. `source` names what the error concerns,
/// such as a file path, dataset or analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub kind: ErrorKind,
    pub source: Option<String>,
}

impl RequestError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub fn with_source(kind: ErrorKind, source: impl Into<String>) -> Self {
        Self { kind, source: Some(source.into()) }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{} ({})", self.kind.message(), source),
            None => f.write_str(self.kind.message()),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Change notification carrying a snapshot of the request's errors.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    StateChanged { state: TaskState, errors: Vec<RequestError> },
    ErrorAdded { error: RequestError, errors: Vec<RequestError> },
}

// ── Request ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Progress {
    state: TaskState,
    errors: Vec<RequestError>,
    reports: Vec<Report>,
    cancelled: bool,
    listeners: Vec<mpsc::UnboundedSender<RequestEvent>>,
}

#[derive(Debug)]
pub struct AnalysisRequest {
    datasets: Vec<DataSet>,
    required_analyses: Vec<String>,
    required_formats: Vec<String>,
    samples: Vec<String>,
    language: String,
    name: String,
    output_path: Option<String>,
    persist_datasets: bool,
    progress: Mutex<Progress>,
    /// Flips to true once the request will make no further progress.
    settled: watch::Sender<bool>,
}

impl AnalysisRequest {
    pub fn new(datasets: Vec<DataSet>, required_analyses: Vec<String>) -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            datasets,
            required_analyses,
            required_formats: Vec::new(),
            samples: Vec::new(),
            language: "en".to_string(),
            name: "genomen".to_string(),
            output_path: None,
            persist_datasets: false,
            progress: Mutex::new(Progress {
                state: TaskState::Initialized,
                errors: Vec::new(),
                reports: Vec::new(),
                cancelled: false,
                listeners: Vec::new(),
            }),
            settled,
        }
    }

    /// Restrict the analysis to these sample ids.
    pub fn with_samples(mut self, samples: Vec<String>) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_formats(mut self, formats: Vec<String>) -> Self {
        self.required_formats = formats;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Keep imported samples after the task finishes.
    pub fn with_persist_datasets(mut self, persist: bool) -> Self {
        self.persist_datasets = persist;
        self
    }

    pub fn datasets(&self) -> &[DataSet] { &self.datasets }
    pub fn required_analyses(&self) -> &[String] { &self.required_analyses }
    pub fn required_formats(&self) -> &[String] { &self.required_formats }
    pub fn samples(&self) -> &[String] { &self.samples }
    pub fn language(&self) -> &str { &self.language }
    pub fn name(&self) -> &str { &self.name }
    pub fn output_path(&self) -> Option<&str> { self.output_path.as_deref() }
    pub fn persist_datasets(&self) -> bool { self.persist_datasets }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    pub fn errors(&self) -> Vec<RequestError> {
        self.lock().errors.clone()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.lock().reports.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TaskState::Finished
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Receive every later state transition and error, in order. The
    /// channel closes once the request settles.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RequestEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !*self.settled.borrow() {
            self.lock().listeners.push(tx);
        }
        rx
    }

    /// Advance to `state`. Moves that are not strictly forward are ignored.
    pub fn change_state(&self, state: TaskState) {
        let mut progress = self.lock();
        if state <= progress.state {
            warn!(from = %progress.state, to = %state, "Ignoring backward state change");
            return;
        }
        if progress.state.next() != Some(state) {
            debug!(from = %progress.state, to = %state, "State change skips a step");
        }
        progress.state = state;
        debug!(request = %self.name, state = %state, "Request state changed");
        let event = RequestEvent::StateChanged { state, errors: progress.errors.clone() };
        publish(&mut progress, event);

        if state == TaskState::Finished {
            progress.listeners.clear();
            drop(progress);
            self.settled.send_replace(true);
        }
    }

    pub fn add_error(&self, error: RequestError) {
        let mut progress = self.lock();
        info!(request = %self.name, error = %error, "Request error");
        progress.errors.push(error.clone());
        let event = RequestEvent::ErrorAdded { error, errors: progress.errors.clone() };
        publish(&mut progress, event);
    }

    pub fn add_report(&self, report: Report) {
        self.lock().reports.push(report);
    }

    /// Mark the request cancelled. A queued request is then never run and
    /// gets a `Cancelled` error; a running one is not interrupted.
    pub fn cancel(&self) {
        let not_started = {
            let mut progress = self.lock();
            let first = !std::mem::replace(&mut progress.cancelled, true);
            first && progress.state == TaskState::Initialized
        };
        if not_started {
            self.add_error(RequestError::new(ErrorKind::Cancelled));
        }
        self.settle();
    }

    /// Cancel a request the scheduler drops on shutdown.
    pub(crate) fn shut_down(&self) {
        self.lock().cancelled = true;
        self.add_error(RequestError::new(ErrorKind::CoreShutdown));
        self.settle();
    }

    /// Fail a request that will never run.
    pub(crate) fn reject(&self, error: RequestError) {
        self.add_error(error);
        self.settle();
    }

    fn settle(&self) {
        let running = {
            let mut progress = self.lock();
            let running = progress.state > TaskState::Initialized && progress.state < TaskState::Finished;
            if !running {
                progress.listeners.clear();
            }
            running
        };
        if !running {
            self.settled.send_replace(true);
        }
    }

    /// Wait until the request finishes or is settled without running.
    pub async fn wait(&self) {
        let mut settled = self.settled.subscribe();
        // The sender lives in `self`, so this only errors if it is dropped.
        let _ = settled.wait_for(|done| *done).await;
    }
}

fn publish(progress: &mut Progress, event: RequestEvent) {
    progress.listeners.retain(|tx| tx.send(event.clone()).is_ok());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(Vec::new(), vec!["snp".into()])
    }

    #[test]
    fn test_error_ids_are_stable() {
        let ids: Vec<u8> = [
            ErrorKind::FileNotFound,
            ErrorKind::Cancelled,
            ErrorKind::CoreShutdown,
            ErrorKind::CannotReadFile,
            ErrorKind::AnalysisNotAvailable,
            ErrorKind::UnableToImport,
            ErrorKind::IndividualExists,
            ErrorKind::QueueTimeout,
            ErrorKind::Internal,
        ]
        .iter()
        .map(|k| k.id())
        .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_state_ordering() {
        assert!(TaskState::Initialized < TaskState::LoadingDatasets);
        assert!(TaskState::ClearingData < TaskState::Finished);
        assert_eq!(TaskState::Finished.next(), None);
        assert_eq!(TaskState::CreatingReports.id(), 3);
    }

    #[test]
    fn test_backward_transition_is_ignored() {
        let req = request();
        req.change_state(TaskState::LoadingDatasets);
        req.change_state(TaskState::PerformingAnalysis);
        req.change_state(TaskState::LoadingDatasets);
        assert_eq!(req.state(), TaskState::PerformingAnalysis);
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let req = request();
        let mut rx = req.subscribe();
        req.change_state(TaskState::LoadingDatasets);
        req.add_error(RequestError::with_source(ErrorKind::CannotReadFile, "ds1"));
        req.change_state(TaskState::PerformingAnalysis);

        assert_eq!(
            rx.recv().await,
            Some(RequestEvent::StateChanged { state: TaskState::LoadingDatasets, errors: vec![] })
        );
        let error = RequestError::with_source(ErrorKind::CannotReadFile, "ds1");
        assert_eq!(
            rx.recv().await,
            Some(RequestEvent::ErrorAdded { error: error.clone(), errors: vec![error.clone()] })
        );
        assert_eq!(
            rx.recv().await,
            Some(RequestEvent::StateChanged { state: TaskState::PerformingAnalysis, errors: vec![error] })
        );
    }

    #[tokio::test]
    async fn test_channel_closes_when_finished() {
        let req = request();
        let mut rx = req.subscribe();
        for state in [
            TaskState::LoadingDatasets,
            TaskState::PerformingAnalysis,
            TaskState::CreatingReports,
            TaskState::ClearingData,
            TaskState::Finished,
        ] {
            req.change_state(state);
        }
        let mut seen = 0;
        while rx.recv().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 5);
        req.wait().await;
        assert!(req.is_finished());
    }

    #[tokio::test]
    async fn test_cancel_settles_queued_request() {
        let req = request();
        req.cancel();
        req.wait().await;
        assert!(req.is_cancelled());
        assert!(!req.is_finished());
    }

    #[tokio::test]
    async fn test_cancel_publishes_cancelled_error() {
        let req = request();
        let mut rx = req.subscribe();
        req.cancel();
        req.cancel();

        let error = RequestError::new(ErrorKind::Cancelled);
        assert_eq!(
            rx.recv().await,
            Some(RequestEvent::ErrorAdded { error: error.clone(), errors: vec![error.clone()] })
        );
        assert_eq!(rx.recv().await, None);
        assert_eq!(req.errors(), vec![error]);
    }

    #[test]
    fn test_cancel_while_running_adds_no_error() {
        let req = request();
        req.change_state(TaskState::LoadingDatasets);
        req.cancel();
        assert!(req.is_cancelled());
        assert!(req.errors().is_empty());
    }

    #[test]
    fn test_display() {
        let err = RequestError::with_source(ErrorKind::AnalysisNotAvailable, "cnv");
        assert_eq!(err.to_string(), "Analysis is not available (cnv)");
    }
}
