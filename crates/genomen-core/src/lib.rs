//! genomen-core: Request scheduling and task orchestration.
//! Covers the request side of an analysis:
//! - `AnalysisRequest` lifecycle, errors and event channel
//! - `Scheduler` worker pool with queue timeouts and shutdown
//! - `Orchestrator` task state machine
//! - Dataset importers, the trait analyzer and report assembly
//! - An in-memory store backing rules, samples and tasks

pub mod analyzer;
pub mod context;
pub mod error;
pub mod importer;
pub mod memory;
pub mod orchestrator;
pub mod report;
pub mod request;
pub mod scheduler;
pub mod task;

pub use analyzer::{Analysis, AnalysisRegistry, TraitAnalyzer};
pub use context::{ResultEntity, Results, TaskContext};
pub use error::{CoreError, Result};
pub use importer::{Importer, ImporterError, ImporterRegistry, SampleSink, TwentyThreeAndMeImporter};
pub use memory::{InMemoryStore, RuleCatalog};
pub use orchestrator::{Orchestrator, OrchestratorDeps};
pub use report::{Report, ReportBuilder, ReportComponent, Reporter, SampleEntry, TraitReporter};
pub use request::{AnalysisRequest, ErrorKind, RequestError, RequestEvent, TaskState};
pub use scheduler::Scheduler;
pub use task::{generate_task_id, TaskRepository};
