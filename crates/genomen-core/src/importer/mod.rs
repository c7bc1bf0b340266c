//! Dataset importers.
//!
//! An importer reads the files of one dataset format, writes samples and
//! their attributes into a [`SampleSink`], and returns the samples it
//! created. Importers are looked up by format name in an
//! [`ImporterRegistry`].

mod twenty_three_and_me;

pub use twenty_three_and_me::TwentyThreeAndMeImporter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use genomen_common::Sample;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImporterError {
    #[error("Unable to access temporary file: {0}")]
    TempFileAccess(String),

    #[error("Failed to connect to the data store: {0}")]
    Connection(String),

    #[error("No valid index for dataset: {0}")]
    IndexAllocation(String),

    #[error("Individual id already exists: {0}")]
    DuplicateSample(String),

    #[error("Unable to read dataset: {0}")]
    UnreadableDataset(String),
}

/// One stored attribute value of a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub key: String,
    pub field: String,
    pub value: String,
}

impl AttributeRow {
    pub fn new(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), field: field.into(), value: value.into() }
    }
}

/// Where importers write what they read.
pub trait SampleSink: Send + Sync {
    /// Register a sample under a task. Fails with `DuplicateSample` when the
    /// id is already stored.
    fn insert_sample(&self, task_id: &str, sample: &Sample) -> Result<(), ImporterError>;

    fn insert_attributes(
        &self,
        sample_id: &str,
        data_type: &str,
        rows: Vec<AttributeRow>,
    ) -> Result<(), ImporterError>;
}

#[async_trait]
pub trait Importer: Send + Sync {
    /// Format name this importer handles, matched case-insensitively.
    fn format(&self) -> &str;

    async fn import_dataset(
        &self,
        schema: &str,
        task_id: &str,
        dataset_name: &str,
        files: &[String],
    ) -> Result<Vec<Sample>, ImporterError>;
}

#[derive(Default, Clone)]
pub struct ImporterRegistry {
    importers: HashMap<String, Arc<dyn Importer>>,
}

impl ImporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, importer: Arc<dyn Importer>) {
        self.importers.insert(importer.format().to_lowercase(), importer);
    }

    pub fn get(&self, format: &str) -> Option<Arc<dyn Importer>> {
        self.importers.get(&format.to_lowercase()).cloned()
    }

    pub fn formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.importers.keys().cloned().collect();
        formats.sort();
        formats
    }
}
