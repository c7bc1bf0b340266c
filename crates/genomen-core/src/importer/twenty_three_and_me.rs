//! Importer for raw genotype exports in the 23andMe text format.
//!
//! ```text
//! # rsid  chromosome  position  genotype
//! rs4477212   1   82154   AA
//! i3000001    MT  16470   G
//! ```
//!
//! A dataset is one file holding one individual, named after the dataset.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use genomen_common::Sample;
use genomen_logic::{ALLELE_FIELD, SNP};
use regex::Regex;
use tracing::{debug, info, warn};

use super::{AttributeRow, Importer, ImporterError, SampleSink};

const FORMAT: &str = "23andme";
const LINE_PATTERN: &str = r"^\w+\s\w+\s\d+\s[\w-]+$";

pub const CHROMOSOME_FIELD: &str = "CHROMOSOME";
pub const POSITION_FIELD: &str = "POSITION";

fn line_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LINE_PATTERN).expect("valid 23andMe line pattern"))
}

pub struct TwentyThreeAndMeImporter {
    sink: Arc<dyn SampleSink>,
}

impl TwentyThreeAndMeImporter {
    pub fn new(sink: Arc<dyn SampleSink>) -> Self {
        Self { sink }
    }

    /// Parse the file body into attribute rows. Comment lines are skipped;
    /// lines in any other shape are logged and skipped.
    pub fn parse(&self, body: &str) -> Vec<AttributeRow> {
        let mut rows = Vec::new();
        for (index, line) in body.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            if !line_pattern().is_match(line) {
                warn!(line = index + 1, content = line, "Corrupted genotype line");
                continue;
            }
            let columns: Vec<&str> = line.split_whitespace().collect();
            let [rsid, chromosome, position, genotype] = columns[..] else {
                continue;
            };
            rows.push(AttributeRow::new(rsid, ALLELE_FIELD, genotype_to_allele(genotype)));
            rows.push(AttributeRow::new(rsid, CHROMOSOME_FIELD, chromosome));
            rows.push(AttributeRow::new(rsid, POSITION_FIELD, position));
        }
        rows
    }
}

/// `"AG"` becomes `"A/G"`; a single call `"A"` becomes `"A/-"`.
fn genotype_to_allele(genotype: &str) -> String {
    let mut calls = genotype.chars();
    let first = calls.next().unwrap_or('-');
    let second = calls.next().unwrap_or('-');
    format!("{first}/{second}")
}

#[async_trait]
impl Importer for TwentyThreeAndMeImporter {
    fn format(&self) -> &str {
        FORMAT
    }

    async fn import_dataset(
        &self,
        _schema: &str,
        task_id: &str,
        dataset_name: &str,
        files: &[String],
    ) -> Result<Vec<Sample>, ImporterError> {
        let [path] = files else {
            warn!(dataset = dataset_name, files = files.len(), "Expected exactly one 23andMe file");
            return Ok(Vec::new());
        };

        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ImporterError::UnreadableDataset(format!("{path}: {e}")))?;

        let rows = self.parse(&body);
        debug!(dataset = dataset_name, rows = rows.len(), "Parsed 23andMe file");

        let sample = Sample::new(dataset_name);
        self.sink.insert_sample(task_id, &sample)?;
        self.sink.insert_attributes(&sample.id, SNP, rows)?;

        info!(task_id, sample_id = %sample.id, "Imported 23andMe dataset");
        Ok(vec![sample])
    }
}
