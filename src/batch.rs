//! Per-record render pipeline.
//!
//! Each record is rendered, named and written on its own. Any error is
//! contained to its record: it is logged, counted and turned into a
//! [`FailureRecord`], and the loop moves on to the next record.

use crate::{
    error::{Error, Result},
    naming::OutputNaming,
    pipeline::RunStats,
    report::FailureRecord,
    source::{Record, RecordSet},
    template::DocumentTemplate,
    writer::DocumentWriter,
};
use std::path::PathBuf;
use tracing::{error, info};

/// Settings shared by every record of a batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Directory receiving the documents (already prepared)
    pub output_dir: PathBuf,

    /// File naming policy
    pub naming: OutputNaming,

    /// Maximum length of the sanitized part of a file name
    pub max_name_len: usize,

    /// Extension of written documents, without the dot
    pub extension: String,
}

/// Result of running a batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Counters for the batch
    pub stats: RunStats,

    /// One entry per failed record, in record order
    pub failures: Vec<FailureRecord>,

    /// Paths of the written documents, in record order
    pub written: Vec<PathBuf>,
}

/// Renders and writes one document per record.
///
/// `template` is the template for this run, or the error that made the run
/// unable to produce documents (template load, output directory). On an
/// error every record fails with it, so each record still gets exactly one
/// outcome.
pub fn run_batch(
    records: &RecordSet,
    template: std::result::Result<&DocumentTemplate, &Error>,
    options: &BatchOptions,
) -> BatchOutcome {
    let writer = DocumentWriter::new(&options.output_dir);
    let mut outcome = BatchOutcome::default();
    outcome.stats.total = records.len();

    for (index, record) in records.records().iter().enumerate() {
        match process_record(index, record, template, &writer, options) {
            Ok(path) => {
                outcome.stats.succeeded += 1;
                info!("Generated {}", path.display());
                outcome.written.push(path);
            }
            Err(e) => {
                outcome.stats.failed += 1;
                error!("Record {} failed: {}", index + 1, e);
                outcome.failures.push(FailureRecord::new(
                    record.clone(),
                    records.row_number(index),
                    e.to_string(),
                ));
            }
        }
    }

    outcome
}

fn process_record(
    index: usize,
    record: &Record,
    template: std::result::Result<&DocumentTemplate, &Error>,
    writer: &DocumentWriter,
    options: &BatchOptions,
) -> Result<PathBuf> {
    let template = template.map_err(Error::clone)?;
    let document = template.render(record, index)?;
    let file_name =
        options
            .naming
            .file_name(index, record, options.max_name_len, &options.extension);
    writer.write(&file_name, &document)
}
