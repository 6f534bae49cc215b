//! # docmerge
//!
//! Bulk mail-merge: renders one document per spreadsheet row.
//!
//! ## Features
//!
//! - Reads `.xlsx`, `.xls`, `.xlsb` and `.ods` input, every cell as text
//! - Word (`.docx`) templates and plain Tera text templates
//! - Per-record fault isolation: a bad row never stops the batch
//! - Failed rows collected into a spreadsheet for reprocessing
//! - Safe, length-bounded output file names
//!
//! ## Quick Start
//!
//! ```no_run
//! use docmerge::{Config, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .input("data.xlsx")
//!     .template("template.docx")
//!     .output_dir("contracts")
//!     .build()?;
//!
//! let stats = Pipeline::new(config)?.run()?;
//! assert_eq!(stats.succeeded + stats.failed, stats.total);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! A run is a short pipeline:
//! 1. **Source**: loads records from the first sheet of the input
//! 2. **Prepare**: clears the output directory
//! 3. **Batch**: renders, names and writes each record independently
//! 4. **Report**: writes failed records to the failure report

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod batch;
mod config;
mod error;
mod logging;
mod naming;
mod output_dir;
mod pipeline;
mod report;
mod source;
mod template;
mod template_validator;
mod writer;

pub mod demo;

pub use batch::{run_batch, BatchOptions, BatchOutcome};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use logging::LogSession;
pub use naming::{sanitize, OutputNaming, DEFAULT_MAX_NAME_LEN, UNNAMED};
pub use output_dir::{prepare, PrepareReport};
pub use pipeline::{Pipeline, RunStats};
pub use report::{report_failures, FailureRecord, REASON_COLUMN, ROW_NUMBER_COLUMN};
pub use source::{load_records, Record, RecordSet};
pub use template::{read_docx_text, DocumentTemplate};

/// Runs a complete mail-merge with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The input spreadsheet cannot be read
/// - Strict placeholder checking finds an unmatched placeholder
/// - The failure report cannot be written
///
/// Failures of individual records are not errors; they are counted in the
/// returned [`RunStats`] and written to the failure report.
///
/// # Examples
///
/// ```no_run
/// use docmerge::{Config, run};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder().build()?;
/// let stats = run(config)?;
/// println!("{} of {} documents written", stats.succeeded, stats.total);
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config) -> Result<RunStats> {
    Pipeline::new(config)?.run()
}
