use crate::{
    batch::{run_batch, BatchOptions},
    config::Config,
    error::{Error, Result},
    output_dir,
    report::{report_failures, FailureRecord},
    source::load_records,
    template::DocumentTemplate,
    template_validator::TemplateValidator,
};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Counters collected during one run.
///
/// `succeeded + failed == total` holds once the batch has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Number of input records
    pub total: usize,

    /// Records rendered and written
    pub succeeded: usize,

    /// Records that failed
    pub failed: usize,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl RunStats {
    /// Logs the run summary.
    pub fn log_summary(&self) {
        info!(
            "Run finished: total={}, succeeded={}, failed={} in {:.2}s",
            self.total,
            self.succeeded,
            self.failed,
            self.elapsed.as_secs_f64()
        );
    }

    /// Returns true if every record was written.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Main orchestrator for one mail-merge run.
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Executes the run and returns its statistics.
    ///
    /// # Process
    ///
    /// 1. **Read**: loads every record from the input spreadsheet
    /// 2. **Prepare**: clears the output directory
    /// 3. **Render**: writes one document per record
    /// 4. **Report**: writes failed records to the failure report
    ///
    /// Per-record failures never end the run early. An unusable template or
    /// output directory fails every record instead of aborting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] if the input cannot be read (nothing is
    /// written), [`Error::Config`] if strict placeholder checking fails, and
    /// [`Error::ReportWrite`] if the failure report cannot be saved.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use docmerge::{Config, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .input("data.xlsx")
    ///     .template("template.docx")
    ///     .build()?;
    ///
    /// let stats = Pipeline::new(config)?.run()?;
    /// println!("{} documents written", stats.succeeded);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(input = %self.config.input.display()))]
    pub fn run(self) -> Result<RunStats> {
        let start_time = Instant::now();
        let config = &self.config;

        info!("Starting run");

        let records = load_records(&config.input).inspect_err(|e| {
            error!("Aborting run: {e}");
        })?;

        for column in TemplateValidator::shadowed_columns(records.columns()) {
            warn!(
                "Column '{column}' is hidden by a built-in template name; \
                reference it as row[\"{column}\"]"
            );
        }

        let template = DocumentTemplate::load(&config.template);
        match &template {
            Ok(template) => self.check_placeholders(template, records.columns())?,
            Err(e) => error!("Template unavailable, every record will fail: {e}"),
        }

        let prepared = output_dir::prepare(&config.output_dir);
        if let Err(e) = &prepared {
            error!("Output directory unavailable, every record will fail: {e}");
        }

        let options = BatchOptions {
            output_dir: config.output_dir.clone(),
            naming: config.naming.clone(),
            max_name_len: config.max_name_len,
            extension: self.extension(template.as_ref().ok()),
        };

        let ready = template
            .as_ref()
            .and_then(|template| prepared.as_ref().map(|_| template));
        let outcome = run_batch(&records, ready, &options);

        let report_result = report_failures(&outcome.failures, &config.failure_report);
        if let Err(e) = &report_result {
            log_lost_failures(e, &outcome.failures);
        }

        let stats = RunStats {
            elapsed: start_time.elapsed(),
            ..outcome.stats
        };
        stats.log_summary();

        report_result.map(|_| stats)
    }

    /// Logs template placeholders that no column provides.
    fn check_placeholders(&self, template: &DocumentTemplate, columns: &[String]) -> Result<()> {
        let unmatched = TemplateValidator::unmatched_placeholders(template, columns);
        if unmatched.is_empty() {
            return Ok(());
        }

        let message = format!(
            "Template placeholders without a matching column: {}",
            unmatched.join(", ")
        );

        if self.config.strict_placeholders {
            error!("Aborting run: {message}");
            return Err(Error::config(message));
        }

        warn!("{message}");
        Ok(())
    }

    /// Extension for output documents: configured, or taken from the template.
    fn extension(&self, template: Option<&DocumentTemplate>) -> String {
        if let Some(ext) = &self.config.extension {
            return ext.clone();
        }

        template.map_or_else(
            || {
                self.config
                    .template
                    .extension()
                    .map_or_else(|| "txt".to_string(), |e| e.to_string_lossy().to_lowercase())
            },
            DocumentTemplate::extension,
        )
    }
}

/// Dumps failure records into the log when the report could not be saved.
fn log_lost_failures(err: &Error, failures: &[FailureRecord]) {
    error!(
        "{err}; logging {} failed record(s) for manual recovery",
        failures.len()
    );
    for failure in failures {
        match serde_json::to_string(failure) {
            Ok(json) => error!("Unreported failure: {json}"),
            Err(e) => error!(
                "Unreported failure at row {} ({}): {e}",
                failure.original_row_number, failure.failure_reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use rust_xlsxwriter::Workbook;

    fn write_input(path: &std::path::Path, rows: &[[&str; 2]]) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(0, 1, "city").unwrap();
        for (i, row) in rows.iter().enumerate() {
            let r = (i + 1) as u32;
            sheet.write_string(r, 0, row[0]).unwrap();
            sheet.write_string(r, 1, row[1]).unwrap();
        }
        workbook.save(path).unwrap();
    }

    fn create_test_config(root: &std::path::Path) -> Config {
        Config::builder()
            .input(root.join("data.xlsx"))
            .template(root.join("letter.txt"))
            .output_dir(root.join("out"))
            .failure_report(root.join("failures.xlsx"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_pipeline_basic_execution() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_input(&temp.path().join("data.xlsx"), &[["Ann", "Oslo"], ["Ben", "Rome"]]);
        temp.child("letter.txt").write_str("Hello {{ name }}").unwrap();

        let stats = Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.succeeded, 2);
        assert!(stats.is_clean());
        temp.child("out/1_Ann.txt").assert("Hello Ann");
        assert!(!temp.child("failures.xlsx").exists());
    }

    #[test]
    fn test_pipeline_clears_previous_output() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_input(&temp.path().join("data.xlsx"), &[["Ann", "Oslo"]]);
        temp.child("letter.txt").write_str("{{ city }}").unwrap();
        temp.child("out/stale.txt").write_str("old").unwrap();

        Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap();

        assert!(!temp.child("out/stale.txt").exists());
        temp.child("out/1_Ann.txt").assert("Oslo");
    }

    #[test]
    fn test_pipeline_missing_input_aborts() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("letter.txt").write_str("{{ name }}").unwrap();

        let err = Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap_err();

        assert!(err.is_read());
        assert!(!temp.child("out").exists());
        assert!(!temp.child("failures.xlsx").exists());
    }

    #[test]
    fn test_pipeline_missing_template_fails_every_record() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_input(&temp.path().join("data.xlsx"), &[["Ann", "Oslo"], ["Ben", "Rome"]]);

        let stats = Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(stats.failed, 2);
        assert_eq!(stats.succeeded, 0);
        assert!(temp.child("failures.xlsx").exists());
    }

    #[test]
    fn test_pipeline_output_dir_failure_fails_every_record() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_input(&temp.path().join("data.xlsx"), &[["Ann", "Oslo"], ["Ben", "Rome"]]);
        temp.child("letter.txt").write_str("{{ name }}").unwrap();
        temp.child("out").write_str("a file, not a directory").unwrap();

        let stats = Pipeline::new(create_test_config(temp.path()))
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.succeeded, 0);

        let report = load_records(&temp.path().join("failures.xlsx")).unwrap();
        assert_eq!(report.len(), 2);
        temp.child("out").assert("a file, not a directory");
    }

    #[test]
    fn test_pipeline_strict_placeholders_abort() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_input(&temp.path().join("data.xlsx"), &[["Ann", "Oslo"]]);
        temp.child("letter.txt").write_str("{{ nickname }}").unwrap();

        let config = Config::builder()
            .input(temp.path().join("data.xlsx"))
            .template(temp.path().join("letter.txt"))
            .output_dir(temp.path().join("out"))
            .failure_report(temp.path().join("failures.xlsx"))
            .strict_placeholders(true)
            .build()
            .unwrap();

        let err = Pipeline::new(config).unwrap().run().unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("nickname"));
        assert!(!temp.child("out").exists());
    }

    #[test]
    fn test_pipeline_report_write_failure_is_surfaced() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_input(&temp.path().join("data.xlsx"), &[["Ann", "Oslo"]]);
        temp.child("letter.txt").write_str("{{ nickname }}").unwrap();
        temp.child("blocker").write_str("file in the way").unwrap();

        let config = Config::builder()
            .input(temp.path().join("data.xlsx"))
            .template(temp.path().join("letter.txt"))
            .output_dir(temp.path().join("out"))
            .failure_report(temp.path().join("blocker/failures.xlsx"))
            .build()
            .unwrap();

        let err = Pipeline::new(config).unwrap().run().unwrap_err();
        assert!(matches!(err, Error::ReportWrite { .. }));
    }

    #[test]
    fn test_extension_override() {
        let temp = assert_fs::TempDir::new().unwrap();
        write_input(&temp.path().join("data.xlsx"), &[["Ann", "Oslo"]]);
        temp.child("letter.txt").write_str("<p>{{ name }}</p>").unwrap();

        let config = Config::builder()
            .input(temp.path().join("data.xlsx"))
            .template(temp.path().join("letter.txt"))
            .output_dir(temp.path().join("out"))
            .failure_report(temp.path().join("failures.xlsx"))
            .extension("html")
            .build()
            .unwrap();

        Pipeline::new(config).unwrap().run().unwrap();
        temp.child("out/1_Ann.html").assert("<p>Ann</p>");
    }

    #[test]
    fn test_run_stats_summary_helpers() {
        let stats = RunStats {
            total: 3,
            succeeded: 2,
            failed: 1,
            elapsed: Duration::from_millis(5),
        };
        assert!(!stats.is_clean());
        assert_eq!(stats.succeeded + stats.failed, stats.total);
    }
}
