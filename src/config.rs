use crate::error::{Error, Result};
use crate::naming::{OutputNaming, DEFAULT_MAX_NAME_LEN};
use std::path::{Component, Path, PathBuf};

const DEFAULT_INPUT: &str = "data.xlsx";
const DEFAULT_TEMPLATE: &str = "template.docx";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_FAILURE_REPORT: &str = "failures.xlsx";

/// Configuration for a docmerge run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Input spreadsheet; the first row holds the field names
    pub input: PathBuf,

    /// Document template (`.docx` or any Tera text template)
    pub template: PathBuf,

    /// Output directory, cleared at the start of every run
    pub output_dir: PathBuf,

    /// Directory for daily log files
    pub log_dir: PathBuf,

    /// Spreadsheet receiving failed records
    pub failure_report: PathBuf,

    /// Maximum length of the sanitized part of output file names
    pub max_name_len: usize,

    /// Output file naming policy
    pub naming: OutputNaming,

    /// Output extension override (without the leading dot)
    pub extension: Option<String>,

    /// Abort before rendering if a placeholder has no matching column
    pub strict_placeholders: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use docmerge::Config;
    ///
    /// let config = Config::builder()
    ///     .input("contracts.xlsx")
    ///     .max_name_len(30)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// Paths are not checked for existence here: a missing input aborts the
    /// run with a read error, and a missing template fails every record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required path is empty
    /// - `max_name_len` is zero
    /// - Field naming has no fields
    /// - The extension is empty or starts with a dot
    /// - The input, template, log directory or failure report lies inside
    ///   the output directory, which is cleared on every run
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("input", &self.input),
            ("template", &self.template),
            ("output_dir", &self.output_dir),
            ("failure_report", &self.failure_report),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::config(format!("{name} path must not be empty")));
            }
        }

        if self.max_name_len == 0 {
            return Err(Error::config("max_name_len must be greater than 0"));
        }

        if let OutputNaming::Fields(fields) = &self.naming {
            if fields.is_empty() {
                return Err(Error::config(
                    "Field naming requires at least one field. \
                    Use Config::builder().naming(OutputNaming::Fields(vec![\"name\".into()]))",
                ));
            }
        }

        if let Some(ext) = &self.extension {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(Error::config(format!(
                    "extension '{ext}' must be non-empty and given without the leading dot"
                )));
            }
        }

        let output_dir = normalize(&self.output_dir);
        for (name, path) in [
            ("input", &self.input),
            ("template", &self.template),
            ("log_dir", &self.log_dir),
            ("failure_report", &self.failure_report),
        ] {
            if normalize(path).starts_with(&output_dir) {
                return Err(Error::config(format!(
                    "{name} ({}) must not be inside output_dir ({}), which is cleared on every run",
                    path.display(),
                    self.output_dir.display()
                )));
            }
        }

        Ok(())
    }
}

/// Makes `path` absolute and folds `.` and `..` components lexically.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut normalized = PathBuf::new();

    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    normalized
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            template: PathBuf::from(DEFAULT_TEMPLATE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            failure_report: PathBuf::from(DEFAULT_FAILURE_REPORT),
            max_name_len: DEFAULT_MAX_NAME_LEN,
            naming: OutputNaming::Positional,
            extension: None,
            strict_placeholders: false,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    input: Option<PathBuf>,
    template: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    failure_report: Option<PathBuf>,
    max_name_len: Option<usize>,
    naming: Option<OutputNaming>,
    extension: Option<String>,
    strict_placeholders: bool,
}

impl ConfigBuilder {
    /// Sets the input spreadsheet.
    #[must_use]
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input = Some(path.into());
        self
    }

    /// Sets the document template.
    #[must_use]
    pub fn template(mut self, path: impl Into<PathBuf>) -> Self {
        self.template = Some(path.into());
        self
    }

    /// Sets the output directory for generated documents.
    #[must_use]
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the directory for daily log files.
    #[must_use]
    pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(path.into());
        self
    }

    /// Sets the failure report path.
    #[must_use]
    pub fn failure_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.failure_report = Some(path.into());
        self
    }

    /// Sets the maximum length of the sanitized part of file names.
    #[must_use]
    pub fn max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = Some(len);
        self
    }

    /// Sets the output file naming policy.
    #[must_use]
    pub fn naming(mut self, naming: OutputNaming) -> Self {
        self.naming = Some(naming);
        self
    }

    /// Overrides the output extension (without the leading dot).
    ///
    /// By default documents take the template's extension.
    #[must_use]
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }

    /// Aborts the run when a placeholder has no matching column.
    #[must_use]
    pub fn strict_placeholders(mut self, enabled: bool) -> Self {
        self.strict_placeholders = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let config = Config {
            input: self.input.unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT)),
            template: self
                .template
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE)),
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            failure_report: self
                .failure_report
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FAILURE_REPORT)),
            max_name_len: self.max_name_len.unwrap_or(DEFAULT_MAX_NAME_LEN),
            naming: self.naming.unwrap_or_default(),
            extension: self.extension,
            strict_placeholders: self.strict_placeholders,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::builder().build().unwrap();

        assert_eq!(config.max_name_len, DEFAULT_MAX_NAME_LEN);
        assert_eq!(config.max_name_len, 20);
        assert_eq!(config.naming, OutputNaming::Positional);
        assert_eq!(config.input, PathBuf::from("data.xlsx"));
        assert!(!config.strict_placeholders);
    }

    #[test]
    fn test_invalid_max_name_len() {
        let result = Config::builder().max_name_len(0).build();
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_empty_field_naming() {
        let result = Config::builder()
            .naming(OutputNaming::Fields(Vec::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_extension() {
        assert!(Config::builder().extension(".docx").build().is_err());
        assert!(Config::builder().extension("").build().is_err());
        assert!(Config::builder().extension("md").build().is_ok());
    }

    #[test]
    fn test_empty_input_path() {
        let result = Config::builder().input("").build();
        assert!(result.unwrap_err().to_string().contains("input"));
    }

    #[test]
    fn test_failure_report_inside_output_dir() {
        let result = Config::builder()
            .output_dir("out")
            .failure_report("out/failures.xlsx")
            .build();
        assert!(result.is_err());

        let result = Config::builder()
            .output_dir("./out")
            .failure_report("out/failures.xlsx")
            .build();
        assert!(result.unwrap_err().to_string().contains("failure_report"));
    }

    #[test]
    fn test_inputs_inside_output_dir() {
        let err = Config::builder()
            .input("work/data.xlsx")
            .output_dir("work/")
            .build()
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("input"));

        let err = Config::builder()
            .template("./work/letter.txt")
            .output_dir("work")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("template"));

        let err = Config::builder()
            .input("data.xlsx")
            .output_dir(".")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("input"));

        let err = Config::builder().log_dir("out/logs").output_dir("out").build();
        assert!(err.is_err());
    }

    #[test]
    fn test_sibling_paths_are_not_inside_output_dir() {
        let config = Config::builder()
            .output_dir("out")
            .failure_report("output.xlsx")
            .input("out/../data.xlsx")
            .build();
        assert!(config.is_ok());
    }

    #[test]
    fn test_normalize_folds_relative_components() {
        assert_eq!(normalize(Path::new("./out/./a/../b")), normalize(Path::new("out/b")));
        assert!(normalize(Path::new("out")).is_absolute());
    }
}
