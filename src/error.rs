use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the docmerge library.
///
/// Errors are cloneable so that a single template-load failure can be
/// attached to every record of a batch.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Input spreadsheet is missing, unreadable or malformed. Fatal for a run.
    #[error("Failed to read spreadsheet '{path}': {message}")]
    Read {
        /// Spreadsheet path
        path: PathBuf,
        /// Underlying cause
        message: String,
    },

    /// Template could not be rendered for a record.
    #[error("Failed to render template '{template}': {message}")]
    Render {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// Template file could not be loaded or compiled.
    #[error("Failed to load template '{path}': {message}")]
    TemplateLoad {
        /// Template path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A rendered document could not be written.
    #[error("Failed to write document '{path}': {message}")]
    Write {
        /// Destination path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A directory entry could not be removed while clearing the output directory.
    #[error("Failed to delete '{path}': {message}")]
    Deletion {
        /// Entry path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The failure report spreadsheet could not be written.
    #[error("Failed to write failure report '{path}': {message}")]
    ReportWrite {
        /// Report path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// Logging could not be initialized.
    #[error("Failed to initialize logging in '{path}': {message}")]
    Logging {
        /// Log directory
        path: PathBuf,
        /// Error message
        message: String,
    },
}

impl Error {
    /// Creates a read error for the input spreadsheet.
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates a render error from a Tera failure.
    ///
    /// Tera reports the interesting part (the missing variable, the bad tag)
    /// in the source chain, so the whole chain is flattened into the message.
    #[must_use]
    pub fn render(template: impl Into<String>, source: &tera::Error) -> Self {
        Self::Render {
            template: template.into(),
            message: error_chain(source),
        }
    }

    /// Creates a template load error.
    #[must_use]
    pub fn template_load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::TemplateLoad {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates a write error.
    #[must_use]
    pub fn write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates a deletion error.
    #[must_use]
    pub fn deletion(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::Deletion {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a failure report write error.
    #[must_use]
    pub fn report_write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ReportWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a logging initialization error.
    #[must_use]
    pub fn logging(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Logging {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if this error aborts a whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Config { .. } | Self::Logging { .. }
        )
    }

    /// Returns true if this is a read error.
    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }

    /// Returns true if this is a render error.
    #[must_use]
    pub const fn is_render(&self) -> bool {
        matches!(self, Self::Render { .. })
    }

    /// Returns true if this is a write error.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

/// Joins an error and all of its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
