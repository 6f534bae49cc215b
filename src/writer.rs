use crate::error::{Error, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Writes rendered documents into the output directory.
pub(crate) struct DocumentWriter {
    output_dir: PathBuf,
}

impl DocumentWriter {
    /// Creates a writer for an already prepared output directory.
    pub(crate) fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Writes one document and returns its path.
    ///
    /// A document that already exists is never replaced: the output
    /// directory is cleared at the start of a run, so an existing file means
    /// two records derived the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Write`] on a name collision or any IO failure.
    pub(crate) fn write(&self, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.output_dir.join(file_name);

        if path.exists() {
            return Err(Error::write(
                &path,
                "file already written by an earlier record in this run",
            ));
        }

        Self::write_file_atomic(&path, content)?;
        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(path)
    }

    /// Writes a file atomically.
    ///
    /// # Process
    ///
    /// 1. Writes content to a temporary file next to the target
    /// 2. Syncs the temporary file to disk
    /// 3. Renames the temporary file to the target path
    ///
    /// A failed write never leaves a partial document behind.
    fn write_file_atomic(path: &Path, content: &[u8]) -> Result<()> {
        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        let result = (|| {
            let mut temp_file = fs::File::create(&temp_path)?;
            temp_file.write_all(content)?;
            temp_file.sync_all()?;
            drop(temp_file);
            fs::rename(&temp_path, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(Error::write(path, e));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_writer_creates_document() {
        let temp = assert_fs::TempDir::new().unwrap();
        let writer = DocumentWriter::new(temp.path());

        let path = writer.write("1_Alice.txt", b"hello").unwrap();

        assert_eq!(path, temp.path().join("1_Alice.txt"));
        temp.child("1_Alice.txt").assert("hello");
        assert!(!temp.child("1_Alice.txt.tmp").exists());
    }

    #[test]
    fn test_writer_refuses_to_overwrite() {
        let temp = assert_fs::TempDir::new().unwrap();
        let writer = DocumentWriter::new(temp.path());

        writer.write("same.txt", b"first").unwrap();
        let err = writer.write("same.txt", b"second").unwrap_err();

        assert!(err.is_write());
        temp.child("same.txt").assert("first");
    }

    #[test]
    fn test_writer_missing_directory_fails_cleanly() {
        let temp = assert_fs::TempDir::new().unwrap();
        let writer = DocumentWriter::new(temp.path().join("missing"));

        let err = writer.write("1_a.txt", b"data").unwrap_err();

        assert!(err.is_write());
        assert!(err.to_string().contains("1_a.txt"));
    }
}
