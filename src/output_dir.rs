//! Output directory preparation.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

/// Outcome of clearing the output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareReport {
    /// Entries removed.
    pub removed: usize,
    /// Entries that could not be removed.
    pub failed: usize,
}

/// Creates `dir` if needed and removes every entry inside it.
///
/// Files and symlinks are unlinked (links are never followed) and
/// subdirectories are removed recursively. A failure on one entry is logged
/// and the remaining entries are still processed. This destroys the previous
/// contents of `dir`.
///
/// # Errors
///
/// Returns [`Error::Io`] only if the directory itself cannot be created or
/// listed.
pub fn prepare(dir: &Path) -> Result<PrepareReport> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    clear_entries(dir, remove_entry)
}

/// Removes every entry of `dir` with `remove`, counting failures.
fn clear_entries(dir: &Path, remove: impl Fn(&Path) -> Result<()>) -> Result<PrepareReport> {
    let mut report = PrepareReport::default();

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                error!("{}", Error::deletion(dir, &e));
                report.failed += 1;
                continue;
            }
        };

        match remove(&entry.path()) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                error!("{e}");
                report.failed += 1;
            }
        }
    }

    info!(
        "Prepared output directory {} ({} removed, {} failed)",
        dir.display(),
        report.removed,
        report.failed
    );

    Ok(report)
}

fn remove_entry(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path).map_err(|e| Error::deletion(path, &e))?;

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|e| Error::deletion(path, &e))?;
    debug!("Removed {}", path.display());
    Ok(())
}
