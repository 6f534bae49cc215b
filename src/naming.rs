//! Output file naming.
//!
//! Every rendered document gets a file name derived from its record. The
//! name passes through [`sanitize`] so a display value such as a company
//! name can never introduce path separators or reserved characters.

use crate::source::Record;
use std::fmt;

/// Characters that are not allowed in generated file names.
const RESERVED_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Replacement for reserved characters.
const REPLACEMENT: char = '-';

/// Stem used when the naming field of a record is blank.
pub const UNNAMED: &str = "unnamed";

/// Default maximum length of the sanitized part of a file name.
pub const DEFAULT_MAX_NAME_LEN: usize = 20;

/// Converts an arbitrary display string into a safe, length-bounded file name.
///
/// Each of `/ \ : * ? " < > |` becomes `-`, then the result is cut to at
/// most `max_len` characters.
///
/// # Examples
///
/// ```
/// use docmerge::sanitize;
///
/// assert_eq!(sanitize("A/B:C", 20), "A-B-C");
/// assert_eq!(sanitize("abcdef", 3), "abc");
/// ```
#[must_use]
pub fn sanitize(name: &str, max_len: usize) -> String {
    name.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { REPLACEMENT } else { c })
        .take(max_len)
        .collect()
}

/// Policy for deriving output file names from records.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputNaming {
    /// `{position}_{first column}.{ext}`, unique even when field values collide.
    #[default]
    Positional,

    /// Values of the named fields joined with `_`, e.g. customer name and
    /// contract number.
    Fields(Vec<String>),
}

impl OutputNaming {
    /// Derives the file name for the record at 0-based `index`.
    #[must_use]
    pub fn file_name(
        &self,
        index: usize,
        record: &Record,
        max_len: usize,
        extension: &str,
    ) -> String {
        match self {
            Self::Positional => {
                let stem = non_blank(record.first_value()).unwrap_or(UNNAMED);
                format!("{}_{}.{}", index + 1, sanitize(stem, max_len), extension)
            }
            Self::Fields(fields) => {
                let stem = fields
                    .iter()
                    .enumerate()
                    .map(|(pos, field)| match non_blank(record.get(field)) {
                        Some(value) => value,
                        None if pos == 0 => UNNAMED,
                        None => "",
                    })
                    .collect::<Vec<_>>()
                    .join("_");
                format!("{}.{}", sanitize(&stem, max_len), extension)
            }
        }
    }
}

impl fmt::Display for OutputNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional => write!(f, "positional"),
            Self::Fields(fields) => write!(f, "fields({})", fields.join(", ")),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
