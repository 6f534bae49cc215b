use crate::error::{Error, Result};
use crate::template::{DocumentTemplate, INDEX_KEY, ROW_KEY};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Maximum template file size (16MB). Word packages with images get large.
const MAX_TEMPLATE_SIZE: u64 = 16 * 1024 * 1024;

/// Names that are always defined while rendering.
const BUILTIN_NAMES: &[&str] = &[ROW_KEY, INDEX_KEY, "loop", "__tera_context"];

/// Pre-flight checks for template files and placeholder coverage.
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates a template file before it is compiled.
    ///
    /// Performs the following checks:
    /// 1. File exists and is a regular file
    /// 2. File size is within limits
    /// 3. File is not empty
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateLoad`] if any check fails.
    pub(crate) fn validate_file(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::template_load(path, "Template file not found"));
        }

        if !path.is_file() {
            return Err(Error::template_load(path, "Path is not a file"));
        }

        let metadata = fs::metadata(path).map_err(|e| Error::template_load(path, e))?;
        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_load(
                path,
                format!(
                    "Template file too large: {} bytes (max: {} bytes)",
                    metadata.len(),
                    MAX_TEMPLATE_SIZE
                ),
            ));
        }

        if metadata.len() == 0 {
            return Err(Error::template_load(path, "Template file is empty"));
        }

        Ok(())
    }

    /// Returns the placeholders of a template that no column provides.
    ///
    /// Uses a heuristic: every `{{ name ... }}` expression and every
    /// `row["name"]` lookup is collected, minus names bound by `for`/`set`
    /// tags and the built-in context keys. This may miss names used only
    /// inside control tags but never reports a name that is defined.
    pub(crate) fn unmatched_placeholders(
        template: &DocumentTemplate,
        columns: &[String],
    ) -> Vec<String> {
        let mut referenced = BTreeSet::new();
        let mut bound = BTreeSet::new();

        for source in template.sources() {
            collect_expressions(source, &mut referenced);
            collect_bound_names(source, &mut bound);
        }

        referenced
            .into_iter()
            .filter(|name| !BUILTIN_NAMES.contains(&name.as_str()))
            .filter(|name| !bound.contains(name))
            .filter(|name| !columns.contains(name))
            .collect()
    }

    /// Returns the columns whose names collide with built-in context keys.
    ///
    /// The built-in value wins, so such a column is only reachable through
    /// the `row` map.
    pub(crate) fn shadowed_columns(columns: &[String]) -> Vec<&str> {
        columns
            .iter()
            .map(String::as_str)
            .filter(|column| [ROW_KEY, INDEX_KEY].contains(column))
            .collect()
    }
}

/// Collects the names referenced by `{{ ... }}` expressions.
fn collect_expressions(source: &str, names: &mut BTreeSet<String>) {
    for body in tag_bodies(source, "{{", "}}") {
        let body = body.trim_matches('-').trim();
        let ident = leading_identifier(body);

        if ident == ROW_KEY {
            if let Some(key) = quoted_subscript(&body[ident.len()..]) {
                names.insert(key.to_string());
            }
        } else if !ident.is_empty() {
            names.insert(ident.to_string());
        }
    }
}

/// Collects loop and assignment targets from `{% for %}` and `{% set %}` tags.
fn collect_bound_names(source: &str, names: &mut BTreeSet<String>) {
    for body in tag_bodies(source, "{%", "%}") {
        let body = body.trim_matches('-').trim();
        let mut words = body.split_whitespace();

        match words.next() {
            Some("for") => {
                for word in words.take_while(|w| *w != "in") {
                    for target in word.split(',').filter(|t| !t.is_empty()) {
                        names.insert(target.to_string());
                    }
                }
            }
            Some("set" | "set_global") => {
                if let Some(target) = words.next() {
                    names.insert(target.trim_end_matches('=').to_string());
                }
            }
            _ => {}
        }
    }
}

fn tag_bodies<'a>(source: &'a str, open: &'a str, close: &'a str) -> impl Iterator<Item = &'a str> {
    let mut rest = source;
    std::iter::from_fn(move || {
        let start = rest.find(open)? + open.len();
        let len = rest[start..].find(close)?;
        let body = &rest[start..start + len];
        rest = &rest[start + len + close.len()..];
        Some(body)
    })
}

fn leading_identifier(expr: &str) -> &str {
    let end = expr
        .char_indices()
        .find(|&(pos, c)| {
            let allowed = c.is_ascii_alphanumeric() || c == '_';
            !allowed || (pos == 0 && c.is_ascii_digit())
        })
        .map_or(expr.len(), |(pos, _)| pos);
    &expr[..end]
}

/// Parses `["key"]` or `['key']` at the start of `rest`.
fn quoted_subscript(rest: &str) -> Option<&str> {
    let inner = rest.trim_start().strip_prefix('[')?.trim_start();
    let quote = inner.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let inner = &inner[1..];
    let end = inner.find(quote)?;
    Some(&inner[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    fn load(content: &str) -> (assert_fs::TempDir, DocumentTemplate) {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("template.txt");
        file.write_str(content).unwrap();
        let template = DocumentTemplate::load(file.path()).unwrap();
        (temp, template)
    }

    #[test]
    fn test_validate_nonexistent_file() {
        let result = TemplateValidator::validate_file(Path::new("/nonexistent/template.docx"));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_validate_empty_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("empty.txt");
        file.touch().unwrap();

        let err = TemplateValidator::validate_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_validate_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = TemplateValidator::validate_file(temp.path()).unwrap_err();
        assert!(err.to_string().contains("not a file"));
    }

    #[test]
    fn test_validate_file_too_large() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("large.txt");
        file.write_binary(&vec![b'x'; (MAX_TEMPLATE_SIZE + 1) as usize])
            .unwrap();

        let err = TemplateValidator::validate_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_all_placeholders_matched() {
        let (_temp, template) = load("{{ name }} {{ amount | round }} {{ row[\"客户名称\"] }}");
        let unmatched = TemplateValidator::unmatched_placeholders(
            &template,
            &columns(&["name", "amount", "客户名称"]),
        );
        assert!(unmatched.is_empty());
    }

    #[test]
    fn test_unmatched_placeholders_reported() {
        let (_temp, template) = load("{{ name }} {{ nickname }} {{ row['合同编号'] }}");
        let unmatched =
            TemplateValidator::unmatched_placeholders(&template, &columns(&["name"]));
        assert_eq!(unmatched, vec!["nickname".to_string(), "合同编号".to_string()]);
    }

    #[test]
    fn test_shadowed_columns() {
        let cols = columns(&["name", "row", "_index", "index"]);
        let shadowed = TemplateValidator::shadowed_columns(&cols);
        assert_eq!(shadowed, vec!["row", "_index"]);
        assert!(TemplateValidator::shadowed_columns(&columns(&["name"])).is_empty());
    }

    #[test]
    fn test_bound_names_and_builtins_ignored() {
        let (_temp, template) = load(
            "{% for key, value in row %}{{ key }}={{ value }}{% endfor %}\
             {% set total = 1 %}{{ total }} {{ _index }} {{ \"literal\" }} {{ 42 }}",
        );
        let unmatched = TemplateValidator::unmatched_placeholders(&template, &[]);
        assert!(unmatched.is_empty(), "unexpected: {unmatched:?}");
    }
}
