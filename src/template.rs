use crate::{
    error::{Error, Result},
    source::Record,
    template_validator::TemplateValidator,
};
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tera::{Context, Tera};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Context key holding every field of the record as a map.
pub const ROW_KEY: &str = "row";

/// Context key holding the 1-based position of the record.
pub const INDEX_KEY: &str = "_index";

/// Word package parts that contain renderable text.
const DOCX_TEXT_PARTS: &[&str] = &[
    "word/document.xml",
    "word/footnotes.xml",
    "word/endnotes.xml",
];

/// Word package part prefixes that contain renderable text.
const DOCX_TEXT_PREFIXES: &[&str] = &["word/header", "word/footer"];

/// Returns true if `name` can be referenced directly as `{{ name }}`.
#[must_use]
pub fn is_template_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One entry of a Word package.
struct PackageEntry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
    rendered: bool,
}

enum Layout {
    Text { name: String },
    Docx { entries: Vec<PackageEntry> },
}

/// An immutable, compiled document template.
///
/// The template is loaded once per run. [`DocumentTemplate::render`] takes
/// `&self` and builds a new document for every call, so no state leaks from
/// one record into the next.
pub struct DocumentTemplate {
    path: PathBuf,
    tera: Tera,
    layout: Layout,
    sources: Vec<String>,
}

impl DocumentTemplate {
    /// Loads and compiles a template.
    ///
    /// `.docx`/`.dotx` files are treated as Word packages whose text parts
    /// are Tera templates. Any other file is a plain Tera text template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TemplateLoad`] if the file cannot be read or is not a
    /// valid package, and [`Error::Render`] if the markup does not compile.
    pub fn load(path: &Path) -> Result<Self> {
        TemplateValidator::validate_file(path)?;

        let bytes = fs::read(path).map_err(|e| Error::template_load(path, e))?;
        let mut tera = Tera::default();
        let mut sources = Vec::new();

        let layout = if is_docx(path) {
            let entries = read_package(path, &bytes)?;
            for entry in entries.iter().filter(|e| e.rendered) {
                let xml = std::str::from_utf8(&entry.data)
                    .map_err(|e| Error::template_load(path, format!("{}: {e}", entry.name)))?;
                let source = merge_split_tags(xml);
                tera.add_raw_template(&entry.name, &rewrite_row_lookups(&source))
                    .map_err(|e| Error::render(&entry.name, &e))?;
                sources.push(source);
            }
            Layout::Docx { entries }
        } else {
            let name = path
                .file_name()
                .map_or_else(|| "template".to_string(), |n| n.to_string_lossy().into_owned());
            let source = String::from_utf8(bytes)
                .map_err(|_| Error::template_load(path, "template is not valid UTF-8"))?;
            tera.add_raw_template(&name, &rewrite_row_lookups(&source))
                .map_err(|e| Error::render(&name, &e))?;
            sources.push(source);
            Layout::Text { name }
        };

        debug!(
            "Loaded template {} ({} renderable part(s))",
            path.display(),
            sources.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            tera,
            layout,
            sources,
        })
    }

    /// Returns the template path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the extension rendered documents should carry.
    #[must_use]
    pub fn extension(&self) -> String {
        match &self.layout {
            Layout::Docx { .. } => "docx".to_string(),
            Layout::Text { .. } => self
                .path
                .extension()
                .map_or_else(|| "txt".to_string(), |e| e.to_string_lossy().to_lowercase()),
        }
    }

    /// Returns the compiled template sources (one per renderable part).
    pub(crate) fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(String::as_str)
    }

    /// Builds the rendering context for a record at 0-based `index`.
    ///
    /// Fields are available by column name and through the `row` map;
    /// `_index` holds the 1-based position.
    #[must_use]
    pub fn context(record: &Record, index: usize) -> Context {
        let mut context = Context::new();
        for (field, value) in record.fields() {
            context.insert(field, value);
        }
        context.insert(ROW_KEY, record);
        context.insert(INDEX_KEY, &(index + 1));
        context
    }

    /// Renders the document for one record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Render`] if a placeholder has no matching field or
    /// the document cannot be assembled.
    pub fn render(&self, record: &Record, index: usize) -> Result<Vec<u8>> {
        let context = Self::context(record, index);

        match &self.layout {
            Layout::Text { name } => self
                .tera
                .render(name, &context)
                .map(String::into_bytes)
                .map_err(|e| Error::render(name, &e)),
            Layout::Docx { entries } => self.render_package(entries, &context),
        }
    }

    fn render_package(&self, entries: &[PackageEntry], context: &Context) -> Result<Vec<u8>> {
        let package_error = |e: &dyn std::fmt::Display| Error::Render {
            template: self.path.display().to_string(),
            message: e.to_string(),
        };

        let mut out = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in entries {
            let options = SimpleFileOptions::default().compression_method(entry.compression);

            if entry.is_dir {
                out.add_directory(entry.name.as_str(), options)
                    .map_err(|e| package_error(&e))?;
                continue;
            }

            out.start_file(entry.name.as_str(), options)
                .map_err(|e| package_error(&e))?;

            if entry.rendered {
                let xml = self
                    .tera
                    .render(&entry.name, context)
                    .map_err(|e| Error::render(&entry.name, &e))?;
                out.write_all(xml.as_bytes())
                    .map_err(|e| package_error(&e))?;
            } else {
                out.write_all(&entry.data).map_err(|e| package_error(&e))?;
            }
        }

        let cursor = out.finish().map_err(|e| package_error(&e))?;
        Ok(cursor.into_inner())
    }
}

fn is_docx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("docx") || e.eq_ignore_ascii_case("dotx"))
}

fn is_text_part(name: &str) -> bool {
    DOCX_TEXT_PARTS.contains(&name)
        || (DOCX_TEXT_PREFIXES.iter().any(|p| name.starts_with(p)) && name.ends_with(".xml"))
}

/// Reads every entry of a Word package into memory.
fn read_package(path: &Path, bytes: &[u8]) -> Result<Vec<PackageEntry>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::template_load(path, e))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::template_load(path, e))?;
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| Error::template_load(path, format!("{name}: {e}")))?;

        entries.push(PackageEntry {
            rendered: is_text_part(&name),
            compression: file.compression(),
            is_dir: file.is_dir(),
            name,
            data,
        });
    }

    if !entries.iter().any(|e| e.name == "word/document.xml") {
        return Err(Error::template_load(
            path,
            "package has no word/document.xml part",
        ));
    }

    Ok(entries)
}

/// Re-joins Tera tags that Word split across runs.
///
/// Word often stores `{{ name }}` as several `<w:r>` runs. Inside a tag all
/// XML markup is dropped and XML entities are decoded, so Tera sees the tag
/// as typed. Text outside tags is left untouched.
fn merge_split_tags(xml: &str) -> String {
    let bytes = xml.as_bytes();
    let mut out = String::with_capacity(xml.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }

        let open = skip_markup(bytes, i + 1);
        let close = match bytes.get(open) {
            Some(b'{') => b'}',
            Some(b'%') => b'%',
            Some(b'#') => b'#',
            _ => {
                i += 1;
                continue;
            }
        };

        let Some((body, end)) = collect_tag_body(xml, open + 1, close) else {
            i += 1;
            continue;
        };

        out.push_str(&xml[copied..i]);
        out.push('{');
        out.push(bytes[open] as char);
        out.push_str(&unescape_xml(&body));
        out.push(close as char);
        out.push('}');

        copied = end;
        i = end;
    }

    out.push_str(&xml[copied..]);
    out
}

/// Skips consecutive `<...>` markup starting at `i`.
fn skip_markup(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i) == Some(&b'<') {
        match bytes[i..].iter().position(|&b| b == b'>') {
            Some(offset) => i += offset + 1,
            None => return bytes.len(),
        }
    }
    i
}

/// Collects the text of a tag body up to `close` + `}`, dropping markup.
///
/// Returns the body and the index just past the closing delimiter.
fn collect_tag_body(xml: &str, start: usize, close: u8) -> Option<(String, usize)> {
    let bytes = xml.as_bytes();
    let mut body = String::new();
    let mut segment = start;
    let mut i = start;

    while i < bytes.len() {
        match bytes[i] {
            b'<' => {
                body.push_str(&xml[segment..i]);
                i = skip_markup(bytes, i);
                segment = i;
            }
            b if b == close => {
                let next = skip_markup(bytes, i + 1);
                if bytes.get(next) == Some(&b'}') {
                    body.push_str(&xml[segment..i]);
                    return Some((body, next + 1));
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    None
}

/// Rewrites `row["key"]` lookups inside tags into `row | get(key="key")`.
///
/// Tera resolves subscripts through a dotted pointer that slices the key by
/// character count and panics on non-ASCII column names. The `get` filter
/// is a plain map lookup and fails with a render error on a missing key.
fn rewrite_row_lookups(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(open) = rest.find('{') {
        let close = match rest.as_bytes().get(open + 1) {
            Some(b'{') => "}}",
            Some(b'%') => "%}",
            _ => {
                out.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
                continue;
            }
        };

        let body_start = open + 2;
        let Some(len) = rest[body_start..].find(close) else {
            break;
        };

        out.push_str(&rest[..body_start]);
        out.push_str(&rewrite_lookups_in_tag(&rest[body_start..body_start + len]));
        rest = &rest[body_start + len..];
    }

    out.push_str(rest);
    out
}

fn rewrite_lookups_in_tag(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(pos) = rest.find(ROW_KEY) {
        let after = &rest[pos + ROW_KEY.len()..];
        let standalone = rest[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'));

        match quoted_lookup(after).filter(|_| standalone) {
            Some((key, quote, consumed)) => {
                out.push_str(&rest[..pos]);
                out.push_str(&format!("{ROW_KEY} | get(key={quote}{key}{quote})"));
                rest = &after[consumed..];
            }
            None => {
                out.push_str(&rest[..pos + ROW_KEY.len()]);
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Parses `["key"]` or `['key']` at the start of `text`.
///
/// Returns the key, its quote character and the number of bytes consumed.
fn quoted_lookup(text: &str) -> Option<(&str, char, usize)> {
    let inner = text.trim_start().strip_prefix('[')?.trim_start();
    let quote = inner.chars().next().filter(|c| matches!(c, '"' | '\''))?;
    let key_and_rest = &inner[1..];
    let key_len = key_and_rest.find(quote)?;
    let after = key_and_rest[key_len + 1..].trim_start().strip_prefix(']')?;
    Some((&key_and_rest[..key_len], quote, text.len() - after.len()))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Reads a Word document's main part (`word/document.xml`) as a string.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is not a Word package.
pub fn read_docx_text(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| Error::template_load(path, e))?;
    let mut part = archive
        .by_name("word/document.xml")
        .map_err(|e| Error::template_load(path, e))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| Error::io(path, e))?;
    Ok(xml)
}
