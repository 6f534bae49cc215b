//! Sample input generator: a contract spreadsheet and a matching Word template.

use crate::error::{Error, Result};
use chrono::{Days, Local};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Column names of the sample spreadsheet.
pub const DEMO_COLUMNS: [&str; 5] = ["客户名称", "合同编号", "签署日期", "合作内容", "合作期限"];

const DEMO_ROWS: [[&str; 4]; 3] = [
    ["张三公司", "HT2025-01", "技术服务", "1年"],
    ["李四集团", "HT2025-02", "设备采购", "2年"],
    ["王五有限公司", "HT2025-03", "市场推广", "半年"],
];

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Paths written by [`write_demo`].
#[derive(Debug, Clone)]
pub struct DemoFiles {
    /// Sample spreadsheet
    pub data: PathBuf,
    /// Sample Word template
    pub template: PathBuf,
}

/// Writes `data.xlsx` and `template.docx` into `dir`.
///
/// # Errors
///
/// Returns an error if the directory or either file cannot be written.
pub fn write_demo(dir: &Path) -> Result<DemoFiles> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let files = DemoFiles {
        data: dir.join("data.xlsx"),
        template: dir.join("template.docx"),
    };

    write_demo_data(&files.data)?;
    write_docx_template(
        &files.template,
        &[
            "合作协议",
            "甲方（客户）：{{ row[\"客户名称\"] }}",
            "合同编号：{{ row[\"合同编号\"] }}",
            "签署日期：{{ row[\"签署日期\"] }}",
            "甲方与乙方本着平等互利的原则，达成如下合作条款：",
            "1. 合作内容：{{ row[\"合作内容\"] }}",
            "2. 合作期限：{{ row[\"合作期限\"] }}",
            "（以下略）",
        ],
    )?;

    info!(
        "Wrote demo files {} and {}",
        files.data.display(),
        files.template.display()
    );
    Ok(files)
}

/// Writes the sample contract spreadsheet. Signing dates start today.
fn write_demo_data(path: &Path) -> Result<()> {
    let today = Local::now().date_naive();
    let header = Format::new().set_bold();

    let mut workbook = Workbook::new();

    let result = (|| {
        let sheet = workbook.add_worksheet();
        for (col, name) in DEMO_COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header)?;
        }

        for (i, [customer, contract, scope, term]) in DEMO_ROWS.iter().enumerate() {
            let row = (i + 1) as u32;
            let signed = today
                .checked_add_days(Days::new(i as u64))
                .unwrap_or(today)
                .format("%Y-%m-%d")
                .to_string();

            sheet.write_string(row, 0, *customer)?;
            sheet.write_string(row, 1, *contract)?;
            sheet.write_string(row, 2, &signed)?;
            sheet.write_string(row, 3, *scope)?;
            sheet.write_string(row, 4, *term)?;
        }

        sheet.autofit();
        workbook.save(path)
    })();

    result.map_err(|e| Error::write(path, e))
}

/// Writes a minimal Word package with one paragraph per entry of `paragraphs`.
///
/// The first paragraph is written in bold as a title.
///
/// # Errors
///
/// Returns [`Error::Write`] if the package cannot be written.
pub fn write_docx_template(path: &Path, paragraphs: &[&str]) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::write(path, e))?;
    let mut zip = ZipWriter::new(file);

    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.to_string()),
        ("_rels/.rels", PACKAGE_RELS_XML.to_string()),
        ("word/document.xml", document_xml(paragraphs)),
    ];

    for (name, content) in parts {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(name, options)
            .map_err(|e| Error::write(path, e))?;
        zip.write_all(content.as_bytes())
            .map_err(|e| Error::write(path, e))?;
    }

    zip.finish().map_err(|e| Error::write(path, e))?;
    Ok(())
}

fn document_xml(paragraphs: &[&str]) -> String {
    let mut body = String::new();
    for (i, text) in paragraphs.iter().enumerate() {
        let run_props = if i == 0 { "<w:rPr><w:b/></w:rPr>" } else { "" };
        body.push_str(&format!(
            "<w:p><w:r>{run_props}<w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>",
            escape_text(text)
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}<w:sectPr/></w:body></w:document>"
    )
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
