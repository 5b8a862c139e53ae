// Text extraction module
// Turns raw uploaded bytes into plain text, per file format

#[cfg(test)]
mod tests;

use std::io::{Cursor, Read};
use std::panic::{AssertUnwindSafe, catch_unwind};

use calamine::{Data, Reader, Xlsx};
use quick_xml::events::Event;
use tracing::debug;
use zip::ZipArchive;

use crate::{QaError, Result};

/// Converts the raw bytes of one document into text.
pub trait TextExtractor: Send + Sync {
    /// `extension` is the file extension with or without the leading dot.
    fn extract(&self, bytes: &[u8], extension: &str) -> Result<String>;

    fn supported_extensions(&self) -> &[&str];
}

/// Built-in extractor for PDF, DOCX, XLSX, CSV and plain text files
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    #[inline]
    fn extract(&self, bytes: &[u8], extension: &str) -> Result<String> {
        let extension = normalize_extension(extension);

        let text = match extension.as_str() {
            ".pdf" => extract_pdf_text(bytes)?,
            ".docx" => extract_docx_text(bytes)?,
            ".xlsx" => extract_spreadsheet_text(bytes)?,
            ".csv" => extract_csv_text(bytes)?,
            ".txt" | ".md" => extract_plain_text(bytes),
            other => {
                return Err(QaError::Extraction(format!(
                    "unsupported document format: {:?}",
                    other
                )));
            }
        };

        debug!("Extracted {} chars from {} document", text.len(), extension);
        Ok(text)
    }

    #[inline]
    fn supported_extensions(&self) -> &[&str] {
        &[".pdf", ".docx", ".xlsx", ".csv", ".txt", ".md"]
    }
}

/// Lowercase extension of `filename` including the leading dot, or an empty
/// string when there is none
#[inline]
pub fn file_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Lowercase `extension` and make sure it starts with a dot
#[inline]
pub fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{}", trimmed.to_ascii_lowercase())
    }
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    // pdf_extract can panic on malformed input
    let result = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)));

    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(QaError::Extraction(format!("PDF extraction failed: {e}"))),
        Err(_) => Err(QaError::Extraction(
            "PDF extraction panicked (malformed PDF)".to_string(),
        )),
    }
}

fn extract_docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| QaError::Extraction(format!("Failed to open DOCX archive: {e}")))?;

    let xml_content = {
        let mut document_xml = archive
            .by_name("word/document.xml")
            .map_err(|e| QaError::Extraction(format!("Missing word/document.xml: {e}")))?;

        let mut content = String::new();
        document_xml
            .read_to_string(&mut content)
            .map_err(|e| QaError::Extraction(format!("Failed to read DOCX body: {e}")))?;
        content
    };

    let mut reader = quick_xml::Reader::from_str(&xml_content);
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                let fragment = e
                    .unescape()
                    .map_err(|e| QaError::Extraction(format!("Invalid DOCX text: {e}")))?;
                text.push_str(&fragment);
            }
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"w:p" => text.push('\n'),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(QaError::Extraction(format!("Malformed DOCX XML: {e}")));
            }
            _ => {}
        }
    }

    Ok(text)
}

fn extract_spreadsheet_text(bytes: &[u8]) -> Result<String> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| QaError::Extraction(format!("Failed to open spreadsheet: {e}")))?;

    let mut all_text = String::new();

    for sheet_name in workbook.sheet_names() {
        let Ok(range) = workbook.worksheet_range(&sheet_name) else {
            continue;
        };

        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_to_string).collect::<Vec<_>>())
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect::<Vec<_>>();

        if rows.is_empty() {
            continue;
        }

        all_text.push_str("## ");
        all_text.push_str(&sheet_name);
        all_text.push_str("\n\n");
        all_text.push_str(&markdown_table(&rows));
        all_text.push('\n');
    }

    Ok(all_text)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Error(e) => format!("#ERR:{e:?}"),
        Data::DateTime(dt) => dt.to_string(),
    }
}

fn extract_csv_text(bytes: &[u8]) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| QaError::Extraction(format!("Invalid CSV: {e}")))?;
        rows.push(record.iter().map(|f| f.trim().to_string()).collect::<Vec<_>>());
    }

    Ok(markdown_table(&rows))
}

fn extract_plain_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}')
        .unwrap_or(text.as_ref())
        .to_string()
}

/// Render rows as a markdown table, the first row being the header
fn markdown_table(rows: &[Vec<String>]) -> String {
    let Some(width) = rows.iter().map(Vec::len).max() else {
        return String::new();
    };
    if width == 0 {
        return String::new();
    }

    let render_row = |row: &[String]| {
        let cells = (0..width)
            .map(|i| row.get(i).map_or("", String::as_str).replace('|', "\\|"))
            .collect::<Vec<_>>();
        format!("| {} |\n", cells.join(" | "))
    };

    let mut table = render_row(&rows[0]);
    table.push('|');
    for _ in 0..width {
        table.push_str(" --- |");
    }
    table.push('\n');
    for row in &rows[1..] {
        table.push_str(&render_row(row));
    }
    table
}
