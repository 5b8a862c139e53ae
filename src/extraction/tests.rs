use std::io::Write;

use zip::write::SimpleFileOptions;

use super::*;

fn build_docx(document_xml: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer
        .start_file("word/document.xml", options)
        .expect("can start zip entry");
    writer
        .write_all(document_xml.as_bytes())
        .expect("can write zip entry");
    writer.finish().expect("can finish zip").into_inner()
}

#[test]
fn extension_helpers() {
    assert_eq!(file_extension("report.PDF"), ".pdf");
    assert_eq!(file_extension("archive.tar.gz"), ".gz");
    assert_eq!(file_extension("README"), "");
    assert_eq!(normalize_extension("PDF"), ".pdf");
    assert_eq!(normalize_extension(".Docx"), ".docx");
    assert_eq!(normalize_extension("  "), "");
}

#[test]
fn plain_text_is_passed_through() {
    let extractor = DocumentExtractor;
    let text = extractor
        .extract("\u{feff}Hello world.".as_bytes(), ".txt")
        .expect("text extracts");
    assert_eq!(text, "Hello world.");

    let text = extractor
        .extract(b"# Title\n\nBody", "md")
        .expect("markdown extracts");
    assert_eq!(text, "# Title\n\nBody");
}

#[test]
fn csv_becomes_markdown_table() {
    let extractor = DocumentExtractor;
    let text = extractor
        .extract(b"name,city\nAsha,Pune\nRavi,Delhi,extra\n", ".csv")
        .expect("csv extracts");

    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "| name | city |  |");
    assert_eq!(lines[1], "| --- | --- | --- |");
    assert_eq!(lines[2], "| Asha | Pune |  |");
    assert_eq!(lines[3], "| Ravi | Delhi | extra |");
}

#[test]
fn empty_csv_has_no_text() {
    let text = DocumentExtractor
        .extract(b"", ".csv")
        .expect("empty csv extracts");
    assert!(text.trim().is_empty());
}

#[test]
fn docx_paragraphs_become_lines() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Quarterly</w:t></w:r><w:r><w:t xml:space="preserve"> report &amp; summary</w:t></w:r></w:p>
    <w:p><w:r><w:t>Second</w:t><w:tab/><w:t>paragraph</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    let text = DocumentExtractor
        .extract(&build_docx(xml), ".docx")
        .expect("docx extracts");

    assert!(text.contains("Quarterly report & summary\n"));
    assert!(text.contains("Second\tparagraph\n"));
}

#[test]
fn docx_without_body_fails() {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("other.xml", SimpleFileOptions::default())
        .expect("can start zip entry");
    let bytes = writer.finish().expect("can finish zip").into_inner();

    let result = DocumentExtractor.extract(&bytes, ".docx");
    assert!(matches!(result, Err(QaError::Extraction(msg)) if msg.contains("word/document.xml")));
}

#[test]
fn malformed_binary_formats_fail() {
    let extractor = DocumentExtractor;
    for extension in [".pdf", ".docx", ".xlsx"] {
        let result = extractor.extract(b"definitely not a document", extension);
        assert!(
            matches!(result, Err(QaError::Extraction(_))),
            "{extension} should fail to extract"
        );
    }
}

#[test]
fn unsupported_formats_fail() {
    let result = DocumentExtractor.extract(b"\x89PNG", ".png");
    assert!(matches!(result, Err(QaError::Extraction(msg)) if msg.contains("unsupported")));

    let result = DocumentExtractor.extract(b"data", "");
    assert!(matches!(result, Err(QaError::Extraction(_))));
}

#[test]
fn supported_extensions_are_normalized() {
    for extension in DocumentExtractor.supported_extensions() {
        assert_eq!(normalize_extension(extension), *extension);
    }
}
