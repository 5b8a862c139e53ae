use super::*;
use tempfile::TempDir;

#[test]
fn optional_fields_are_omitted() {
    let row = ChunkRecord::new("a.txt", "hello");
    let json = serde_json::to_string(&row).expect("can serialize row");
    assert_eq!(json, r#"{"source":"a.txt","text":"hello"}"#);

    let row = row.with_file_type(".txt").with_upload_date("2026-10-18");
    let json = serde_json::to_string(&row).expect("can serialize row");
    assert!(json.contains(r#""file_type":".txt""#));
    assert!(json.contains(r#""upload_date":"2026-10-18""#));
}

#[test]
fn rows_without_optional_fields_parse() {
    let rows: Vec<ChunkRecord> =
        serde_json::from_str(r#"[{"source":"a.pdf","text":"x"}]"#).expect("rows parse");
    assert_eq!(rows, vec![ChunkRecord::new("a.pdf", "x")]);
}

#[test]
fn write_then_read_keeps_order() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("metadata.json");
    let rows = vec![
        ChunkRecord::new("b.pdf", "second").with_file_type(".pdf"),
        ChunkRecord::new("a.pdf", "first"),
        ChunkRecord::new("b.pdf", "third"),
    ];

    write_metadata(&path, &rows).expect("can write metadata");
    let read = read_metadata(&path).expect("can read metadata");
    assert_eq!(read, rows);

    let names = sources(&read);
    assert_eq!(names.len(), 2);
    assert!(names.contains("a.pdf"));
    assert!(names.contains("b.pdf"));
}

#[test]
fn invalid_json_is_corrupt() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("metadata.json");
    std::fs::write(&path, "{not json").expect("can write file");

    assert!(matches!(
        read_metadata(&path),
        Err(QaError::CorruptIndexState(_))
    ));
}
