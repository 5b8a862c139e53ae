use super::*;

fn words(n: usize) -> String {
    (0..n)
        .map(|i| format!("w{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn empty_text_yields_no_chunks() {
    assert!(chunk_text("", 500, 50).expect("valid params").is_empty());
    assert!(
        chunk_text("  \n\t  ", 500, 50)
            .expect("valid params")
            .is_empty()
    );
}

#[test]
fn short_text_is_single_chunk() {
    let chunks = chunk_text("Hello   world.\nSecond line", 500, 50).expect("valid params");
    assert_eq!(chunks, vec!["Hello world. Second line".to_string()]);
}

#[test]
fn windows_slide_by_step() {
    let chunks = chunk_text(&words(10), 4, 1).expect("valid params");
    assert_eq!(
        chunks,
        vec![
            "w0 w1 w2 w3".to_string(),
            "w3 w4 w5 w6".to_string(),
            "w6 w7 w8 w9".to_string(),
            "w9".to_string(),
        ]
    );
}

#[test]
fn final_window_may_be_short() {
    let chunks = chunk_text(&words(7), 4, 1).expect("valid params");
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1], "w3 w4 w5 w6");
    assert_eq!(chunks[2], "w6");

    let chunks = chunk_text(&words(8), 4, 1).expect("valid params");
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[2], "w6 w7");
}

#[test]
fn every_start_below_word_count_opens_a_window() {
    // the window at 450 is made of overlap only
    let chunks = chunk_text(&words(500), 500, 50).expect("valid params");
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1], (450..500).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" "));

    let chunks = chunk_text(&words(10), 4, 2).expect("valid params");
    assert_eq!(
        chunks,
        vec![
            "w0 w1 w2 w3",
            "w2 w3 w4 w5",
            "w4 w5 w6 w7",
            "w6 w7 w8 w9",
            "w8 w9",
        ]
    );
}

#[test]
fn chunking_is_deterministic() {
    let text = "Hello world. ".repeat(2000);
    let first = chunk_text(&text, 500, 50).expect("valid params");
    let second = chunk_text(&text, 500, 50).expect("valid params");
    assert_eq!(first, second);
    assert_eq!(first.len(), 9);
}

#[test]
fn chunks_reconstruct_original_words() {
    let text = words(1234);
    let overlap = 37;
    let chunks = chunk_text(&text, 100, overlap).expect("valid params");

    let mut rebuilt: Vec<&str> = chunks[0].split(' ').collect();
    for chunk in &chunks[1..] {
        rebuilt.extend(chunk.split(' ').skip(overlap));
    }

    assert_eq!(rebuilt, text.split_whitespace().collect::<Vec<_>>());
}

#[test]
fn zero_overlap_partitions_words() {
    let chunks = chunk_text(&words(9), 3, 0).expect("valid params");
    assert_eq!(chunks, vec!["w0 w1 w2", "w3 w4 w5", "w6 w7 w8"]);
}

#[test]
fn overlap_not_smaller_than_length_is_rejected() {
    assert!(matches!(
        chunk_text("a b c", 5, 5),
        Err(QaError::InvalidChunking {
            max_length: 5,
            overlap: 5
        })
    ));
    assert!(matches!(
        chunk_text("a b c", 5, 9),
        Err(QaError::InvalidChunking { .. })
    ));
    assert!(matches!(
        chunk_text("", 0, 0),
        Err(QaError::InvalidChunking { .. })
    ));
}

#[test]
fn config_chunk_uses_its_parameters() {
    let config = ChunkingConfig {
        max_length: 2,
        overlap: 0,
    };
    assert_eq!(config.step().expect("valid config"), 2);
    assert_eq!(
        config.chunk("one two three").expect("valid config"),
        vec!["one two", "three"]
    );
}
