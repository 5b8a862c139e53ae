#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::{QaError, Result};

/// One row of the metadata table, describing the chunk at the same position
/// in the vector index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub source: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
}

impl ChunkRecord {
    #[inline]
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
            file_type: None,
            upload_date: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_upload_date(mut self, upload_date: impl Into<String>) -> Self {
        self.upload_date = Some(upload_date.into());
        self
    }
}

/// Distinct source filenames referenced by `rows`
#[inline]
pub fn sources(rows: &[ChunkRecord]) -> BTreeSet<String> {
    rows.iter().map(|row| row.source.clone()).collect()
}

/// Read the metadata table. A file that does not decode as a list of rows is
/// reported as [`QaError::CorruptIndexState`].
#[inline]
pub fn read_metadata(path: &Path) -> Result<Vec<ChunkRecord>> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        QaError::CorruptIndexState(format!("cannot decode {}: {e}", path.display()))
    })
}

#[inline]
pub fn write_metadata(path: &Path, rows: &[ChunkRecord]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, rows).map_err(std::io::Error::from)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}
