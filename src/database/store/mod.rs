
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::metadata::{self, ChunkRecord};
use super::vector_index::FlatIndex;
use crate::config::Config;
use crate::{QaError, Result};

const TEMP_SUFFIX: &str = "tmp";
const BACKUP_SUFFIX: &str = "bak";

/// Where the store keeps its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub index_file: PathBuf,
    pub metadata_file: PathBuf,
    pub documents_dir: PathBuf,
}

impl StorePaths {
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            index_file: config.index_file_path()?,
            metadata_file: config.metadata_file_path()?,
            documents_dir: config.documents_dir()?,
        })
    }

    /// The default layout below a single root directory
    #[inline]
    pub fn in_dir(root: &Path) -> Self {
        Self {
            index_file: root.join("index").join("vectors.bin"),
            metadata_file: root.join("index").join("metadata.json"),
            documents_dir: root.join("docs"),
        }
    }
}

/// Persisted index state as read from disk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedIndex {
    /// `None` when nothing has ever been indexed
    pub index: Option<FlatIndex>,
    pub metadata: Vec<ChunkRecord>,
}

impl LoadedIndex {
    #[inline]
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.as_ref().is_none_or(FlatIndex::is_empty) || self.metadata.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: usize,
    pub total: usize,
    pub dimension: Option<usize>,
}

/// Owner of the vector index, the metadata table and the raw document store.
///
/// The index and metadata files are only ever read and written together.
/// Readers (`load`, dedup checks) share the lock; `merge`, `reset` and
/// document writes take it exclusively, so no mutation can interleave
/// between reading the current state and persisting the new one.
#[derive(Debug)]
pub struct IndexStore {
    paths: StorePaths,
    lock: RwLock<()>,
}

impl IndexStore {
    #[inline]
    pub fn new(paths: StorePaths) -> Self {
        Self {
            paths,
            lock: RwLock::new(()),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(StorePaths::from_config(config)?))
    }

    #[inline]
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Read the persisted index and metadata.
    ///
    /// Returns an absent index and an empty table when nothing is persisted.
    /// One file without the other, an undecodable file, or differing element
    /// counts are reported as [`QaError::CorruptIndexState`].
    #[inline]
    pub async fn load(&self) -> Result<LoadedIndex> {
        let _guard = self.lock.read().await;
        self.load_unlocked()
    }

    /// Append `vectors` and the positionally matching `rows`, then persist
    /// both files.
    ///
    /// Nothing is written when the counts differ or any vector does not match
    /// the index dimension. An empty batch is a no-op.
    #[inline]
    pub async fn merge(
        &self,
        vectors: &[Vec<f32>],
        rows: Vec<ChunkRecord>,
    ) -> Result<MergeSummary> {
        if vectors.len() != rows.len() {
            return Err(QaError::MisalignedMerge {
                vectors: vectors.len(),
                rows: rows.len(),
            });
        }

        let _guard = self.lock.write().await;
        let LoadedIndex {
            index,
            mut metadata,
        } = self.load_unlocked()?;

        let Some(first) = vectors.first() else {
            return Ok(MergeSummary {
                added: 0,
                total: metadata.len(),
                dimension: index.as_ref().map(FlatIndex::dimension),
            });
        };

        let mut index = match index {
            Some(index) => index,
            None => {
                debug!("Creating index with dimension {}", first.len());
                FlatIndex::new(first.len())?
            }
        };

        if let Err(e) = index.add(vectors) {
            error!("Refusing merge of {} vectors: {}", vectors.len(), e);
            return Err(e);
        }
        metadata.extend(rows);

        self.persist(&index, &metadata)?;

        info!(
            "Merged {} chunks into index ({} total, dimension {})",
            vectors.len(),
            index.len(),
            index.dimension()
        );

        Ok(MergeSummary {
            added: vectors.len(),
            total: index.len(),
            dimension: Some(index.dimension()),
        })
    }

    /// Delete the index, the metadata table and every stored document
    #[inline]
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.lock.write().await;

        for path in [
            &self.paths.index_file,
            &self.paths.metadata_file,
            &temp_path(&self.paths.index_file),
            &temp_path(&self.paths.metadata_file),
            &backup_path(&self.paths.index_file),
        ] {
            remove_if_exists(path)?;
        }

        match fs::remove_dir_all(&self.paths.documents_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.paths.documents_dir)?;

        info!("Index, metadata and document store cleared");
        Ok(())
    }

    /// Whether `filename` is already part of the corpus, either as a source in
    /// the metadata table or as a file in the document store
    #[inline]
    pub async fn is_indexed(&self, filename: &str) -> Result<bool> {
        Ok(self.indexed_documents().await?.contains(filename))
    }

    /// Every filename that counts as already indexed
    #[inline]
    pub async fn indexed_documents(&self) -> Result<BTreeSet<String>> {
        let _guard = self.lock.read().await;
        let loaded = self.load_unlocked()?;
        let mut names = metadata::sources(&loaded.metadata);
        names.extend(self.list_documents_unlocked()?);
        Ok(names)
    }

    /// Write the raw bytes of an uploaded document
    #[inline]
    pub async fn store_document(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        validate_filename(filename)?;
        let _guard = self.lock.write().await;

        fs::create_dir_all(&self.paths.documents_dir)?;
        let path = self.paths.documents_dir.join(filename);
        fs::write(&path, bytes)?;

        debug!("Stored {} ({} bytes)", filename, bytes.len());
        Ok(path)
    }

    /// Remove a stored document; a missing file is not an error
    #[inline]
    pub async fn remove_document(&self, filename: &str) -> Result<()> {
        validate_filename(filename)?;
        let _guard = self.lock.write().await;

        remove_if_exists(&self.paths.documents_dir.join(filename))?;
        debug!("Removed stored document {}", filename);
        Ok(())
    }

    /// Names of the stored documents, sorted
    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read().await;
        self.list_documents_unlocked()
    }

    /// The persisted index together with the stored document names, both read
    /// under one lock so they describe the same moment
    #[inline]
    pub async fn load_with_documents(&self) -> Result<(LoadedIndex, Vec<String>)> {
        let _guard = self.lock.read().await;
        let loaded = self.load_unlocked()?;
        let documents = self.list_documents_unlocked()?;
        Ok((loaded, documents))
    }

    /// Delete those of `candidates` that still have no rows in the metadata
    /// table, returning the names actually removed
    #[inline]
    pub async fn remove_unindexed_documents(&self, candidates: &[String]) -> Result<Vec<String>> {
        let _guard = self.lock.write().await;
        let indexed = metadata::sources(&self.load_unlocked()?.metadata);

        let mut removed = Vec::new();
        for filename in candidates {
            if indexed.contains(filename) {
                debug!("Keeping {}: indexed since the report was taken", filename);
                continue;
            }
            validate_filename(filename)?;
            remove_if_exists(&self.paths.documents_dir.join(filename))?;
            removed.push(filename.clone());
        }
        Ok(removed)
    }

    fn load_unlocked(&self) -> Result<LoadedIndex> {
        let index_path = &self.paths.index_file;
        let metadata_path = &self.paths.metadata_file;

        match (index_path.exists(), metadata_path.exists()) {
            (false, false) => {
                debug!("No persisted index at {:?}", index_path);
                Ok(LoadedIndex::default())
            }
            (true, false) => Err(QaError::CorruptIndexState(format!(
                "index file {} exists without metadata file {}",
                index_path.display(),
                metadata_path.display()
            ))),
            (false, true) => Err(QaError::CorruptIndexState(format!(
                "metadata file {} exists without index file {}",
                metadata_path.display(),
                index_path.display()
            ))),
            (true, true) => {
                let index = FlatIndex::load(index_path)?;
                let metadata = metadata::read_metadata(metadata_path)?;

                if index.len() != metadata.len() {
                    return Err(QaError::CorruptIndexState(format!(
                        "index holds {} vectors but metadata holds {} rows",
                        index.len(),
                        metadata.len()
                    )));
                }

                Ok(LoadedIndex {
                    index: Some(index),
                    metadata,
                })
            }
        }
    }

    /// Write both files to temporaries, then move them into place. If either
    /// write or either move fails the previously persisted pair is left
    /// untouched.
    fn persist(&self, index: &FlatIndex, metadata: &[ChunkRecord]) -> Result<()> {
        if let Some(parent) = self.paths.index_file.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(parent) = self.paths.metadata_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let index_tmp = temp_path(&self.paths.index_file);
        let metadata_tmp = temp_path(&self.paths.metadata_file);

        let written = index
            .save(&index_tmp)
            .and_then(|()| metadata::write_metadata(&metadata_tmp, metadata));
        if let Err(e) = written {
            error!("Failed to write index state: {}", e);
            discard_files(&[index_tmp.as_path(), metadata_tmp.as_path()]);
            return Err(e);
        }

        commit_pair(
            (index_tmp.as_path(), self.paths.index_file.as_path()),
            (metadata_tmp.as_path(), self.paths.metadata_file.as_path()),
        )
    }

    fn list_documents_unlocked(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.paths.documents_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Reject names that would escape the document store or cannot be a plain
/// file name
#[inline]
pub fn validate_filename(filename: &str) -> Result<()> {
    let invalid = filename.trim().is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);

    if invalid {
        return Err(QaError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Move `index.0` onto `index.1`, then `metadata.0` onto `metadata.1`.
///
/// The current index file is linked (or copied) to a backup first. When the
/// metadata move fails the backup is put back, or the new index removed if
/// there was none, so the pair on disk never mixes two generations.
fn commit_pair(index: (&Path, &Path), metadata: (&Path, &Path)) -> Result<()> {
    let (index_tmp, index_file) = index;
    let (metadata_tmp, metadata_file) = metadata;
    let backup = backup_path(index_file);

    remove_if_exists(&backup)?;
    let had_index = match fs::hard_link(index_file, &backup) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            debug!("Could not link {:?} ({}), copying instead", index_file, e);
            fs::copy(index_file, &backup)?;
            true
        }
    };

    if let Err(e) = fs::rename(index_tmp, index_file) {
        error!("Failed to move {:?} into place: {}", index_file, e);
        discard_files(&[index_tmp, metadata_tmp, backup.as_path()]);
        return Err(e.into());
    }

    if let Err(e) = fs::rename(metadata_tmp, metadata_file) {
        error!(
            "Failed to move {:?} into place, restoring previous index: {}",
            metadata_file, e
        );
        let restored = if had_index {
            fs::rename(&backup, index_file)
        } else {
            fs::remove_file(index_file)
        };
        if let Err(restore) = restored {
            error!("Failed to restore {:?}: {}", index_file, restore);
        }
        discard_files(&[metadata_tmp, backup.as_path()]);
        return Err(e.into());
    }

    discard_files(&[backup.as_path()]);
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    suffixed_path(path, TEMP_SUFFIX)
}

fn backup_path(path: &Path) -> PathBuf {
    suffixed_path(path, BACKUP_SUFFIX)
}

fn suffixed_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Best-effort removal; failures are only logged
fn discard_files(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = remove_if_exists(path) {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
