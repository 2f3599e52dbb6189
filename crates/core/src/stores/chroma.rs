use super::{write_json_atomic, FlatIndex};
use crate::config::VectorStoreKind;
use crate::models::ScoredDocument;
use crate::traits::{IndexedRecord, VectorIndex};
use crate::SearchError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CHROMA_DIRECTORY: &str = "chroma";
pub const COLLECTION_FILE: &str = "collection.json";
const COLLECTION_NAME: &str = "documents";

/// [`FlatIndex`] saved as a Chroma-style collection: one JSON file under
/// `<persist>/chroma/collection.json`. Only the directory layout follows
/// Chroma; there is no Chroma client or server involved.
pub struct ChromaStore {
    directory: PathBuf,
    index: FlatIndex,
}

#[derive(Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    #[serde(flatten)]
    index: FlatIndex,
}

impl ChromaStore {
    pub fn create(persist_directory: &Path) -> Self {
        Self {
            directory: persist_directory.join(CHROMA_DIRECTORY),
            index: FlatIndex::default(),
        }
    }

    pub fn exists(persist_directory: &Path) -> bool {
        collection_path(persist_directory).is_file()
    }

    pub fn load(persist_directory: &Path) -> Result<Option<Self>, SearchError> {
        if !Self::exists(persist_directory) {
            return Ok(None);
        }

        let path = collection_path(persist_directory);

        let raw = fs::read_to_string(&path)?;
        let mut collection: CollectionFile =
            serde_json::from_str(&raw).map_err(|error| SearchError::BackendResponse {
                backend: VectorStoreKind::Chroma.to_string(),
                details: format!("{}: {error}", path.display()),
            })?;
        collection.index.reindex();

        info!(
            collection = %collection.name,
            records = collection.index.len(),
            "loaded chroma collection"
        );
        Ok(Some(Self {
            directory: persist_directory.join(CHROMA_DIRECTORY),
            index: collection.index,
        }))
    }

    /// Removes the persisted collection without opening it.
    pub fn purge(persist_directory: &Path) -> Result<(), SearchError> {
        let directory = persist_directory.join(CHROMA_DIRECTORY);
        if directory.exists() {
            fs::remove_dir_all(&directory)?;
        }
        Ok(())
    }
}

fn collection_path(persist_directory: &Path) -> PathBuf {
    persist_directory.join(CHROMA_DIRECTORY).join(COLLECTION_FILE)
}

impl VectorIndex for ChromaStore {
    fn backend(&self) -> VectorStoreKind {
        VectorStoreKind::Chroma
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn upsert(&mut self, records: Vec<IndexedRecord>) -> Result<(), SearchError> {
        let previous = self.index.clone();
        self.index.upsert(records)?;
        if let Err(error) = self.persist() {
            self.index = previous;
            return Err(error);
        }
        Ok(())
    }

    fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>, SearchError> {
        self.index.nearest(query_vector, k)
    }

    fn delete(&mut self, ids: &[String]) -> usize {
        self.index.delete(ids)
    }

    fn persist(&self) -> Result<(), SearchError> {
        fs::create_dir_all(&self.directory)?;
        let collection = CollectionFile {
            name: COLLECTION_NAME.to_string(),
            index: self.index.clone(),
        };
        write_json_atomic(&self.directory.join(COLLECTION_FILE), &collection)?;
        debug!(records = self.index.len(), "persisted chroma collection");
        Ok(())
    }

    fn delete_all(&mut self) -> Result<(), SearchError> {
        self.index.clear();
        if self.directory.exists() {
            fs::remove_dir_all(&self.directory)?;
        }
        Ok(())
    }
}
