use super::{write_json_atomic, FlatIndex};
use crate::config::VectorStoreKind;
use crate::models::{Document, ScoredDocument};
use crate::traits::{IndexedRecord, VectorIndex};
use crate::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const VECTORS_FILE: &str = "faiss_index.vectors.json";
pub const DOCSTORE_FILE: &str = "faiss_index.docstore.json";

/// [`FlatIndex`] saved FAISS-style, as a vector file plus a separate docstore
/// keyed by id. The files are JSON; no FAISS library is used.
pub struct FaissStore {
    directory: PathBuf,
    index: FlatIndex,
}

#[derive(Serialize, Deserialize)]
struct VectorFile {
    dimensions: Option<usize>,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl FaissStore {
    pub fn create(persist_directory: &Path) -> Self {
        Self {
            directory: persist_directory.to_path_buf(),
            index: FlatIndex::default(),
        }
    }

    pub fn exists(persist_directory: &Path) -> bool {
        persist_directory.join(VECTORS_FILE).is_file()
            && persist_directory.join(DOCSTORE_FILE).is_file()
    }

    pub fn load(persist_directory: &Path) -> Result<Option<Self>, SearchError> {
        if !Self::exists(persist_directory) {
            return Ok(None);
        }

        let vectors: VectorFile = read_json(&persist_directory.join(VECTORS_FILE))?;
        let mut docstore: BTreeMap<String, Document> =
            read_json(&persist_directory.join(DOCSTORE_FILE))?;

        if vectors.ids.len() != vectors.vectors.len() {
            return Err(corrupt(format!(
                "{} ids but {} vectors",
                vectors.ids.len(),
                vectors.vectors.len()
            )));
        }

        let mut records = Vec::with_capacity(vectors.ids.len());
        for (id, embedding) in vectors.ids.into_iter().zip(vectors.vectors) {
            let document = docstore
                .remove(&id)
                .ok_or_else(|| corrupt(format!("id {id} missing from docstore")))?;
            records.push(IndexedRecord {
                id,
                embedding,
                document,
            });
        }

        let index = FlatIndex::from_records(records)?;
        if let (Some(expected), Some(found)) = (vectors.dimensions, index.dimensions()) {
            if expected != found {
                return Err(corrupt(format!("header says {expected} dims, vectors have {found}")));
            }
        }

        info!(records = index.len(), "loaded faiss index");
        Ok(Some(Self {
            directory: persist_directory.to_path_buf(),
            index,
        }))
    }

    pub fn purge(persist_directory: &Path) -> Result<(), SearchError> {
        for name in [VECTORS_FILE, DOCSTORE_FILE] {
            let path = persist_directory.join(name);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SearchError> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|error| corrupt(format!("{}: {error}", path.display())))
}

fn corrupt(details: String) -> SearchError {
    SearchError::BackendResponse {
        backend: VectorStoreKind::Faiss.to_string(),
        details,
    }
}

impl VectorIndex for FaissStore {
    fn backend(&self) -> VectorStoreKind {
        VectorStoreKind::Faiss
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

        let records = self.index.records();
        let vectors = VectorFile {
            dimensions: self.index.dimensions(),
            ids: records.iter().map(|record| record.id.clone()).collect(),
            vectors: records.iter().map(|record| record.embedding.clone()).collect(),
        };
        let docstore: BTreeMap<&str, &Document> = records
            .iter()
            .map(|record| (record.id.as_str(), &record.document))
            .collect();

        write_json_atomic(&self.directory.join(DOCSTORE_FILE), &docstore)?;
        write_json_atomic(&self.directory.join(VECTORS_FILE), &vectors)?;
        debug!(records = records.len(), "persisted faiss index");
        Ok(())
    }

    fn delete_all(&mut self) -> Result<(), SearchError> {
        self.index.clear();
        Self::purge(&self.directory)
    }
}
