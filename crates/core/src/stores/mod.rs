pub mod chroma;
pub mod faiss;
pub mod flat;

pub use chroma::ChromaStore;
pub use faiss::FaissStore;
pub use flat::FlatIndex;

use crate::config::VectorStoreKind;
use crate::traits::VectorIndex;
use crate::SearchError;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Opens the persisted index of `kind`, or `None` when nothing was saved yet.
pub fn open_index(
    kind: VectorStoreKind,
    persist_directory: &Path,
) -> Result<Option<Box<dyn VectorIndex>>, SearchError> {
    Ok(match kind {
        VectorStoreKind::Chroma => {
            ChromaStore::load(persist_directory)?.map(|store| Box::new(store) as Box<dyn VectorIndex>)
        }
        VectorStoreKind::Faiss => {
            FaissStore::load(persist_directory)?.map(|store| Box::new(store) as Box<dyn VectorIndex>)
        }
    })
}

pub fn create_index(kind: VectorStoreKind, persist_directory: &Path) -> Box<dyn VectorIndex> {
    match kind {
        VectorStoreKind::Chroma => Box::new(ChromaStore::create(persist_directory)),
        VectorStoreKind::Faiss => Box::new(FaissStore::create(persist_directory)),
    }
}

pub fn purge_index(kind: VectorStoreKind, persist_directory: &Path) -> Result<(), SearchError> {
    match kind {
        VectorStoreKind::Chroma => ChromaStore::purge(persist_directory),
        VectorStoreKind::Faiss => FaissStore::purge(persist_directory),
    }
}

pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), SearchError> {
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, serde_json::to_vec(value)?)?;
    fs::rename(&staging, path)?;
    Ok(())
}
