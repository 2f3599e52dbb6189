use crate::models::ScoredDocument;
use crate::traits::IndexedRecord;
use crate::SearchError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Exact nearest-neighbour search over an in-memory record list. Every
/// on-disk layout in [`crate::stores`] wraps one of these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatIndex {
    dimensions: Option<usize>,
    records: Vec<IndexedRecord>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl FlatIndex {
    pub fn from_records(records: Vec<IndexedRecord>) -> Result<Self, SearchError> {
        let mut index = FlatIndex::default();
        index.upsert(records)?;
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn records(&self) -> &[IndexedRecord] {
        &self.records
    }

    /// Restores the id lookup after deserialisation.
    pub fn reindex(&mut self) {
        self.positions = self
            .records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.id.clone(), position))
            .collect();
    }

    /// Validates the whole batch before applying it, so a rejected batch
    /// leaves the index untouched.
    pub fn upsert(&mut self, records: Vec<IndexedRecord>) -> Result<(), SearchError> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let expected = self.dimensions.unwrap_or(first.embedding.len());

        for record in &records {
            if record.embedding.is_empty() {
                return Err(SearchError::Request(format!(
                    "record {} has no embedding",
                    record.id
                )));
            }
            if record.embedding.len() != expected {
                return Err(SearchError::Request(format!(
                    "embedding dimension {} != {}",
                    record.embedding.len(),
                    expected
                )));
            }
        }

        self.dimensions = Some(expected);
        for record in records {
            match self.positions.get(&record.id) {
                Some(&position) => self.records[position] = record,
                None => {
                    self.positions.insert(record.id.clone(), self.records.len());
                    self.records.push(record);
                }
            }
        }
        Ok(())
    }

    pub fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredDocument>, SearchError> {
        if let Some(expected) = self.dimensions {
            if query_vector.len() != expected {
                return Err(SearchError::Request(format!(
                    "query vector dim {} is not {}",
                    query_vector.len(),
                    expected
                )));
            }
        }

        let mut scored: Vec<ScoredDocument> = self
            .records
            .iter()
            .map(|record| ScoredDocument {
                document: record.document.clone(),
                score: squared_l2(&record.embedding, query_vector),
            })
            .collect();

        scored.sort_by(|left, right| left.score.total_cmp(&right.score));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn delete(&mut self, ids: &[String]) -> usize {
        let before = self.records.len();
        self.records.retain(|record| !ids.contains(&record.id));
        self.reindex();
        before - self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.positions.clear();
        self.dimensions = None;
    }
}

pub fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}
