use crate::error::IngestError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::models::{Document, PAGE_KEY};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "json"];

/// Extensions listed by directory scans. `docx` and `csv` are shown to the
/// user but not loaded.
pub const ADVERTISED_EXTENSIONS: [&str; 5] = ["pdf", "txt", "json", "docx", "csv"];

/// Leaf fields read as the value of a dated series entry, in priority order.
const SERIES_VALUE_KEYS: [&str; 3] = ["harga", "price", "value"];

pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn is_supported(path: &Path) -> bool {
    file_extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Every regular file under `folder`, recursively, sorted by path.
pub fn discover_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                debug!(error = %error, "skipping unreadable directory entry");
                continue;
            }
        };

        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
}

pub struct DocumentLoader<E = LopdfExtractor> {
    folder: PathBuf,
    extractor: E,
}

impl DocumentLoader<LopdfExtractor> {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self::with_extractor(folder, LopdfExtractor)
    }
}

impl<E: PdfExtractor> DocumentLoader<E> {
    pub fn with_extractor(folder: impl Into<PathBuf>, extractor: E) -> Self {
        Self {
            folder: folder.into(),
            extractor,
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn load_documents(&self) -> Result<Vec<Document>, IngestError> {
        Ok(self.load_report()?.documents)
    }

    /// Loads every supported file under the folder. A file that fails to
    /// parse is logged and reported, never fatal.
    pub fn load_report(&self) -> Result<LoadReport, IngestError> {
        if !self.folder.is_dir() {
            return Err(IngestError::DirectoryNotFound(self.folder.clone()));
        }

        info!(folder = %self.folder.display(), "loading documents");

        let mut report = LoadReport::default();
        for path in discover_files(&self.folder) {
            if !is_supported(&path) {
                debug!(path = %path.display(), "unsupported format, skipping");
                continue;
            }

            match self.load_file(&path) {
                Ok(documents) => {
                    debug!(path = %path.display(), count = documents.len(), "loaded file");
                    report.documents.extend(documents);
                }
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "failed to load file");
                    report.skipped_files.push(SkippedFile {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            documents = report.documents.len(),
            skipped = report.skipped_files.len(),
            "finished loading documents"
        );
        Ok(report)
    }

    pub fn load_file(&self, path: &Path) -> Result<Vec<Document>, IngestError> {
        let name = file_name(path)?;

        match file_extension(path).as_deref() {
            Some("pdf") => {
                let pages = self.extractor.extract_pages(path)?;
                Ok(pages
                    .into_iter()
                    .map(|page| {
                        Document::with_source(page.text, name.clone())
                            .with_metadata(PAGE_KEY, page.number)
                    })
                    .collect())
            }
            Some("txt") => Ok(vec![Document::with_source(read_utf8(path)?, name)]),
            Some("json") => {
                let raw = read_utf8(path)?;
                let data: Value = serde_json::from_str(&raw)?;
                Ok(vec![Document::with_source(flatten_json(&data), name)])
            }
            other => Err(IngestError::UnsupportedExtension(
                other.unwrap_or_default().to_string(),
            )),
        }
    }
}

fn file_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

fn read_utf8(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|error| IngestError::Decode {
        path: path.display().to_string(),
        details: error.to_string(),
    })
}

/// Turns a JSON document into plain sentences.
///
/// A `year -> month -> day -> detail` table becomes one price sentence per
/// day; anything else becomes one `path is value` line per scalar leaf.
pub fn flatten_json(data: &Value) -> String {
    let lines = flatten_dated_series(data).unwrap_or_else(|| {
        let mut lines = Vec::new();
        flatten_leaves(data, &mut Vec::new(), &mut lines);
        lines
    });

    lines.into_iter().map(|line| line + "\n").collect()
}

fn flatten_dated_series(data: &Value) -> Option<Vec<String>> {
    let mut lines = Vec::new();
    for (year, months) in data.as_object()? {
        for (month, days) in months.as_object()? {
            for (day, detail) in days.as_object()? {
                let detail = detail.as_object()?;
                let price = SERIES_VALUE_KEYS
                    .iter()
                    .find_map(|key| detail.get(*key))
                    .map(render_scalar)
                    .unwrap_or_else(|| "unknown".to_string());
                lines.push(format!("Price on {day}-{month}-{year} is {price}"));
            }
        }
    }
    Some(lines)
}

fn flatten_leaves(value: &Value, path: &mut Vec<String>, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(key.clone());
                flatten_leaves(child, path, lines);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push((index + 1).to_string());
                flatten_leaves(child, path, lines);
                path.pop();
            }
        }
        scalar if path.is_empty() => lines.push(render_scalar(scalar)),
        scalar => lines.push(format!("{} is {}", path.join(" "), render_scalar(scalar))),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
