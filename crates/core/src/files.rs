use crate::error::IngestError;
use crate::loader::{discover_files, file_extension, ADVERTISED_EXTENSIONS};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

const DATA_DIRECTORIES: [&str; 6] = [
    "data/documents/pdf",
    "data/documents/json",
    "data/documents/txt",
    "data/documents/docx",
    "data/documents/csv",
    "data/vectorstore",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub size_formatted: String,
    pub modified: DateTime<Local>,
    /// Lowercased, with the leading dot (`.pdf`).
    pub extension: String,
}

/// Creates the data layout under `root` and returns the directories.
pub fn create_directory_structure(root: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut created = Vec::with_capacity(DATA_DIRECTORIES.len());
    for directory in DATA_DIRECTORIES {
        let path = root.join(directory);
        fs::create_dir_all(&path)?;
        created.push(path);
    }
    info!(root = %root.display(), "directory structure created");
    Ok(created)
}

pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", SIZE_UNITS[unit])
}

pub fn get_file_info(path: &Path) -> Option<FileInfo> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;

    Some(FileInfo {
        name: path.file_name()?.to_string_lossy().into_owned(),
        path: path.to_path_buf(),
        size: metadata.len(),
        size_formatted: format_file_size(metadata.len()),
        modified: DateTime::<Local>::from(modified),
        extension: file_extension(path)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default(),
    })
}

/// Files under `directory` with an advertised extension. A missing
/// directory yields nothing.
pub fn scan_documents_directory(directory: &Path) -> Vec<FileInfo> {
    if !directory.is_dir() {
        return Vec::new();
    }

    discover_files(directory)
        .into_iter()
        .filter(|path| {
            file_extension(path).is_some_and(|ext| ADVERTISED_EXTENSIONS.contains(&ext.as_str()))
        })
        .filter_map(|path| get_file_info(&path))
        .collect()
}

/// Copies `source` to `{backup_prefix}_backup_{YYYYmmdd_HHMMSS}`. Returns
/// `None` when there is nothing to back up.
pub fn backup_vector_store(
    source: &Path,
    backup_prefix: &Path,
) -> Result<Option<PathBuf>, IngestError> {
    if !source.exists() {
        warn!(source = %source.display(), "no vector store found to back up");
        return Ok(None);
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let target = PathBuf::from(format!("{}_backup_{timestamp}", backup_prefix.display()));

    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|error| IngestError::Io(error.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|error| IngestError::MissingFileName(error.to_string()))?;
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &destination)?;
        }
    }

    info!(backup = %target.display(), "vector store backed up");
    Ok(Some(target))
}

/// Format check only: `sk-` prefix and at least 20 characters.
pub fn validate_api_key(api_key: &str) -> bool {
    api_key.starts_with("sk-") && api_key.chars().count() >= 20
}

/// Roughly four characters per token.
pub fn count_tokens_approximate(text: &str) -> usize {
    text.chars().count() / 4
}

pub fn truncate_text(text: &str, max_length: usize) -> String {
    match text.char_indices().nth(max_length) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Replaces characters that are unsafe in file names and collapses dot runs.
pub fn clean_filename(filename: &str) -> Result<String, regex::Error> {
    let invalid = Regex::new(r#"[<>:"/\\|?*]"#)?;
    let dots = Regex::new(r"\.+")?;

    let replaced = invalid.replace_all(filename, "_");
    Ok(dots.replace_all(&replaced, ".").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_sizes_are_human_readable() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024 * 1024), "3072.0 GB");
    }

    #[test]
    fn scan_lists_advertised_extensions_only() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("pdf"))?;
        fs::write(dir.path().join("pdf").join("Guide.PDF"), b"%PDF")?;
        fs::write(dir.path().join("table.csv"), "a,b")?;
        fs::write(dir.path().join("notes.md"), "# skip")?;

        let files = scan_documents_directory(dir.path());
        let mut extensions: Vec<&str> = files.iter().map(|file| file.extension.as_str()).collect();
        extensions.sort();
        assert_eq!(extensions, vec![".csv", ".pdf"]);

        let guide = files
            .iter()
            .find(|file| file.name == "Guide.PDF")
            .ok_or("guide not listed")?;
        assert_eq!(guide.size, 4);
        assert_eq!(guide.size_formatted, "4.0 B");
        Ok(())
    }

    #[test]
    fn scanning_missing_directory_is_empty() {
        assert!(scan_documents_directory(Path::new("/no/such/dir")).is_empty());
    }

    #[test]
    fn backup_copies_tree_with_timestamp_suffix() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let source = dir.path().join("vectorstore");
        fs::create_dir_all(source.join("chroma"))?;
        fs::write(source.join("chroma").join("collection.json"), "{}")?;

        let backup = backup_vector_store(&source, &dir.path().join("snap"))?
            .ok_or("nothing backed up")?;
        let name = backup
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or("bad backup name")?;
        assert!(name.starts_with("snap_backup_"));
        assert_eq!(name.len(), "snap_backup_".len() + "YYYYmmdd_HHMMSS".len());
        assert_eq!(
            fs::read_to_string(backup.join("chroma").join("collection.json"))?,
            "{}"
        );
        Ok(())
    }

    #[test]
    fn backup_of_missing_store_is_none() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        assert!(backup_vector_store(&dir.path().join("absent"), &dir.path().join("b"))?.is_none());
        Ok(())
    }

    #[test]
    fn directory_structure_is_created() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let created = create_directory_structure(dir.path())?;
        assert_eq!(created.len(), 6);
        assert!(dir.path().join("data/documents/json").is_dir());
        assert!(dir.path().join("data/vectorstore").is_dir());
        Ok(())
    }

    #[test]
    fn api_key_format() {
        assert!(validate_api_key("sk-abcdefghijklmnopqrstu"));
        assert!(!validate_api_key("sk-short"));
        assert!(!validate_api_key("pk-abcdefghijklmnopqrstu"));
        assert!(!validate_api_key(""));
    }

    #[test]
    fn text_helpers() -> Result<(), regex::Error> {
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("abc", 3), "abc");
        assert_eq!(count_tokens_approximate("abcdefgh"), 2);
        assert_eq!(clean_filename(" a<b>..c?.txt ")?, "a_b_.c_.txt");
        Ok(())
    }
}
