use crate::error::IngestError;
use crate::models::{Document, CHUNK_ID_KEY, CHUNK_SIZE_KEY};
use std::collections::VecDeque;
use tracing::info;

/// Separators tried in order: paragraph, line, word, character.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl From<&crate::config::Settings> for ChunkingConfig {
    fn from(value: &crate::config::Settings) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

/// Collapses every whitespace run into one space and trims both ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[derive(Debug, Clone)]
pub struct TextProcessor {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl TextProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        Self::with_config(ChunkingConfig {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn with_config(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            config,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Splits every document and numbers the resulting chunks across the
    /// whole batch.
    pub fn process_documents(&self, documents: &[Document]) -> Vec<Document> {
        info!(document_count = documents.len(), "processing documents");

        let mut chunks = Vec::new();
        for document in documents {
            for piece in self.split_text(&document.content) {
                chunks.push(Document {
                    content: piece,
                    metadata: document.metadata.clone(),
                });
            }
        }

        for (index, chunk) in chunks.iter_mut().enumerate() {
            let size = char_len(&chunk.content);
            chunk.metadata.insert(CHUNK_ID_KEY.to_string(), index.into());
            chunk.metadata.insert(CHUNK_SIZE_KEY.to_string(), size.into());
        }

        info!(chunk_count = chunks.len(), "created chunks");
        chunks
    }

    pub fn preprocess_document(&self, mut document: Document) -> Document {
        document.content = clean_text(&document.content);
        document
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];

        for (index, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                remaining = &separators[index + 1..];
                break;
            }
        }

        let splits = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for split in splits {
            if char_len(split) < self.config.chunk_size {
                pending.push(split);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_splits(&pending));
                pending.clear();
            }

            if remaining.is_empty() {
                chunks.push(split.to_string());
            } else {
                chunks.extend(self.split_recursive(split, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_splits(&pending));
        }

        chunks
    }

    /// Greedily packs pieces into chunks of at most `chunk_size` characters,
    /// seeding each new chunk with trailing pieces of the previous one whose
    /// total length does not exceed `chunk_overlap`.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let ChunkingConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let length = char_len(split);

            if total + length > chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);

                while total > chunk_overlap || (total + length > chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(split);
            total += length;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Splits `text` on `separator`, attaching each separator to the start of the
/// piece that follows it. An empty separator yields single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (position, _) in text.match_indices(separator) {
        if position > start {
            pieces.push(&text[start..position]);
        }
        start = position;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces.into_iter().filter(|piece| !piece.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(size: usize, overlap: usize) -> TextProcessor {
        TextProcessor::new(size, overlap).expect("valid chunking config")
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a   b  "), "a b");
        assert_eq!(clean_text("A  \t  lot\nof   spacing"), "A lot of spacing");
    }

    #[test]
    fn clean_text_is_idempotent() {
        let once = clean_text("  This   is    a    test   text.  ");
        assert_eq!(once, "This is a test text.");
        assert_eq!(clean_text(&once), once);
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        assert!(matches!(
            TextProcessor::new(10, 10),
            Err(IngestError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            TextProcessor::new(0, 0),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn short_text_stays_in_one_chunk() {
        let chunks = processor(100, 10).split_text("just a short note");
        assert_eq!(chunks, vec!["just a short note".to_string()]);
    }

    #[test]
    fn character_level_chunks_overlap_exactly() {
        let text: String = ('a'..='z').cycle().take(95).collect();
        let chunks = processor(20, 5).split_text(&text);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let previous: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            assert!(previous.len() <= 20);
            let tail: String = previous[previous.len() - 5..].iter().collect();
            let head: String = next[..5].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn word_level_chunks_do_not_split_words() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let chunks = processor(20, 8).split_text(text);
        let words: Vec<&str> = text.split(' ').collect();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20);
            for word in chunk.split(' ') {
                assert!(words.contains(&word), "chunk split a word: {chunk}");
            }
        }
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap_or_default();
            assert!(pair[1].starts_with(last_word));
        }
    }

    #[test]
    fn paragraphs_are_preferred_boundaries() {
        let text = "first paragraph here\n\nsecond paragraph here";
        let chunks = processor(25, 0).split_text(text);
        assert_eq!(
            chunks,
            vec![
                "first paragraph here".to_string(),
                "second paragraph here".to_string()
            ]
        );
    }

    #[test]
    fn process_documents_numbers_chunks_globally() {
        let documents = vec![
            Document::with_source("This is a test document. ".repeat(100), "test1.txt"),
            Document::with_source("Another test document. ".repeat(100), "test2.txt"),
        ];

        let chunks = processor(1000, 100).process_documents(&documents);
        assert!(chunks.len() > documents.len());

        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id(), Some(index as u64));
            assert_eq!(chunk.chunk_size(), Some(chunk.content.chars().count() as u64));
            assert!(chunk.source().is_some());
        }
        assert_eq!(chunks[0].source(), Some("test1.txt"));
        assert_eq!(chunks.last().and_then(Document::source), Some("test2.txt"));
    }

    #[test]
    fn chunking_is_deterministic() {
        let documents = vec![Document::with_source(
            "Line one.\nLine two is longer.\n\nA new paragraph with more words in it.",
            "notes.txt",
        )];
        let processor = processor(30, 10);
        assert_eq!(
            processor.process_documents(&documents),
            processor.process_documents(&documents)
        );
    }

    #[test]
    fn preprocess_cleans_content_and_keeps_metadata() {
        let document = Document::with_source("  spaced    out\n\ttext ", "a.txt");
        let cleaned = processor(100, 0).preprocess_document(document);
        assert_eq!(cleaned.content, "spaced out text");
        assert_eq!(cleaned.source(), Some("a.txt"));
    }

    #[test]
    fn separator_stays_with_following_piece() {
        assert_eq!(split_keeping_separator("a b c", " "), vec!["a", " b", " c"]);
        assert_eq!(split_keeping_separator(" a", " "), vec![" a"]);
        assert_eq!(split_keeping_separator("héllo", ""), vec!["h", "é", "l", "l", "o"]);
    }
}
