//! Text chunking.
//!
//! Splits page texts into overlapping character windows. Windows advance
//! by `chunk_size - chunk_overlap` characters so consecutive chunks share
//! context, and a window that is followed by more text is trimmed back to
//! the last sentence ending in its final stretch.

use sha2::{Digest, Sha256};

use crate::config::AppConfig;
use crate::document::PageText;
use crate::errors::InitError;

#[derive(Debug, Clone)]
pub struct Chunk {
    /// Content hash, stable across runs for identical input.
    pub id: String,
    /// Page the chunk was cut from.
    pub page: u32,
    /// Ordinal of the chunk across the whole document.
    pub index: usize,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, InitError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(InitError::InvalidChunkConfig {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, InitError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Splits every page into overlapping windows.
    ///
    /// `source` is the document identifier mixed into chunk ids. Windows
    /// that trim down to nothing (whitespace runs) are skipped.
    pub fn split(&self, source: &str, pages: &[PageText]) -> Result<Vec<Chunk>, InitError> {
        let mut chunks = Vec::new();
        let mut index = 0usize;

        for page in pages {
            self.split_page(source, page, &mut index, &mut chunks);
        }

        if chunks.is_empty() {
            return Err(InitError::NoChunks);
        }
        Ok(chunks)
    }

    fn split_page(&self, source: &str, page: &PageText, index: &mut usize, out: &mut Vec<Chunk>) {
        let chars: Vec<char> = page.text.chars().collect();
        let total_chars = chars.len();
        if total_chars == 0 {
            return;
        }

        // new() guarantees overlap < size, so the step is always >= 1.
        let step = self.chunk_size - self.chunk_overlap;
        let mut start = 0;

        while start < total_chars {
            let end = (start + self.chunk_size).min(total_chars);
            let window: String = chars[start..end].iter().collect();

            let text = if end < total_chars {
                trim_to_sentence_boundary(&window)
            } else {
                &window
            };
            let text = text.trim();

            if !text.is_empty() {
                out.push(Chunk {
                    id: make_chunk_id(source, page.number, *index, text),
                    page: page.number,
                    index: *index,
                    content: text.to_string(),
                });
                *index += 1;
            }

            start += step;
        }
    }
}

/// Cuts the window after the last sentence ending found in its final 20%.
/// Returns the window unchanged when no ending is there.
fn trim_to_sentence_boundary(text: &str) -> &str {
    let sentence_endings = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    let mut search_start = (text.len() * 80) / 100;
    while search_start > 0 && !text.is_char_boundary(search_start) {
        search_start -= 1;
    }

    let tail = &text[search_start..];
    for ending in sentence_endings.iter() {
        if let Some(pos) = tail.rfind(ending) {
            return &text[..search_start + pos + ending.len()];
        }
    }

    text
}

fn make_chunk_id(source: &str, page: u32, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
