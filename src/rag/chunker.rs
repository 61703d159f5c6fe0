//! Fixed-size, overlapping character windows.
//!
//! Windows start every `chunk_size - overlap` characters. Every window but
//! the last of a page is exactly `chunk_size` long, so neighbours share
//! exactly `overlap` characters and the union of windows covers the page.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::config::ChunkingConfig;
use crate::core::errors::RagError;
use crate::document::Document;

/// A stored unit of retrieval. Metadata is scalar by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    /// Source identifier (uploaded filename).
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// Position of the chunk within the whole document.
    pub chunk_index: usize,
    /// Character offset within the page.
    pub start_offset: usize,
}

/// A window over borrowed text, offsets in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

impl TextSpan<'_> {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Chunking("chunk_size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(RagError::Chunking(format!(
                "overlap ({}) must be less than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, RagError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }

    /// Lazily windows `text`. Clone the iterator to restart it.
    pub fn spans<'a>(&self, text: &'a str) -> Spans<'a> {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());

        Spans {
            text,
            boundaries,
            chunk_size: self.chunk_size,
            step: self.step(),
            next_start: Some(0),
        }
    }

    /// Number of windows a text of `char_len` characters produces.
    pub fn expected_count(&self, char_len: usize) -> usize {
        if char_len == 0 {
            0
        } else if char_len <= self.chunk_size {
            1
        } else {
            1 + (char_len - self.chunk_size).div_ceil(self.step())
        }
    }

    /// Chunks every page of `document`, numbering chunks across pages.
    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for page in &document.pages {
            for span in self.spans(&page.text) {
                chunks.push(Chunk {
                    chunk_id: Uuid::new_v4().to_string(),
                    text: span.text.to_string(),
                    source: document.source.clone(),
                    page: page.number,
                    chunk_index: chunks.len(),
                    start_offset: span.start,
                });
            }
        }

        chunks
    }
}

/// Splits `text` into overlapping windows, validating the parameters.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TextSpan<'_>>, RagError> {
    Ok(Chunker::new(chunk_size, overlap)?.spans(text).collect())
}

#[derive(Debug, Clone)]
pub struct Spans<'a> {
    text: &'a str,
    /// Byte offset of every char, plus the text length.
    boundaries: Vec<usize>,
    chunk_size: usize,
    step: usize,
    next_start: Option<usize>,
}

impl<'a> Iterator for Spans<'a> {
    type Item = TextSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.boundaries.len() - 1;
        let start = self.next_start?;
        if start >= total {
            self.next_start = None;
            return None;
        }

        let end = (start + self.chunk_size).min(total);
        self.next_start = if end == total {
            None
        } else {
            Some(start + self.step)
        };

        Some(TextSpan {
            start,
            end,
            text: &self.text[self.boundaries[start]..self.boundaries[end]],
        })
    }
}
