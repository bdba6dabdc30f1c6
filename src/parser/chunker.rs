//! Sentence-aware chunking.
//!
//! Splitters are parameterized by `(chunk_size, chunk_overlap)` from the
//! task's RAG config and cached by that key, since building one is not
//! free and the same parameters recur across a tenant's ingests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use text_splitter::{ChunkConfig, TextSplitter};

use super::error::{ParserError, ParserResult};

/// Chunking parameters taken from the request's RAG config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkingParams {
    /// Target chunk size, characters.
    pub chunk_size: usize,
    /// Overlap between neighboring chunks, characters.
    pub chunk_overlap: usize,
}

impl ChunkingParams {
    /// Validates the pair.
    pub fn validate(&self) -> ParserResult<()> {
        if self.chunk_size == 0 {
            return Err(ParserError::InvalidChunking {
                reason: "chunk_size must be positive".to_string(),
            });
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ParserError::InvalidChunking {
                reason: format!(
                    "chunk_overlap {} must be smaller than chunk_size {}",
                    self.chunk_overlap, self.chunk_size
                ),
            });
        }
        Ok(())
    }
}

/// One split piece with its character offsets in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPiece {
    /// Piece text.
    pub content: String,
    /// First character index in the source.
    pub start_char_idx: usize,
    /// One past the last character index.
    pub end_char_idx: usize,
}

/// Cache of sentence-aware splitters keyed by their parameters.
#[derive(Default)]
pub struct SplitterCache {
    splitters: Mutex<HashMap<ChunkingParams, Arc<TextSplitter<text_splitter::Characters>>>>,
}

impl std::fmt::Debug for SplitterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitterCache")
            .field("cached", &self.splitters.lock().len())
            .finish()
    }
}

impl SplitterCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn splitter(
        &self,
        params: ChunkingParams,
    ) -> ParserResult<Arc<TextSplitter<text_splitter::Characters>>> {
        params.validate()?;

        if let Some(splitter) = self.splitters.lock().get(&params) {
            return Ok(Arc::clone(splitter));
        }

        let config = ChunkConfig::new(params.chunk_size)
            .with_overlap(params.chunk_overlap)
            .map_err(|e| ParserError::InvalidChunking {
                reason: e.to_string(),
            })?;
        let splitter = Arc::new(TextSplitter::new(config));
        self.splitters.lock().insert(params, Arc::clone(&splitter));
        Ok(splitter)
    }

    /// Splits `text` into pieces with character offsets.
    pub fn split(&self, text: &str, params: ChunkingParams) -> ParserResult<Vec<TextPiece>> {
        let splitter = self.splitter(params)?;

        // chunk_indices yields byte offsets; convert incrementally since
        // the offsets come back in ascending order.
        let mut pieces = Vec::new();
        let mut last_byte = 0;
        let mut last_char = 0;
        for (byte_offset, piece) in splitter.chunk_indices(text) {
            last_char += text[last_byte..byte_offset].chars().count();
            last_byte = byte_offset;

            let char_len = piece.chars().count();
            pieces.push(TextPiece {
                content: piece.to_string(),
                start_char_idx: last_char,
                end_char_idx: last_char + char_len,
            });
        }
        Ok(pieces)
    }
}
