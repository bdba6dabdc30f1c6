//! Document parsing: extraction, cleaning, and chunking.

pub mod chunk;
pub mod chunker;
pub mod clean;
pub mod error;
pub mod extract;


pub use chunk::{Chunk, DocumentContext};
pub use chunker::{ChunkingParams, SplitterCache, TextPiece};
pub use clean::normalize_text;
pub use error::{ParserError, ParserResult};
pub use extract::{
    DocumentSource, DocumentType, ExtractedText, TABLE_CLOSE, TABLE_OPEN, URL_FETCH_TIMEOUT,
    extract,
};

use serde_json::{Map, Value, json};

/// A document ready to be parsed.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    /// Display name, recorded on every chunk.
    pub document_name: String,
    /// Declared type, selects the extraction strategy.
    pub document_type: DocumentType,
    /// Body source.
    pub source: DocumentSource,
    /// Request-supplied metadata merged into every chunk.
    pub metadata: Map<String, Value>,
}

/// Parses documents into chunks.
///
/// Splitters are cached by `(chunk_size, chunk_overlap)`; one parser is
/// shared per service.
#[derive(Debug, Default)]
pub struct DocumentParser {
    splitters: SplitterCache,
}

impl DocumentParser {
    /// Creates a parser with an empty splitter cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts, cleans, and chunks one document under its hierarchy
    /// context.
    pub async fn parse(
        &self,
        input: &DocumentInput,
        context: &DocumentContext,
        params: ChunkingParams,
        max_bytes: u64,
    ) -> ParserResult<Vec<Chunk>> {
        let extracted = extract(input.document_type, &input.source, max_bytes).await?;

        let text = if extracted.is_markdown {
            extracted.text
        } else {
            normalize_text(&extracted.text)
        };
        let source_hash = blake3::hash(text.as_bytes()).to_hex().to_string();

        let pieces = self.splitters.split(&text, params)?;

        let chunks = pieces
            .into_iter()
            .enumerate()
            .map(|(index, piece)| {
                let mut chunk = Chunk::new(context, piece.content, index);

                let mut metadata = input.metadata.clone();
                let word_count = chunk.word_count();
                let own: Map<String, Value> = json!({
                    "document_name": input.document_name,
                    "document_type": input.document_type.as_str(),
                    "start_char_idx": piece.start_char_idx,
                    "end_char_idx": piece.end_char_idx,
                    "extraction_method": extracted.method,
                    "has_tables": extracted.has_tables,
                    "chunk_word_count": word_count,
                    "source_hash": source_hash,
                })
                .as_object()
                .cloned()
                .unwrap_or_default();
                metadata.extend(own);
                if let Some(pages) = extracted.page_count {
                    metadata.insert("page_count".to_string(), json!(pages));
                }
                chunk.metadata = metadata;
                chunk
            })
            .collect();

        Ok(chunks)
    }
}
