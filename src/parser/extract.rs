//! Format-specific text extraction.
//!
//! Stratified by declared document type: a structure-preserving primary
//! path per format with a plain-text fallback, raw reads for markdown
//! and text, an HTTP fetch for URLs, and passthrough for inline content.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{ParserError, ParserResult};

/// Timeout for URL fetches.
pub const URL_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("nooble-ingestion/", env!("CARGO_PKG_VERSION"));

/// Supported document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// PDF file.
    Pdf,
    /// Word document (OOXML).
    Docx,
    /// Markdown source.
    #[serde(alias = "markdown")]
    Md,
    /// Plain text.
    #[serde(alias = "text")]
    Txt,
    /// Remote page fetched over HTTP.
    Url,
}

impl DocumentType {
    /// Wire string for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Docx => "docx",
            DocumentType::Md => "md",
            DocumentType::Txt => "txt",
            DocumentType::Url => "url",
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentType::Pdf),
            "docx" => Ok(DocumentType::Docx),
            "md" | "markdown" => Ok(DocumentType::Md),
            "txt" | "text" => Ok(DocumentType::Txt),
            "url" => Ok(DocumentType::Url),
            other => Err(ParserError::UnsupportedType {
                document_type: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the document body comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Content passed through in the request.
    Inline(String),
    /// Spooled upload or local file.
    File(PathBuf),
    /// Remote page.
    Url(String),
}

/// Extraction result, before cleaning and chunking.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// The extracted text.
    pub text: String,
    /// Which strategy produced it.
    pub method: &'static str,
    /// Markdown output skips text normalization.
    pub is_markdown: bool,
    /// Tables were detected and preserved.
    pub has_tables: bool,
    /// Page count, when the format exposes one.
    pub page_count: Option<usize>,
}

impl ExtractedText {
    fn plain(text: String, method: &'static str) -> Self {
        Self {
            text,
            method,
            is_markdown: false,
            has_tables: false,
            page_count: None,
        }
    }
}

/// Extracts text for a declared type, enforcing the size cap before any
/// parsing work.
pub async fn extract(
    document_type: DocumentType,
    source: &DocumentSource,
    max_bytes: u64,
) -> ParserResult<ExtractedText> {
    match source {
        DocumentSource::Inline(content) => {
            check_size(document_type, content.len() as u64, max_bytes)?;
            Ok(ExtractedText {
                text: content.clone(),
                method: "inline",
                is_markdown: document_type == DocumentType::Md,
                has_tables: false,
                page_count: None,
            })
        }
        DocumentSource::Url(url) => {
            let body = fetch_url(url).await?;
            check_size(document_type, body.len() as u64, max_bytes)?;
            Ok(ExtractedText::plain(body, "url_fetch"))
        }
        DocumentSource::File(path) => {
            let metadata =
                tokio::fs::metadata(path)
                    .await
                    .map_err(|e| ParserError::FileRead {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?;
            check_size(document_type, metadata.len(), max_bytes)?;

            match document_type {
                DocumentType::Pdf => {
                    let bytes = read_file(path).await?;
                    // CPU-bound; keep it off the consumer loop.
                    tokio::task::spawn_blocking(move || extract_pdf(&bytes))
                        .await
                        .map_err(|e| ParserError::ExtractionFailed {
                            document_type: "pdf".to_string(),
                            message: e.to_string(),
                        })?
                }
                DocumentType::Docx => {
                    let bytes = read_file(path).await?;
                    tokio::task::spawn_blocking(move || extract_docx(&bytes))
                        .await
                        .map_err(|e| ParserError::ExtractionFailed {
                            document_type: "docx".to_string(),
                            message: e.to_string(),
                        })?
                }
                DocumentType::Md => {
                    let text = read_file_utf8(path).await?;
                    Ok(ExtractedText {
                        text,
                        method: "markdown_raw",
                        is_markdown: true,
                        has_tables: false,
                        page_count: None,
                    })
                }
                DocumentType::Txt => {
                    // Raw read, invalid UTF-8 replaced rather than fatal.
                    let bytes = read_file(path).await?;
                    Ok(ExtractedText::plain(
                        String::from_utf8_lossy(&bytes).into_owned(),
                        "text_raw",
                    ))
                }
                DocumentType::Url => Err(ParserError::NoContent),
            }
        }
    }
}

fn check_size(document_type: DocumentType, size_bytes: u64, limit_bytes: u64) -> ParserResult<()> {
    if size_bytes > limit_bytes {
        return Err(ParserError::FileTooLarge {
            document_type: document_type.to_string(),
            size_bytes,
            limit_bytes,
        });
    }
    Ok(())
}

async fn read_file(path: &PathBuf) -> ParserResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| ParserError::FileRead {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

async fn read_file_utf8(path: &PathBuf) -> ParserResult<String> {
    Ok(String::from_utf8_lossy(&read_file(path).await?).into_owned())
}

async fn fetch_url(url: &str) -> ParserResult<String> {
    let client = reqwest::Client::builder()
        .timeout(URL_FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ParserError::FetchFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| ParserError::FetchFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    response.text().await.map_err(|e| ParserError::FetchFailed {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// PDF extraction: markdown structuring over the embedded text, falling
/// back to the plain page text when structuring produces nothing.
pub fn extract_pdf(bytes: &[u8]) -> ParserResult<ExtractedText> {
    let raw = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        ParserError::ExtractionFailed {
            document_type: "pdf".to_string(),
            message: e.to_string(),
        }
    })?;

    // Form feeds separate pages in the extracted stream.
    let page_count = Some(raw.split('\u{c}').count());

    let (structured, has_tables) = structure_pdf_text(&raw);
    if structured.trim().is_empty() {
        debug!("pdf markdown structuring produced nothing, keeping raw text");
        let mut extracted = ExtractedText::plain(raw, "pdf_text");
        extracted.page_count = page_count;
        return Ok(extracted);
    }

    Ok(ExtractedText {
        text: structured,
        method: "pdf_markdown",
        is_markdown: true,
        has_tables,
        page_count,
    })
}

/// Rebuilds lightweight markdown from extracted PDF text: short
/// upper-case lines become headings, aligned multi-column lines become
/// pipe rows.
fn structure_pdf_text(raw: &str) -> (String, bool) {
    let mut out = String::with_capacity(raw.len());
    let mut has_tables = false;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            out.push('\n');
            continue;
        }

        if looks_like_heading(trimmed) {
            out.push_str("## ");
            out.push_str(trimmed);
        } else if let Some(row) = columns_to_pipe_row(trimmed) {
            has_tables = true;
            out.push_str(&row);
        } else {
            out.push_str(trimmed);
        }
        out.push('\n');
    }

    (out, has_tables)
}

fn looks_like_heading(line: &str) -> bool {
    let words = line.split_whitespace().count();
    words > 0
        && words <= 8
        && line.len() <= 64
        && !line.ends_with('.')
        && line
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
        && line.chars().any(|c| c.is_alphabetic())
}

fn columns_to_pipe_row(line: &str) -> Option<String> {
    // Two or more gaps of 3+ spaces mean columnar layout.
    let cells: Vec<&str> = line
        .split("   ")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    if cells.len() < 3 {
        return None;
    }
    Some(format!("| {} |", cells.join(" | ")))
}

/// Fence markers around extracted DOCX tables.
pub const TABLE_OPEN: &str = "[TABLE]";
/// Closing fence.
pub const TABLE_CLOSE: &str = "[/TABLE]";

/// DOCX extraction: structured paragraphs (headings become `#`-prefixed)
/// and fenced tables, with a tag-stripping fallback on malformed XML.
pub fn extract_docx(bytes: &[u8]) -> ParserResult<ExtractedText> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| {
        ParserError::ExtractionFailed {
            document_type: "docx".to_string(),
            message: format!("not a zip archive: {e}"),
        }
    })?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ParserError::ExtractionFailed {
            document_type: "docx".to_string(),
            message: format!("missing word/document.xml: {e}"),
        })?
        .read_to_string(&mut xml)
        .map_err(|e| ParserError::ExtractionFailed {
            document_type: "docx".to_string(),
            message: e.to_string(),
        })?;

    match extract_docx_structured(&xml) {
        Ok((text, has_tables)) => Ok(ExtractedText {
            text,
            method: "docx_structured",
            is_markdown: false,
            has_tables,
            page_count: None,
        }),
        Err(e) => {
            warn!(error = %e, "docx structured extraction failed, stripping tags");
            Ok(ExtractedText::plain(strip_xml_tags(&xml), "docx_plain"))
        }
    }
}

fn extract_docx_structured(xml: &str) -> Result<(String, bool), quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut has_tables = false;

    let mut in_table = false;
    let mut table_row: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut heading_level: usize = 0;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tbl" => {
                    in_table = true;
                    has_tables = true;
                    out.push_str(TABLE_OPEN);
                    out.push('\n');
                }
                b"w:tr" => table_row.clear(),
                b"w:tc" => paragraph.clear(),
                b"w:p" if !in_table => {
                    paragraph.clear();
                    heading_level = 0;
                }
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"w:pStyle" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"w:val" {
                        let style = String::from_utf8_lossy(&attr.value).into_owned();
                        heading_level = heading_level_of(&style);
                    }
                }
            }
            Event::Text(t) => {
                paragraph.push_str(&t.unescape()?);
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:tbl" => {
                    in_table = false;
                    out.push_str(TABLE_CLOSE);
                    out.push_str("\n\n");
                }
                b"w:tc" => {
                    table_row.push(paragraph.trim().to_string());
                    paragraph.clear();
                }
                b"w:tr" => {
                    out.push_str(&format!("| {} |\n", table_row.join(" | ")));
                    table_row.clear();
                }
                b"w:p" if !in_table => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        if heading_level > 0 {
                            out.push_str(&"#".repeat(heading_level));
                            out.push(' ');
                        }
                        out.push_str(text);
                        out.push_str("\n\n");
                    }
                    paragraph.clear();
                    heading_level = 0;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((out, has_tables))
}

fn heading_level_of(style: &str) -> usize {
    style
        .strip_prefix("Heading")
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| (1..=6).contains(n))
        .unwrap_or(0)
}

fn strip_xml_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len() / 4);
    let mut in_tag = false;
    for c in xml.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                if !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
