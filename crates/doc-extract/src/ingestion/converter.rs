//! Local conversion of fetched documents into plain text

use async_trait::async_trait;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{ContentKind, DocumentReference, FetchedContent, IntermediateText};

/// Converts fetched bytes into the text handed to extraction
#[async_trait]
pub trait FormatConverter: Send + Sync {
    /// Convert one document
    ///
    /// A readable document with no text yields blank text, not an error;
    /// an unreadable container is [`Error::Conversion`].
    async fn convert(
        &self,
        reference: &DocumentReference,
        content: &FetchedContent,
    ) -> Result<IntermediateText>;
}

/// In-process converter for PDF, DOCX, HTML, text and markdown
#[derive(Debug, Clone)]
pub struct LocalConverter {
    pdf_timeout: Duration,
}

impl Default for LocalConverter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl LocalConverter {
    pub fn new(pdf_timeout: Duration) -> Self {
        Self { pdf_timeout }
    }

    /// Convert raw bytes of the given kind
    pub fn convert_bytes(
        &self,
        name: &str,
        kind: ContentKind,
        data: &[u8],
    ) -> Result<IntermediateText> {
        match kind {
            ContentKind::Pdf => self.convert_pdf(name, data).map(IntermediateText::plain),
            ContentKind::Docx => convert_docx(name, data).map(IntermediateText::plain),
            ContentKind::Html => convert_html(data).map(IntermediateText::plain),
            ContentKind::Text => Ok(IntermediateText::plain(String::from_utf8_lossy(data))),
            ContentKind::Markdown => Ok(IntermediateText::markdown(String::from_utf8_lossy(data))),
            ContentKind::Unknown => Err(Error::conversion(name, "unsupported content type")),
        }
    }

    fn convert_pdf(&self, name: &str, data: &[u8]) -> Result<String> {
        let text = match extract_pdf_with_timeout(data, self.pdf_timeout) {
            Ok(text) => text,
            Err(reason) => {
                tracing::warn!("[{}] pdf-extract failed ({}), trying fallback", name, reason);
                extract_pdf_fallback(name, data)?
            }
        };

        let text = cleanup_pdf_text(&text);
        if text.is_empty() {
            tracing::warn!("[{}] PDF has no extractable text (image-only?)", name);
        }
        Ok(text)
    }
}

#[async_trait]
impl FormatConverter for LocalConverter {
    async fn convert(
        &self,
        reference: &DocumentReference,
        content: &FetchedContent,
    ) -> Result<IntermediateText> {
        if content.kind.is_text() {
            return self.convert_bytes(&reference.name, content.kind, &content.data);
        }

        let converter = self.clone();
        let name = reference.name.clone();
        let kind = content.kind;
        let data = content.data.clone();

        tokio::task::spawn_blocking(move || converter.convert_bytes(&name, kind, &data))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}

/// Run pdf-extract on a separate thread so a pathological font cannot hang the run
fn extract_pdf_with_timeout(data: &[u8], timeout: Duration) -> std::result::Result<String, String> {
    let data_vec = data.to_vec();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let result = pdf_extract::extract_text_from_mem(&data_vec);
        let _ = tx.send(result.map_err(|e| e.to_string()));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(format!("timed out after {:?}", timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err("extraction thread panicked".to_string()),
    }
}

/// Page-by-page extraction with lopdf; also the final verdict on readability
fn extract_pdf_fallback(name: &str, data: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(data)
        .map_err(|e| Error::conversion(name, format!("unreadable PDF: {}", e)))?;

    let mut all_text = String::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) if !text.trim().is_empty() => {
                all_text.push_str(&text);
                all_text.push('\n');
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("[{}] No text on page {}: {}", name, page_number, e),
        }
    }

    Ok(all_text)
}

fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace('\u{00A0}', " ")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn convert_docx(name: &str, data: &[u8]) -> Result<String> {
    let doc = docx_rs::read_docx(data).map_err(|e| Error::conversion(name, e.to_string()))?;

    let mut content = String::new();
    for child in &doc.document.children {
        match child {
            docx_rs::DocumentChild::Paragraph(p) => {
                content.push_str(&paragraph_text(p));
                content.push('\n');
            }
            docx_rs::DocumentChild::Table(table) => {
                for docx_rs::TableChild::TableRow(row) in &table.rows {
                    let cells: Vec<String> = row
                        .cells
                        .iter()
                        .map(|docx_rs::TableRowChild::TableCell(cell)| {
                            cell.children
                                .iter()
                                .filter_map(|c| match c {
                                    docx_rs::TableCellContent::Paragraph(p) => {
                                        Some(paragraph_text(p))
                                    }
                                    _ => None,
                                })
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect();
                    content.push_str(&cells.join(" | "));
                    content.push('\n');
                }
            }
            _ => {}
        }
    }

    Ok(content)
}

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for child in &run.children {
                match child {
                    docx_rs::RunChild::Text(t) => text.push_str(&t.text),
                    docx_rs::RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}

fn convert_html(data: &[u8]) -> Result<String> {
    let html = String::from_utf8_lossy(data);
    let document = scraper::Html::parse_document(&html);
    let body_selector = scraper::Selector::parse("body")
        .map_err(|e| Error::internal(format!("Invalid selector: {:?}", e)))?;

    let mut content = String::new();
    if let Some(body) = document.select(&body_selector).next() {
        for text in body.text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !content.is_empty() {
                    content.push(' ');
                }
                content.push_str(trimmed);
            }
        }
    }

    Ok(content)
}
