//! Extraction Collaborator seam. The document extraction service is external: this module
//! owns its interface, the bounded worker pool that drives it, and the model-backed
//! implementation in `llm`.
//!
//! Each document is uploaded once, extracted for every requested category, then released,
//! whether extraction succeeded, failed or timed out. A failed extraction becomes an
//! `{"error": ...}` payload so the Join/Normalize layer sees it as an empty extraction
//! instead of aborting the batch.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::join::parse_extraction_text;
use crate::models::{Category, VariantLabel};
use crate::util::write_json_pretty;

pub mod llm;
pub mod prompts;

pub use llm::LlmExtractor;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("upload failed for {name}: {message}")]
    Upload { name: String, message: String },

    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("release failed for {id}: {message}")]
    Release { id: String, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

/// A document held by the extraction service for the duration of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub id: String,
    pub name: String,
}

/// The external extraction service. Implementations hold their own client.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<DocumentHandle, ExtractionError>;

    /// Returns the raw reply text (may carry citation markers and fences).
    async fn extract(
        &self,
        document: &DocumentHandle,
        instruction: &str,
    ) -> Result<String, ExtractionError>;

    async fn release(&self, document: &DocumentHandle) -> Result<(), ExtractionError>;
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub concurrency: usize,
    /// Bound on each upload, extraction and release call.
    pub timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timeout: Duration::from_secs(300),
        }
    }
}

fn error_payload(err: &ExtractionError) -> Value {
    json!({ "error": err.to_string() })
}

/// One upload, one extraction per category, one release.
async fn process_document(
    extractor: &dyn DocumentExtractor,
    path: &Path,
    categories: &[Category],
    timeout: Duration,
) -> BTreeMap<Category, Value> {
    let document = match tokio::time::timeout(timeout, extractor.upload(path)).await {
        Ok(Ok(document)) => document,
        Ok(Err(e)) => return categories.iter().map(|c| (*c, error_payload(&e))).collect(),
        Err(_) => {
            let e = ExtractionError::Timeout(timeout);
            return categories.iter().map(|c| (*c, error_payload(&e))).collect();
        }
    };

    let mut payloads = BTreeMap::new();
    for category in categories {
        let instruction = prompts::instruction_for(*category);
        let payload =
            match tokio::time::timeout(timeout, extractor.extract(&document, instruction)).await {
                Ok(Ok(text)) => parse_extraction_text(&text),
                Ok(Err(e)) => error_payload(&e),
                Err(_) => error_payload(&ExtractionError::Timeout(timeout)),
            };
        payloads.insert(*category, payload);
    }

    match tokio::time::timeout(timeout, extractor.release(&document)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(document = %document.id, error = %e, "failed to release uploaded document");
        }
        Err(_) => {
            warn!(document = %document.id, ?timeout, "release timed out, document left on the service");
        }
    }
    payloads
}

/// Extracts `categories` from every document with at most `options.concurrency`
/// documents in flight. Results are keyed by category, then by document file name.
pub async fn extract_batch(
    extractor: Arc<dyn DocumentExtractor>,
    documents: Vec<PathBuf>,
    categories: &[Category],
    options: BatchOptions,
) -> BTreeMap<Category, BTreeMap<String, Value>> {
    let total = documents.len();

    let results: Vec<(String, BTreeMap<Category, Value>)> = stream::iter(documents)
        .map(|path| {
            let extractor = extractor.clone();
            async move {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                debug!(document = %name, "extracting");
                let payloads =
                    process_document(extractor.as_ref(), &path, categories, options.timeout).await;
                for (category, payload) in &payloads {
                    if payload.get("error").is_some() {
                        warn!(document = %name, category = %category, "extraction returned an error payload");
                    }
                }
                (name, payloads)
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let mut by_category: BTreeMap<Category, BTreeMap<String, Value>> =
        categories.iter().map(|c| (*c, BTreeMap::new())).collect();
    for (name, payloads) in results {
        for (category, payload) in payloads {
            by_category.entry(category).or_default().insert(name.clone(), payload);
        }
    }

    info!(documents = total, categories = categories.len(), "extraction batch complete");
    by_category
}

/// Lists the PDF documents of one variant directory, sorted by name.
pub fn list_documents(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut documents: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| AppError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    documents.sort();
    Ok(documents)
}

/// Extracts every category for one variant directory into
/// `<output_dir>/<variant>_<category>.json`, the layout the join layer reads.
pub async fn extract_variant(
    extractor: Arc<dyn DocumentExtractor>,
    documents_dir: &Path,
    output_dir: &Path,
    variant: VariantLabel,
    options: BatchOptions,
) -> Result<(), AppError> {
    let documents = list_documents(documents_dir)?;
    if documents.is_empty() {
        warn!(path = %documents_dir.display(), "no PDF documents to extract");
        return Ok(());
    }

    let results = extract_batch(extractor, documents, &Category::ALL, options).await;
    for (category, payloads) in results {
        let file_name = format!("{}_{}.json", variant.as_str().to_lowercase(), category.as_str());
        write_json_pretty(&output_dir.join(file_name), &payloads)?;
    }
    Ok(())
}
