use std::path::Path;

use async_trait::async_trait;

use crate::extraction::prompts::EXTRACTOR_SYSTEM;
use crate::extraction::{DocumentExtractor, DocumentHandle, ExtractionError};
use crate::llm_client::LlmClient;

/// Extraction through the model: the PDF is uploaded to the Files API once, referenced by
/// one message per category, then deleted.
pub struct LlmExtractor {
    llm: LlmClient,
}

impl LlmExtractor {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DocumentExtractor for LlmExtractor {
    async fn upload(&self, path: &Path) -> Result<DocumentHandle, ExtractionError> {
        let uploaded = self
            .llm
            .upload_file(path)
            .await
            .map_err(|e| ExtractionError::Upload {
                name: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(DocumentHandle {
            id: uploaded.id,
            name: uploaded.filename,
        })
    }

    async fn extract(&self, document: &DocumentHandle, instruction: &str) -> Result<String, ExtractionError> {
        let response = self
            .llm
            .call_with_document(&document.id, instruction, EXTRACTOR_SYSTEM)
            .await
            .map_err(|e| ExtractionError::Extract(e.to_string()))?;
        response
            .text()
            .map(str::to_string)
            .ok_or_else(|| ExtractionError::Extract(format!("empty reply for {}", document.name)))
    }

    async fn release(&self, document: &DocumentHandle) -> Result<(), ExtractionError> {
        self.llm
            .delete_file(&document.id)
            .await
            .map_err(|e| ExtractionError::Release {
                id: document.id.clone(),
                message: e.to_string(),
            })
    }
}
