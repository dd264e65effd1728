//! Semantic Judge: a pluggable backend that decides whether a Variant
//! extraction is faithful to the Original under a policy.
//!
//! `RuleJudge` is deterministic and offline; `LlmJudge` sends the rendered policy and both
//! payloads to the model. `AppState` holds an `Arc<dyn SemanticJudge>`, chosen at startup.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::audit::compare::{compare, Elsewhere};
use crate::audit::policy::Policy;
use crate::audit::prompts::{judge_prompt, judge_system};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::{Entry, ErrorType};

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed judge response: {0}")]
    Malformed(String),
}

/// Everything a judge sees for one (Original, Variant) comparison.
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub cv_id: &'a str,
    pub original: &'a [Entry],
    pub variant: &'a [Entry],
    /// Entries from the other categories of both documents, for cross-section checks.
    pub elsewhere: Elsewhere<'a>,
    pub policy: &'a Policy,
}

/// A judge's answer before the engine applies its deterministic overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawVerdict {
    pub coherent: bool,
    #[serde(default, alias = "empty_extraction")]
    pub empty_list: bool,
    #[serde(default)]
    pub error_type: ErrorType,
    #[serde(default)]
    pub details: String,
}

impl RawVerdict {
    /// Rejects answers that contradict themselves. A coherent verdict drops any error type.
    pub fn validated(mut self) -> Result<Self, JudgeError> {
        if self.error_type == ErrorType::JudgeFailure {
            return Err(JudgeError::Malformed(
                "judge may not report an infrastructure failure".to_string(),
            ));
        }
        if self.coherent {
            self.error_type = ErrorType::None;
        } else if self.error_type == ErrorType::None {
            return Err(JudgeError::Malformed(
                "coherent=false without an error_type".to_string(),
            ));
        }
        Ok(self)
    }
}

#[async_trait]
pub trait SemanticJudge: Send + Sync {
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<RawVerdict, JudgeError>;

    /// Backend name recorded in reports.
    fn name(&self) -> &'static str;
}

/// Deterministic judge backed by the comparator. Fast, no network.
pub struct RuleJudge;

#[async_trait]
impl SemanticJudge for RuleJudge {
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<RawVerdict, JudgeError> {
        let comparison = compare(request.original, request.variant, request.elsewhere, request.policy);
        Ok(RawVerdict {
            coherent: comparison.is_coherent(),
            empty_list: request.variant.is_empty() && !request.original.is_empty(),
            error_type: comparison.error_type(),
            details: comparison.details(),
        })
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

/// Model judge. The policy is rendered into the prompt; the reply must be the verdict JSON.
pub struct LlmJudge {
    llm: LlmClient,
}

impl LlmJudge {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

fn entries_json(entries: &[Entry]) -> Result<Value, JudgeError> {
    serde_json::to_value(entries).map_err(|e| JudgeError::Malformed(e.to_string()))
}

fn context_json(entries: &[Entry]) -> Result<Option<Value>, JudgeError> {
    if entries.is_empty() {
        Ok(None)
    } else {
        entries_json(entries).map(Some)
    }
}

#[async_trait]
impl SemanticJudge for LlmJudge {
    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<RawVerdict, JudgeError> {
        let variant_name = request
            .policy
            .dimension
            .variant_label()
            .map(|l| l.as_str())
            .unwrap_or("Extraction");
        let original = entries_json(request.original)?;
        let variant = entries_json(request.variant)?;
        let variant_elsewhere = context_json(request.elsewhere.variant)?;
        let original_elsewhere = context_json(request.elsewhere.original)?;

        let prompt = judge_prompt(
            request.cv_id,
            variant_name,
            &request.policy.render_rules(),
            &original,
            &variant,
            variant_elsewhere.as_ref(),
            original_elsewhere.as_ref(),
        );

        let raw: RawVerdict = self.llm.call_json(&prompt, &judge_system()).await?;
        debug!(cv_id = %request.cv_id, coherent = raw.coherent, "model verdict received");
        raw.validated()
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}
