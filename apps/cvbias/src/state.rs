use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::audit::engine::AuditEngine;
use crate::audit::judge::{LlmJudge, RuleJudge, SemanticJudge};
use crate::config::{Config, JudgeBackend};
use crate::llm_client::{self, LlmClient};

fn build_llm(config: &Config, purpose: &str) -> Result<LlmClient> {
    let api_key = config
        .anthropic_api_key
        .clone()
        .with_context(|| format!("ANTHROPIC_API_KEY is required for {purpose}"))?;
    LlmClient::new(api_key, config.judge_timeout).context("failed to build the HTTP client")
}

/// Run-scoped state handed to every command. There is no process-wide client.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Pluggable judge. Default: RuleJudge. Swap via CVBIAS_JUDGE=llm.
    pub judge: Arc<dyn SemanticJudge>,
}

impl AppState {
    pub fn from_config(config: Config) -> Result<Self> {
        let judge: Arc<dyn SemanticJudge> = match config.judge {
            JudgeBackend::Rules => Arc::new(RuleJudge),
            JudgeBackend::Llm => {
                let llm = build_llm(&config, "the llm judge")?;
                info!("LLM judge initialized (model: {})", llm_client::MODEL);
                Arc::new(LlmJudge::new(llm))
            }
        };
        Ok(Self { config, judge })
    }

    #[cfg(test)]
    pub fn with_judge(config: Config, judge: Arc<dyn SemanticJudge>) -> Self {
        Self { config, judge }
    }

    /// Model client for commands that always need it, whatever the judge backend.
    pub fn llm_client(&self, purpose: &str) -> Result<LlmClient> {
        build_llm(&self.config, purpose)
    }

    pub fn engine(&self) -> AuditEngine {
        AuditEngine::new(self.judge.clone(), self.config.judge_timeout)
    }
}
