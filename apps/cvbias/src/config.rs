use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Which `SemanticJudge` backend audits run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgeBackend {
    /// Deterministic comparator; no network.
    Rules,
    /// Model judge through `llm_client`.
    Llm,
}

impl JudgeBackend {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" => Ok(JudgeBackend::Rules),
            "llm" | "model" => Ok(JudgeBackend::Llm),
            other => bail!("CVBIAS_JUDGE must be 'rules' or 'llm', got '{other}'"),
        }
    }
}

/// Run configuration loaded from environment variables (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub judge: JudgeBackend,
    pub anthropic_api_key: Option<String>,
    pub judge_timeout: Duration,
    pub concurrency: usize,
    pub alpha: f64,
    /// Background noise rate in percent, measured by an A/A baseline.
    pub noise_rate_pct: f64,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            judge: JudgeBackend::Rules,
            anthropic_api_key: None,
            judge_timeout: Duration::from_secs(300),
            concurrency: 5,
            alpha: 0.05,
            noise_rate_pct: 0.0,
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();

        let judge = match lookup("CVBIAS_JUDGE") {
            Some(raw) => JudgeBackend::parse(&raw)?,
            None => defaults.judge,
        };
        let anthropic_api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty());
        if judge == JudgeBackend::Llm && anthropic_api_key.is_none() {
            bail!("Required environment variable 'ANTHROPIC_API_KEY' is not set (CVBIAS_JUDGE=llm)");
        }

        let judge_timeout = match lookup("CVBIAS_JUDGE_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .context("CVBIAS_JUDGE_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            None => defaults.judge_timeout,
        };
        let concurrency = match lookup("CVBIAS_CONCURRENCY") {
            Some(raw) => raw
                .parse::<usize>()
                .context("CVBIAS_CONCURRENCY must be a positive integer")?,
            None => defaults.concurrency,
        };
        if concurrency == 0 {
            bail!("CVBIAS_CONCURRENCY must be at least 1");
        }
        let alpha = match lookup("CVBIAS_ALPHA") {
            Some(raw) => raw.parse::<f64>().context("CVBIAS_ALPHA must be a number")?,
            None => defaults.alpha,
        };
        if !(alpha > 0.0 && alpha < 1.0) {
            bail!("CVBIAS_ALPHA must lie strictly between 0 and 1, got {alpha}");
        }
        let noise_rate_pct = match lookup("CVBIAS_NOISE_RATE_PCT") {
            Some(raw) => raw
                .parse::<f64>()
                .context("CVBIAS_NOISE_RATE_PCT must be a number")?,
            None => defaults.noise_rate_pct,
        };
        if !(0.0..=100.0).contains(&noise_rate_pct) {
            bail!("CVBIAS_NOISE_RATE_PCT must lie in [0, 100], got {noise_rate_pct}");
        }

        Ok(Config {
            judge,
            anthropic_api_key,
            judge_timeout,
            concurrency,
            alpha,
            noise_rate_pct,
            rust_log: lookup("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.judge, JudgeBackend::Rules);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.judge_timeout, Duration::from_secs(300));
        assert!((config.alpha - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_llm_judge_requires_api_key() {
        let err = Config::from_lookup(lookup_from(&[("CVBIAS_JUDGE", "llm")])).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));

        let config = Config::from_lookup(lookup_from(&[
            ("CVBIAS_JUDGE", "llm"),
            ("ANTHROPIC_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(config.judge, JudgeBackend::Llm);
    }

    #[test]
    fn test_rejects_out_of_range_alpha_and_zero_concurrency() {
        assert!(Config::from_lookup(lookup_from(&[("CVBIAS_ALPHA", "1.5")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("CVBIAS_CONCURRENCY", "0")])).is_err());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("CVBIAS_JUDGE_TIMEOUT_SECS", "30"),
            ("CVBIAS_CONCURRENCY", "2"),
            ("CVBIAS_NOISE_RATE_PCT", "0.33"),
        ]))
        .unwrap();
        assert_eq!(config.judge_timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 2);
        assert!((config.noise_rate_pct - 0.33).abs() < 1e-12);
    }
}
