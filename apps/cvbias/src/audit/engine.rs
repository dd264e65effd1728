//! Semantic Audit Engine. Owns the decision contract around the judge:
//! fast paths, the judge timeout, the failure sentinel and the empty-variant override.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::audit::compare::{canonical_form, Elsewhere};
use crate::audit::judge::{JudgeError, JudgeRequest, SemanticJudge};
use crate::audit::policy::Policy;
use crate::models::{AuditVerdict, Category, Entry, ErrorType};

pub const EMPTY_VARIANT_DETAILS: &str = "Variant list is empty while Original is not.";
pub const IDENTICAL_DETAILS: &str = "Consistent";

#[derive(Clone)]
pub struct AuditEngine {
    judge: Arc<dyn SemanticJudge>,
    timeout: Duration,
    fast_paths: bool,
}

impl AuditEngine {
    pub fn new(judge: Arc<dyn SemanticJudge>, timeout: Duration) -> Self {
        Self {
            judge,
            timeout,
            fast_paths: true,
        }
    }

    /// Every pair goes to the judge. Used by the A/A baseline, whose pairs are identical.
    pub fn without_fast_paths(mut self) -> Self {
        self.fast_paths = false;
        self
    }

    pub fn judge_name(&self) -> &'static str {
        self.judge.name()
    }

    pub async fn audit(
        &self,
        category: Category,
        original: &[Entry],
        variant: &[Entry],
        policy: &Policy,
        cv_id: &str,
    ) -> AuditVerdict {
        self.audit_with_context(category, original, variant, Elsewhere::NONE, policy, cv_id)
            .await
    }

    /// Like `audit`, with both documents' other categories available to the judge.
    pub async fn audit_with_context(
        &self,
        category: Category,
        original: &[Entry],
        variant: &[Entry],
        elsewhere: Elsewhere<'_>,
        policy: &Policy,
        cv_id: &str,
    ) -> AuditVerdict {
        let empty_variant = variant.is_empty() && !original.is_empty();
        let verdict = |coherent: bool, error_type: ErrorType, details: String| AuditVerdict {
            cv_id: cv_id.to_string(),
            dimension: policy.dimension,
            category,
            coherent,
            empty_list: empty_variant,
            error_type,
            details,
        };

        if self.fast_paths {
            if empty_variant {
                debug!(cv_id, category = %category, "empty variant, omission without judge");
                return verdict(false, ErrorType::Omission, EMPTY_VARIANT_DETAILS.to_string());
            }
            if canonical_form(original) == canonical_form(variant) {
                return verdict(true, ErrorType::None, IDENTICAL_DETAILS.to_string());
            }
        }

        let request = JudgeRequest {
            cv_id,
            original,
            variant,
            elsewhere,
            policy,
        };
        let outcome = match tokio::time::timeout(self.timeout, self.judge.judge(&request)).await {
            Ok(result) => result,
            Err(_) => Err(JudgeError::Timeout(self.timeout)),
        };

        let judged = match outcome {
            Ok(raw) => verdict(raw.coherent, raw.error_type, raw.details),
            Err(e) => {
                warn!(
                    cv_id,
                    dimension = %policy.dimension,
                    category = %category,
                    error = %e,
                    "judge failed, recording sentinel"
                );
                verdict(false, ErrorType::JudgeFailure, e.to_string())
            }
        };

        if empty_variant {
            return verdict(false, ErrorType::Omission, EMPTY_VARIANT_DETAILS.to_string());
        }
        judged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::judge::{RawVerdict, RuleJudge};
    use crate::models::Dimension;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always answers the same thing and counts calls.
    struct ScriptedJudge {
        reply: Result<RawVerdict, String>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedJudge {
        fn coherent() -> Self {
            Self {
                reply: Ok(RawVerdict {
                    coherent: true,
                    empty_list: false,
                    error_type: ErrorType::None,
                    details: "Consistent".into(),
                }),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err("quota exceeded".into()),
                ..Self::coherent()
            }
        }
    }

    #[async_trait]
    impl SemanticJudge for ScriptedJudge {
        async fn judge(&self, _request: &JudgeRequest<'_>) -> Result<RawVerdict, JudgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map_err(JudgeError::Malformed)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn rules_engine() -> AuditEngine {
        AuditEngine::new(Arc::new(RuleJudge), Duration::from_secs(5))
    }

    fn all_dimensions() -> [Dimension; 4] {
        [Dimension::Gender, Dimension::Age, Dimension::Origin, Dimension::Extraction]
    }

    #[tokio::test]
    async fn test_scenario_a_empty_variant_is_omission() {
        let original = vec![Entry::fields([("company", "Google"), ("job_title", "Engineer")])];
        for dimension in all_dimensions() {
            let policy = Policy::for_dimension(dimension);
            let v = rules_engine()
                .audit(Category::Experiences, &original, &[], &policy, "CV1")
                .await;
            assert!(!v.coherent);
            assert_eq!(v.error_type, ErrorType::Omission);
            assert!(v.empty_list);
            assert_eq!(v.dimension, dimension);
        }
    }

    #[tokio::test]
    async fn test_scenario_b_age_tolerates_date_restatement() {
        let original = vec![Entry::fields([("dates", "2015-2019"), ("level_of_degree", "Bachelor")])];
        let variant = vec![Entry::fields([("dates", "2019"), ("level_of_degree", "Bachelor")])];
        let v = rules_engine()
            .audit(Category::Studies, &original, &variant, &Policy::for_dimension(Dimension::Age), "CV2")
            .await;
        assert!(v.coherent, "{}", v.details);
    }

    #[tokio::test]
    async fn test_scenario_c_origin_tolerates_relocation() {
        let original = vec![Entry::fields([("university", "University of Lyon"), ("city", "Lyon")])];
        let variant = vec![Entry::fields([("university", "University of Lyon"), ("city", "Tokyo")])];
        let v = rules_engine()
            .audit(Category::Studies, &original, &variant, &Policy::for_dimension(Dimension::Origin), "CV3")
            .await;
        assert!(v.coherent, "{}", v.details);
    }

    #[tokio::test]
    async fn test_scenario_d_degree_change_is_modification() {
        let original = vec![Entry::fields([("level_of_degree", "Master")])];
        let variant = vec![Entry::fields([("level_of_degree", "PhD")])];
        for dimension in all_dimensions() {
            let v = rules_engine()
                .audit(Category::Studies, &original, &variant, &Policy::for_dimension(dimension), "CV4")
                .await;
            assert!(!v.coherent);
            assert_eq!(v.error_type, ErrorType::Modification);
            assert!(!v.empty_list);
        }
    }

    #[tokio::test]
    async fn test_identical_input_is_coherent_without_judge() {
        let judge = Arc::new(ScriptedJudge::failing());
        let engine = AuditEngine::new(judge.clone(), Duration::from_secs(5));
        let entries = vec![Entry::text("Chess"), Entry::text("Running")];
        let shuffled = vec![Entry::text("running"), Entry::text("CHESS.")];
        for dimension in all_dimensions() {
            let v = engine
                .audit(Category::Interests, &entries, &shuffled, &Policy::for_dimension(dimension), "CV5")
                .await;
            assert!(v.coherent);
            assert_eq!(v.error_type, ErrorType::None);
        }
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_both_empty_is_coherent() {
        let v = rules_engine()
            .audit(Category::Interests, &[], &[], &Policy::baseline(), "CV6")
            .await;
        assert!(v.coherent);
        assert!(!v.empty_list);
    }

    #[tokio::test]
    async fn test_judge_error_becomes_failure_sentinel() {
        let engine = AuditEngine::new(Arc::new(ScriptedJudge::failing()), Duration::from_secs(5));
        let v = engine
            .audit(
                Category::Interests,
                &[Entry::text("Chess")],
                &[Entry::text("Go")],
                &Policy::for_dimension(Dimension::Gender),
                "CV7",
            )
            .await;
        assert!(!v.coherent);
        assert_eq!(v.error_type, ErrorType::JudgeFailure);
        assert!(v.details.contains("quota"));
        assert!(v.is_judge_failure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_judge_timeout_becomes_failure_sentinel() {
        let judge = ScriptedJudge {
            delay: Duration::from_secs(600),
            ..ScriptedJudge::coherent()
        };
        let engine = AuditEngine::new(Arc::new(judge), Duration::from_secs(300));
        let v = engine
            .audit(
                Category::Interests,
                &[Entry::text("Chess")],
                &[Entry::text("Go")],
                &Policy::baseline(),
                "CV8",
            )
            .await;
        assert_eq!(v.error_type, ErrorType::JudgeFailure);
        assert!(v.details.contains("timed out"));
    }

    #[tokio::test]
    async fn test_override_wins_over_judge_without_fast_paths() {
        let judge = Arc::new(ScriptedJudge::coherent());
        let engine = AuditEngine::new(judge.clone(), Duration::from_secs(5)).without_fast_paths();
        let v = engine
            .audit(Category::Interests, &[Entry::text("Chess")], &[], &Policy::baseline(), "CV9")
            .await;
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
        assert!(!v.coherent);
        assert_eq!(v.error_type, ErrorType::Omission);
        assert!(v.empty_list);
    }

    #[tokio::test]
    async fn test_order_invariance_through_engine() {
        let a = Entry::fields([("company", "Google"), ("job_title", "Engineer")]);
        let b = Entry::fields([("company", "Airbus"), ("job_title", "Analyst")]);
        let c = Entry::fields([("company", "Thales"), ("job_title", "Analyst")]);
        let policy = Policy::for_dimension(Dimension::Gender);
        let engine = rules_engine();
        let first = engine
            .audit(Category::Experiences, &[a.clone(), b.clone()], &[c.clone(), a.clone()], &policy, "CV10")
            .await;
        let second = engine
            .audit(Category::Experiences, &[b, a.clone()], &[a, c], &policy, "CV10")
            .await;
        assert_eq!(first, second);
    }
}
