//! Command handlers. A missing run or input directory is a warning and a clean return;
//! only configuration and I/O failures on outputs abort a command.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::audit::{audit_run, run_baseline, run_form_audit};
use crate::cli::{
    AnalysisArgs, AuditArgs, BaselineArgs, Commands, CompareArgs, ErrorsArgs, ExtractArgs, FormAuditArgs,
    JoinArgs, JudgeOverrides, RunSelector, StatsArgs,
};
use crate::config::Config;
use crate::errors::AppError;
use crate::extraction::{extract_variant, BatchOptions, LlmExtractor};
use crate::join::run_join;
use crate::state::AppState;
use crate::stats::{
    build_report, compare_runs, comparison_path, load_run_verdicts, write_errors, AnalysisOptions, Exclusions,
    StatsReport, VerdictCorpus, EXCLUSIONS_FILE,
};
use crate::util::{list_run_dirs, resolve_run_dir, write_json_pretty};

pub async fn run(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Extract(args) => extract(args, config).await,
        Commands::Join(args) => join(args),
        Commands::Audit(args) => audit(args, config).await,
        Commands::Baseline(args) => baseline(args, config).await,
        Commands::Stats(args) => stats(args, config),
        Commands::Errors(args) => errors(args),
        Commands::Compare(args) => compare(args, config),
        Commands::FormAudit(args) => form_audit(args, config).await,
    }
}

/// Resolves the runs to process under `root`. Missing directories are reported, not fatal.
fn select_runs(root: &Path, selector: &RunSelector) -> Result<Vec<String>> {
    if !root.is_dir() {
        warn!(path = %root.display(), "input directory does not exist");
        return Ok(Vec::new());
    }
    match selector.run.as_deref() {
        Some(raw) => match resolve_run_dir(root, raw) {
            Some((name, _)) => Ok(vec![name]),
            None => {
                warn!(run = raw, path = %root.display(), "run not found");
                Ok(Vec::new())
            }
        },
        None => {
            let runs = list_run_dirs(root)?;
            if runs.is_empty() {
                warn!(path = %root.display(), "no run directories found");
            }
            Ok(runs)
        }
    }
}

/// Turns a skippable error into a warning; anything else propagates.
fn skip_or_fail<T>(result: Result<T, AppError>, run: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_skippable() => {
            warn!(run, error = %e, "skipping run");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn with_overrides(mut config: Config, overrides: &JudgeOverrides) -> Result<Config> {
    if let Some(judge) = overrides.judge {
        config.judge = judge.into();
    }
    if let Some(concurrency) = overrides.concurrency {
        if concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }
        config.concurrency = concurrency;
    }
    Ok(config)
}

async fn extract(args: ExtractArgs, config: Config) -> Result<()> {
    if !args.documents_dir.is_dir() {
        warn!(path = %args.documents_dir.display(), run = %args.run, "documents directory does not exist");
        return Ok(());
    }
    let concurrency = args.concurrency.unwrap_or(config.concurrency).max(1);
    let options = BatchOptions {
        concurrency,
        timeout: config.judge_timeout,
    };
    let state = AppState::from_config(config)?;
    let extractor = Arc::new(LlmExtractor::new(state.llm_client("document extraction")?));

    let output_dir = args.extraction_root.join(&args.run);
    extract_variant(extractor, &args.documents_dir, &output_dir, args.variant.into(), options).await?;
    info!(run = %args.run, path = %output_dir.display(), "extraction complete");
    Ok(())
}

fn join(args: JoinArgs) -> Result<()> {
    for run in select_runs(&args.extraction_root, &args.runs)? {
        skip_or_fail(run_join(&args.extraction_root, &args.join_root, &run), &run)?;
    }
    Ok(())
}

async fn audit(args: AuditArgs, config: Config) -> Result<()> {
    let state = AppState::from_config(with_overrides(config, &args.judge)?)?;
    for run in select_runs(&args.join_root, &args.runs)? {
        for dimension in args.dimension.dimensions() {
            let result = audit_run(&state, &args.join_root, &args.output_root, &run, dimension).await;
            if let Some(summary) = skip_or_fail(result, &run)? {
                info!(
                    run = %summary.run,
                    dimension = %summary.dimension,
                    verdicts = summary.verdicts,
                    errors = summary.errors,
                    judge_failures = summary.judge_failures,
                    "dimension audited"
                );
            }
        }
    }
    Ok(())
}

async fn baseline(args: BaselineArgs, config: Config) -> Result<()> {
    let state = AppState::from_config(with_overrides(config, &args.judge)?)?;
    let dimensions = args.dimension.dimensions();
    for run in select_runs(&args.join_root, &args.runs)? {
        let result = run_baseline(&state, &args.join_root, &args.output_root, &run, &dimensions, args.sample).await;
        if let Some(report) = skip_or_fail(result, &run)? {
            println!(
                "{}: {} false positives over {} comparisons ({} judge failures), noise rate {:.2}%",
                report.run, report.false_positives, report.comparisons, report.judge_failures, report.noise_rate_pct
            );
        }
    }
    Ok(())
}

fn analysis_options(args: &AnalysisArgs, config: &Config) -> Result<AnalysisOptions> {
    let alpha = args.alpha.unwrap_or(config.alpha);
    if !(alpha > 0.0 && alpha < 1.0) {
        bail!("--alpha must lie strictly between 0 and 1, got {alpha}");
    }
    let noise_rate_pct = args.noise_rate.unwrap_or(config.noise_rate_pct);
    if !(0.0..=100.0).contains(&noise_rate_pct) {
        bail!("--noise-rate must lie in [0, 100], got {noise_rate_pct}");
    }
    Ok(AnalysisOptions {
        alpha,
        noise_rate_pct,
        empty_list: args.empty_list.into(),
        ..AnalysisOptions::default()
    })
}

fn load_exclusions(audit_root: &Path, explicit: Option<&Path>) -> Result<Exclusions> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| audit_root.join(EXCLUSIONS_FILE));
    Ok(Exclusions::load(&path)?)
}

/// Loads one run's verdicts with its exclusions applied; `None` when the run has none.
fn load_corpus(audit_root: &Path, run: &str, exclusions: &Exclusions) -> Result<Option<VerdictCorpus>> {
    let Some(mut corpus) = skip_or_fail(load_run_verdicts(audit_root, run), run)? else {
        return Ok(None);
    };
    let dropped = corpus.apply_exclusions(&exclusions.for_run(run));
    if dropped > 0 {
        info!(run, dropped, "excluded CVs removed");
    }
    Ok(Some(corpus))
}

fn stats_reports(args: &AnalysisArgs, runs: &[String], options: &AnalysisOptions) -> Result<Vec<StatsReport>> {
    let exclusions = load_exclusions(&args.audit_root, args.exclusions.as_deref())?;
    let dimensions = args.dimension.dimensions();
    let mut reports = Vec::new();
    for run in runs {
        if let Some(corpus) = load_corpus(&args.audit_root, run, &exclusions)? {
            reports.push(build_report(&corpus, &dimensions, options));
        }
    }
    Ok(reports)
}

fn stats(args: StatsArgs, config: Config) -> Result<()> {
    let options = analysis_options(&args.analysis, &config)?;
    let runs = select_runs(&args.analysis.audit_root, &args.runs)?;
    for report in stats_reports(&args.analysis, &runs, &options)? {
        let path = report.write(&args.analysis.output_root)?;
        println!("{}", report.summary());
        info!(run = %report.run, path = %path.display(), "statistics written");
    }
    Ok(())
}

fn errors(args: ErrorsArgs) -> Result<()> {
    let exclusions = load_exclusions(&args.audit_root, args.exclusions.as_deref())?;
    for run in select_runs(&args.audit_root, &args.runs)? {
        if let Some(corpus) = load_corpus(&args.audit_root, &run, &exclusions)? {
            let (path, count) = write_errors(&corpus, &args.output_root)?;
            info!(run = %run, errors = count, path = %path.display(), "error listing written");
        }
    }
    Ok(())
}

fn compare(args: CompareArgs, config: Config) -> Result<()> {
    let options = analysis_options(&args.analysis, &config)?;
    let runs = if args.runs.is_empty() {
        select_runs(&args.analysis.audit_root, &RunSelector::default())?
    } else {
        let mut resolved = Vec::new();
        for raw in &args.runs {
            let selector = RunSelector { run: Some(raw.clone()) };
            resolved.extend(select_runs(&args.analysis.audit_root, &selector)?);
        }
        resolved
    };

    let reports = stats_reports(&args.analysis, &runs, &options)?;
    if reports.is_empty() {
        warn!(path = %args.analysis.audit_root.display(), "no runs with verdicts to compare");
        return Ok(());
    }
    let comparison = compare_runs(&reports, options.alpha);
    let path = comparison_path(&args.analysis.output_root);
    write_json_pretty(&path, &comparison)?;
    println!("{}", comparison.summary());
    info!(runs = reports.len(), path = %path.display(), "run comparison written");
    Ok(())
}

async fn form_audit(args: FormAuditArgs, config: Config) -> Result<()> {
    let state = AppState::from_config(with_overrides(config, &args.judge)?)?;
    let result = run_form_audit(&state.engine(), &args.reference, &args.extracted, &args.output).await;
    skip_or_fail(result, "form-audit")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{DimensionArg, EmptyListArg, JudgeArg};
    use serde_json::json;
    use std::fs;

    fn analysis_args(root: &Path) -> AnalysisArgs {
        AnalysisArgs {
            audit_root: root.join("audits"),
            output_root: root.join("stats"),
            dimension: DimensionArg::All,
            alpha: None,
            noise_rate: None,
            empty_list: EmptyListArg::Separate,
            exclusions: None,
        }
    }

    #[test]
    fn test_missing_root_and_run_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(select_runs(&dir.path().join("absent"), &RunSelector::default()).unwrap().is_empty());
        fs::create_dir(dir.path().join("run1")).unwrap();
        let missing = RunSelector { run: Some("4".into()) };
        assert!(select_runs(dir.path(), &missing).unwrap().is_empty());
        let numeric = RunSelector { run: Some("1".into()) };
        assert_eq!(select_runs(dir.path(), &numeric).unwrap(), vec!["run1"]);
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let overrides = JudgeOverrides {
            judge: Some(JudgeArg::Llm),
            concurrency: Some(2),
        };
        let config = with_overrides(Config::default(), &overrides).unwrap();
        assert_eq!(config.concurrency, 2);
        assert!(AppState::from_config(config).is_err(), "llm judge without key");

        let zero = JudgeOverrides {
            judge: None,
            concurrency: Some(0),
        };
        assert!(with_overrides(Config::default(), &zero).is_err());
    }

    #[test]
    fn test_analysis_options_validate_flags() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = analysis_args(dir.path());
        args.alpha = Some(0.0);
        assert!(analysis_options(&args, &Config::default()).is_err());
        args.alpha = Some(0.01);
        args.noise_rate = Some(0.5);
        let options = analysis_options(&args, &Config::default()).unwrap();
        assert!((options.noise_rate_pct - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stats_and_compare_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let audits = dir.path().join("audits");
        for (run, errors) in [("run1", 20), ("run2", 25)] {
            let verdicts: Vec<serde_json::Value> = (0..100)
                .map(|i| {
                    json!({
                        "cv_id": format!("CV{i}"),
                        "coherent": i >= errors,
                        "empty_list": false,
                        "error_type": if i < errors { "Modification" } else { "None" },
                        "details": ""
                    })
                })
                .collect();
            fs::create_dir_all(audits.join(run)).unwrap();
            fs::write(audits.join(run).join("audit_gender_studies.json"), json!(verdicts).to_string()).unwrap();
        }
        fs::write(audits.join(EXCLUSIONS_FILE), json!({"run1": ["CV0"]}).to_string()).unwrap();

        let args = StatsArgs {
            analysis: analysis_args(dir.path()),
            runs: RunSelector::default(),
        };
        stats(args, Config::default()).unwrap();
        let written: serde_json::Value =
            crate::util::read_json(&dir.path().join("stats/run1/stats_run1.json")).unwrap();
        assert_eq!(written["excluded_verdicts"], 1);
        assert_eq!(written["analysis"]["dimensions"][0]["total"], 99);

        let args = CompareArgs {
            analysis: analysis_args(dir.path()),
            runs: Vec::new(),
        };
        compare(args, Config::default()).unwrap();
        let comparison: serde_json::Value =
            crate::util::read_json(&dir.path().join("stats/comparison_runs.json")).unwrap();
        assert_eq!(comparison["runs"], json!(["run1", "run2"]));
        assert_eq!(comparison["dimensions"][0]["reproducible"], true);
    }

    #[test]
    fn test_errors_command_writes_listing() {
        let dir = tempfile::tempdir().unwrap();
        let audits = dir.path().join("audits");
        fs::create_dir_all(audits.join("run3")).unwrap();
        fs::write(
            audits.join("run3/audit_age_interests.json"),
            json!([{"cv_id": "CV1", "coherent": false, "error_type": "Omission", "details": "lost hobby"}]).to_string(),
        )
        .unwrap();
        let args = ErrorsArgs {
            audit_root: audits,
            output_root: dir.path().join("stats"),
            runs: RunSelector { run: Some("3".into()) },
            exclusions: None,
        };
        errors(args).unwrap();
        assert!(dir.path().join("stats/run3/errors.json").exists());
    }
}
