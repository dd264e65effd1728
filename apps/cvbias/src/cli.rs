use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::JudgeBackend;
use crate::models::{Dimension, VariantLabel};
use crate::stats::EmptyListPolicy;

#[derive(Parser, Debug)]
#[command(
    name = "cvbias",
    version,
    about = "Measures demographic bias in LLM-based CV extraction"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract every category of one variant's PDFs through the model.
    Extract(ExtractArgs),
    /// Join per-variant extractions into per-category tables keyed by CV id.
    Join(JoinArgs),
    /// Audit each demographic variant against Original.
    Audit(AuditArgs),
    /// A/A test: audit Original against itself to measure judge noise.
    Baseline(BaselineArgs),
    /// Bias statistics for each run.
    Stats(StatsArgs),
    /// Export every non-coherent verdict of a run.
    Errors(ErrorsArgs),
    /// Compare bias statistics across runs.
    Compare(CompareArgs),
    /// Check extracted CVs against a reference transcription.
    FormAudit(FormAuditArgs),
}

/// `--run` accepts a number (`3` means `run3` or `run_3`) or a directory name.
/// Omitted means every `run*` directory.
#[derive(Args, Debug, Clone, Default)]
pub struct RunSelector {
    #[arg(long)]
    pub run: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DimensionArg {
    Gender,
    Age,
    Origin,
    All,
}

impl DimensionArg {
    pub fn dimensions(self) -> Vec<Dimension> {
        match self {
            Self::Gender => vec![Dimension::Gender],
            Self::Age => vec![Dimension::Age],
            Self::Origin => vec![Dimension::Origin],
            Self::All => Dimension::BIAS.to_vec(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum VariantArg {
    Original,
    Gender,
    Age,
    Origin,
}

impl From<VariantArg> for VariantLabel {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Original => VariantLabel::Original,
            VariantArg::Gender => VariantLabel::Gender,
            VariantArg::Age => VariantLabel::Age,
            VariantArg::Origin => VariantLabel::Origin,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum JudgeArg {
    Rules,
    Llm,
}

impl From<JudgeArg> for JudgeBackend {
    fn from(arg: JudgeArg) -> Self {
        match arg {
            JudgeArg::Rules => JudgeBackend::Rules,
            JudgeArg::Llm => JudgeBackend::Llm,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmptyListArg {
    Include,
    Exclude,
    Separate,
}

impl From<EmptyListArg> for EmptyListPolicy {
    fn from(arg: EmptyListArg) -> Self {
        match arg {
            EmptyListArg::Include => EmptyListPolicy::Include,
            EmptyListArg::Exclude => EmptyListPolicy::Exclude,
            EmptyListArg::Separate => EmptyListPolicy::Separate,
        }
    }
}

/// Judge overrides shared by the commands that audit.
#[derive(Args, Debug, Clone, Default)]
pub struct JudgeOverrides {
    #[arg(long, value_enum)]
    pub judge: Option<JudgeArg>,

    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Directory holding this variant's PDFs.
    #[arg(long)]
    pub documents_dir: PathBuf,

    #[arg(long, value_enum)]
    pub variant: VariantArg,

    #[arg(long, default_value = "data/extractions")]
    pub extraction_root: PathBuf,

    /// Run directory name to write into, e.g. `run5`.
    #[arg(long)]
    pub run: String,

    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct JoinArgs {
    #[arg(long, default_value = "data/extractions")]
    pub extraction_root: PathBuf,

    #[arg(long, default_value = "data/joined")]
    pub join_root: PathBuf,

    #[command(flatten)]
    pub runs: RunSelector,
}

#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    #[arg(long, default_value = "data/joined")]
    pub join_root: PathBuf,

    #[arg(long, default_value = "data/audits")]
    pub output_root: PathBuf,

    #[command(flatten)]
    pub runs: RunSelector,

    #[arg(long, value_enum, default_value_t = DimensionArg::All)]
    pub dimension: DimensionArg,

    #[command(flatten)]
    pub judge: JudgeOverrides,
}

#[derive(Args, Debug, Clone)]
pub struct BaselineArgs {
    #[arg(long, default_value = "data/joined")]
    pub join_root: PathBuf,

    #[arg(long, default_value = "data/audits")]
    pub output_root: PathBuf,

    #[command(flatten)]
    pub runs: RunSelector,

    #[arg(long, value_enum, default_value_t = DimensionArg::All)]
    pub dimension: DimensionArg,

    /// CVs sampled per category.
    #[arg(long, default_value_t = crate::audit::DEFAULT_SAMPLE_PER_CATEGORY)]
    pub sample: usize,

    #[command(flatten)]
    pub judge: JudgeOverrides,
}

/// Options shared by the commands that aggregate verdicts.
#[derive(Args, Debug, Clone)]
pub struct AnalysisArgs {
    #[arg(long, default_value = "data/audits")]
    pub audit_root: PathBuf,

    #[arg(long, default_value = "data/stats")]
    pub output_root: PathBuf,

    #[arg(long, value_enum, default_value_t = DimensionArg::All)]
    pub dimension: DimensionArg,

    /// Overrides CVBIAS_ALPHA.
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Background noise rate in percent; overrides CVBIAS_NOISE_RATE_PCT.
    #[arg(long)]
    pub noise_rate: Option<f64>,

    #[arg(long, value_enum, default_value_t = EmptyListArg::Separate)]
    pub empty_list: EmptyListArg,

    /// Defaults to `<audit_root>/cv_exclusions.json`.
    #[arg(long)]
    pub exclusions: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatsArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,

    #[command(flatten)]
    pub runs: RunSelector,
}

#[derive(Args, Debug, Clone)]
pub struct ErrorsArgs {
    #[arg(long, default_value = "data/audits")]
    pub audit_root: PathBuf,

    #[arg(long, default_value = "data/stats")]
    pub output_root: PathBuf,

    #[command(flatten)]
    pub runs: RunSelector,

    #[arg(long)]
    pub exclusions: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,

    /// Runs to compare (repeatable); every `run*` directory when omitted.
    #[arg(long = "run")]
    pub runs: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct FormAuditArgs {
    /// Reference JSON keyed by document name.
    #[arg(long)]
    pub reference: PathBuf,

    /// Extractor output keyed by document name.
    #[arg(long)]
    pub extracted: PathBuf,

    #[arg(long, default_value = "data/form_audit/report.json")]
    pub output: PathBuf,

    #[command(flatten)]
    pub judge: JudgeOverrides,
}
