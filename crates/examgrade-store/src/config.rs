//! Evaluator configuration loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examgrade_core::engine::{EvaluatorConfig, NonPendingPolicy, Scheduling};
use examgrade_core::model::{ScoringRules, DEFAULT_QUESTION_COUNT};
use examgrade_core::parser::FixtureOptions;
use examgrade_core::statistics::DEFAULT_PASS_THRESHOLD_PCT;

/// Top-level examgrade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamgradeConfig {
    /// Number of evaluation workers.
    #[serde(default = "default_workers")]
    pub worker_count: usize,
    /// Points per correct answer for exams without their own rules.
    #[serde(default = "default_points")]
    pub points_per_correct: f64,
    /// Deduction per incorrect answer for exams without their own rules.
    #[serde(default = "default_penalty")]
    pub penalty_per_incorrect: f64,
    /// Required answer key length.
    #[serde(default = "default_question_count")]
    pub question_count: usize,
    #[serde(default)]
    pub scheduling: Scheduling,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Handling of attempts that are not pending.
    #[serde(default)]
    pub non_pending: NonPendingPolicy,
    /// Percentage at or above which an attempt passes.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold_pct: f64,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_workers() -> usize {
    4
}
fn default_points() -> f64 {
    ScoringRules::default().points_per_correct
}
fn default_penalty() -> f64 {
    ScoringRules::default().penalty_per_incorrect
}
fn default_question_count() -> usize {
    DEFAULT_QUESTION_COUNT
}
fn default_chunk_size() -> usize {
    1
}
fn default_pass_threshold() -> f64 {
    DEFAULT_PASS_THRESHOLD_PCT
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./examgrade-results")
}

impl Default for ExamgradeConfig {
    fn default() -> Self {
        Self {
            worker_count: default_workers(),
            points_per_correct: default_points(),
            penalty_per_incorrect: default_penalty(),
            question_count: default_question_count(),
            scheduling: Scheduling::default(),
            chunk_size: default_chunk_size(),
            non_pending: NonPendingPolicy::default(),
            pass_threshold_pct: default_pass_threshold(),
            output_dir: default_output_dir(),
        }
    }
}

impl ExamgradeConfig {
    /// Engine settings for the batch evaluator.
    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            worker_count: self.worker_count,
            scheduling: self.scheduling,
            chunk_size: self.chunk_size,
            non_pending: self.non_pending,
        }
    }

    /// Default scoring rules for exams that do not set their own.
    pub fn scoring_rules(&self) -> ScoringRules {
        ScoringRules::new(self.points_per_correct, self.penalty_per_incorrect)
    }

    /// Defaults handed to the fixture parser.
    pub fn fixture_options(&self) -> FixtureOptions {
        FixtureOptions {
            question_count: self.question_count,
            rules: self.scoring_rules(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Apply `EXAMGRADE_*` overrides read through `lookup`.
fn apply_env_overrides(
    config: &mut ExamgradeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = lookup("EXAMGRADE_WORKERS") {
        config.worker_count = v
            .trim()
            .parse()
            .with_context(|| format!("invalid EXAMGRADE_WORKERS: {v:?}"))?;
    }
    if let Some(v) = lookup("EXAMGRADE_POINTS_PER_CORRECT") {
        config.points_per_correct = v
            .trim()
            .parse()
            .with_context(|| format!("invalid EXAMGRADE_POINTS_PER_CORRECT: {v:?}"))?;
    }
    if let Some(v) = lookup("EXAMGRADE_PENALTY") {
        config.penalty_per_incorrect = v
            .trim()
            .parse()
            .with_context(|| format!("invalid EXAMGRADE_PENALTY: {v:?}"))?;
    }
    Ok(())
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examgrade.toml` in the current directory
/// 2. `~/.config/examgrade/config.toml`
///
/// Environment variable overrides: `EXAMGRADE_WORKERS`,
/// `EXAMGRADE_POINTS_PER_CORRECT`, `EXAMGRADE_PENALTY`.
pub fn load_config() -> Result<ExamgradeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamgradeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examgrade.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            parse_config_file(&path)?
        }
        None => ExamgradeConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.output_dir = PathBuf::from(resolve_env_vars(&config.output_dir.to_string_lossy()));

    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<ExamgradeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<ExamgradeConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examgrade"))
}
