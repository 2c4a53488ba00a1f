//! Grade report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correctmap::CorrectMap;
use crate::error::GradeError;

/// A complete batch grading report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub problem_set: ProblemSetSummary,
    /// One outcome per graded problem, in problem-set order.
    pub outcomes: Vec<ProblemOutcome>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of a problem set (without the full question definitions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSetSummary {
    pub id: String,
    pub name: String,
    pub problem_count: usize,
}

/// Which family a grading failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The question itself is broken.
    Content,
    /// The learner's answer could not be interpreted.
    Input,
    /// The check script failed.
    Scoring,
    /// Anything else, including a crashed grading task.
    Internal,
}

impl From<&GradeError> for FailureKind {
    fn from(err: &GradeError) -> Self {
        match err {
            GradeError::Content(_) => FailureKind::Content,
            GradeError::Input(_) => FailureKind::Input,
            GradeError::Scoring { .. } => FailureKind::Scoring,
            GradeError::Usage(_) | GradeError::TypeMismatch(_) => FailureKind::Internal,
        }
    }
}

/// A question that could not be graded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionFailure {
    pub question_id: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Grading outcome for one problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemOutcome {
    pub problem_id: String,
    /// Seed the problem was randomized with.
    pub seed: u64,
    /// Verdicts for every question that graded.
    #[serde(default)]
    pub correct_map: CorrectMap,
    /// Questions that failed to grade.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<QuestionFailure>,
    /// Setup failure that prevented grading the whole problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    max_score: f64,
}

impl ProblemOutcome {
    pub fn graded(
        problem_id: &str,
        seed: u64,
        correct_map: CorrectMap,
        failures: Vec<QuestionFailure>,
        max_score: f64,
    ) -> Self {
        Self {
            problem_id: problem_id.to_string(),
            seed,
            correct_map,
            failures,
            error: None,
            max_score,
        }
    }

    pub fn failed(problem_id: &str, seed: u64, error: impl Into<String>) -> Self {
        Self {
            problem_id: problem_id.to_string(),
            seed,
            correct_map: CorrectMap::new(),
            failures: Vec::new(),
            error: Some(error.into()),
            max_score: 0.0,
        }
    }

    /// Points earned: the plain sum over every answer.
    pub fn score(&self) -> f64 {
        self.correct_map.total_points()
    }

    /// Points available: the sum of max points over every answer.
    pub fn max_score(&self) -> f64 {
        self.max_score
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

impl GradeReport {
    pub fn total_score(&self) -> f64 {
        self.outcomes.iter().map(ProblemOutcome::score).sum()
    }

    pub fn total_max_score(&self) -> f64 {
        self.outcomes.iter().map(ProblemOutcome::max_score).sum()
    }

    /// Problems that could not be graded at all.
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: GradeReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}
