//! Grading engine orchestrator.
//!
//! Prepares problems (one seeded random source per problem, shared by its
//! questions), grades submissions against them, and grades whole problem
//! sets concurrently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::AnswerkeyConfig;
use crate::correctmap::CorrectMap;
use crate::model::{Problem, ProblemSet, Solution, Submission, SubmissionSet};
use crate::randomize::GroupRng;
use crate::report::{FailureKind, GradeReport, ProblemOutcome, ProblemSetSummary, QuestionFailure};
use crate::responses::{GradeContext, Grader, GradingSettings, SetupContext};
use crate::traits::{Evaluator, ScriptSandbox};

/// A problem whose questions are set up and ready to grade.
#[derive(Debug)]
pub struct PreparedProblem {
    pub problem_id: String,
    graders: Vec<Grader>,
    rng: GroupRng,
    solutions: Vec<Solution>,
}

impl PreparedProblem {
    /// Seed the problem's random source was created with.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn graders(&self) -> &[Grader] {
        &self.graders
    }

    pub fn solutions(&self) -> &[Solution] {
        &self.solutions
    }

    /// Sum of max points over every answer id.
    pub fn max_score(&self) -> f64 {
        self.graders
            .iter()
            .map(|g| g.max_points() * g.answer_ids().len() as f64)
            .sum()
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_problem_start(&self, problem_id: &str);
    fn on_problem_complete(&self, outcome: &ProblemOutcome);
    fn on_problem_error(&self, problem_id: &str, error: &str);
    fn on_set_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_problem_start(&self, _: &str) {}
    fn on_problem_complete(&self, _: &ProblemOutcome) {}
    fn on_problem_error(&self, _: &str, _: &str) {}
    fn on_set_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// The central grading engine.
#[derive(Clone)]
pub struct GradingEngine {
    evaluator: Arc<dyn Evaluator>,
    sandbox: Option<Arc<dyn ScriptSandbox>>,
    settings: GradingSettings,
    parallelism: usize,
}

impl GradingEngine {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        sandbox: Option<Arc<dyn ScriptSandbox>>,
        config: &AnswerkeyConfig,
    ) -> Result<Self> {
        Ok(Self::with_settings(
            evaluator,
            sandbox,
            config.settings()?,
            config.parallelism,
        ))
    }

    pub fn with_settings(
        evaluator: Arc<dyn Evaluator>,
        sandbox: Option<Arc<dyn ScriptSandbox>>,
        settings: GradingSettings,
        parallelism: usize,
    ) -> Self {
        Self {
            evaluator,
            sandbox,
            settings,
            parallelism: parallelism.max(1),
        }
    }

    pub fn settings(&self) -> &GradingSettings {
        &self.settings
    }

    /// Set up every question of `problem`. Questions draw from one random
    /// source seeded with the problem's seed, or `default_seed` if it has
    /// none, in declaration order.
    pub fn prepare(
        &self,
        problem: &Problem,
        default_seed: u64,
    ) -> crate::error::Result<PreparedProblem> {
        let rng = GroupRng::new(problem.seed.unwrap_or(default_seed));
        let ctx = SetupContext {
            context: &problem.context,
            solutions: &problem.solutions,
            rng: &rng,
            evaluator: self.evaluator.as_ref(),
            settings: &self.settings,
        };
        let graders = problem
            .questions
            .iter()
            .map(|q| Grader::setup(q, &ctx))
            .collect::<crate::error::Result<Vec<_>>>()?;

        Ok(PreparedProblem {
            problem_id: problem.id.clone(),
            graders,
            rng,
            solutions: problem.solutions.clone(),
        })
    }

    /// Grade every question and merge the maps. Fails on the first
    /// question that can't be graded.
    pub fn grade(
        &self,
        prepared: &PreparedProblem,
        submission: &Submission,
    ) -> crate::error::Result<CorrectMap> {
        let mut merged = CorrectMap::new();
        for grader in &prepared.graders {
            let cmap = grader.grade(submission, &self.grade_context(prepared))?;
            merge_into(&mut merged, cmap);
        }
        Ok(merged)
    }

    /// Grade every question independently, returning each result.
    pub fn grade_each(
        &self,
        prepared: &PreparedProblem,
        submission: &Submission,
    ) -> Vec<(String, crate::error::Result<CorrectMap>)> {
        let ctx = self.grade_context(prepared);
        prepared
            .graders
            .iter()
            .map(|g| (g.question_id().to_string(), g.grade(submission, &ctx)))
            .collect()
    }

    fn grade_context<'a>(&'a self, prepared: &PreparedProblem) -> GradeContext<'a> {
        GradeContext {
            evaluator: self.evaluator.as_ref(),
            sandbox: self.sandbox.as_deref(),
            seed: prepared.seed(),
            allow_unsafe: self.settings.allow_unsafe,
        }
    }

    /// Prepare and grade one problem into an outcome. Question failures are
    /// recorded without dropping the questions that did grade.
    pub fn grade_problem(
        &self,
        problem: &Problem,
        submission: &Submission,
        default_seed: u64,
    ) -> ProblemOutcome {
        let seed = problem.seed.unwrap_or(default_seed);
        let prepared = match self.prepare(problem, default_seed) {
            Ok(prepared) => prepared,
            Err(e) => return ProblemOutcome::failed(&problem.id, seed, e.to_string()),
        };

        let mut merged = CorrectMap::new();
        let mut failures = Vec::new();
        for (question_id, result) in self.grade_each(&prepared, submission) {
            match result {
                Ok(cmap) => merge_into(&mut merged, cmap),
                Err(e) => {
                    let kind = FailureKind::from(&e);
                    if kind == FailureKind::Scoring {
                        tracing::error!(
                            "scoring failed for {}/{}: {:#}",
                            problem.id,
                            question_id,
                            e
                        );
                    } else {
                        tracing::debug!("could not grade {}/{}: {}", problem.id, question_id, e);
                    }
                    failures.push(QuestionFailure {
                        question_id,
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }
        ProblemOutcome::graded(&problem.id, seed, merged, failures, prepared.max_score())
    }

    /// Grade every problem of `set` against its submission, in parallel.
    /// A problem without a submission is graded as blank. One problem
    /// failing never affects the others.
    pub async fn grade_batch(
        &self,
        set: &ProblemSet,
        submissions: &SubmissionSet,
        default_seed: u64,
        progress: &dyn ProgressReporter,
    ) -> Result<GradeReport> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut futures = FuturesUnordered::new();

        for (index, problem) in set.problems.iter().enumerate() {
            let submission = submissions.get(&problem.id).cloned().unwrap_or_else(|| {
                tracing::debug!("no submission for problem '{}', grading blank", problem.id);
                Submission::new()
            });
            let engine = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let problem = problem.clone();

            futures.push(async move {
                let problem_id = problem.id.clone();
                let seed = problem.seed.unwrap_or(default_seed);
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    let outcome = tokio::task::spawn_blocking(move || {
                        engine.grade_problem(&problem, &submission, default_seed)
                    })
                    .await?;
                    anyhow::Ok(outcome)
                };
                (index, problem_id, seed, inner.await)
            });
            progress.on_problem_start(&set.problems[index].id);
        }

        let total = futures.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut completed = 0usize;
        let mut failed = 0usize;

        while let Some((index, problem_id, seed, result)) = futures.next().await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("grading task failed for {problem_id}: {e:#}");
                    ProblemOutcome::failed(&problem_id, seed, format!("{e:#}"))
                }
            };
            match &outcome.error {
                Some(error) => {
                    progress.on_problem_error(&problem_id, error);
                    failed += 1;
                }
                None => {
                    progress.on_problem_complete(&outcome);
                    completed += 1;
                }
            }
            outcomes.push((index, outcome));
        }

        let elapsed = start.elapsed();
        progress.on_set_complete(total, completed, failed, elapsed);
        outcomes.sort_by_key(|(index, _)| *index);

        Ok(GradeReport {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            problem_set: ProblemSetSummary {
                id: set.id.clone(),
                name: set.name.clone(),
                problem_count: set.problems.len(),
            },
            outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

/// Merge `cmap` into `merged`, pinning default points so they survive the
/// change of max points. An empty overall message keeps the previous one.
fn merge_into(merged: &mut CorrectMap, mut cmap: CorrectMap) {
    let ids: Vec<String> = cmap.entries().map(|(id, _)| id.clone()).collect();
    for id in &ids {
        let points = cmap.get_points(id);
        cmap.set_points(id, points);
    }
    let previous = merged.get_overall_message().to_string();
    merged.update(&cmap);
    if cmap.get_overall_message().is_empty() {
        merged.set_overall_message(Some(previous.as_str()));
    }
}
