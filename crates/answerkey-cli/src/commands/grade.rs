//! The `answerkey grade` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};

use answerkey_core::calc::Calculator;
use answerkey_core::config::load_config_from;
use answerkey_core::engine::{GradingEngine, ProgressReporter};
use answerkey_core::parser;
use answerkey_core::report::{GradeReport, ProblemOutcome};
use answerkey_core::traits::ScriptSandbox;
use answerkey_sandbox::RhaiSandbox;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_problem_start(&self, problem_id: &str) {
        tracing::debug!("grading {problem_id}");
    }

    fn on_problem_complete(&self, outcome: &ProblemOutcome) {
        eprintln!(
            "  Graded: {} {:.2}/{:.2}{}",
            outcome.problem_id,
            outcome.score(),
            outcome.max_score(),
            if outcome.failures.is_empty() {
                String::new()
            } else {
                format!(" ({} ungraded)", outcome.failures.len())
            }
        );
    }

    fn on_problem_error(&self, problem_id: &str, error: &str) {
        eprintln!("  ERROR: {problem_id}: {error}");
    }

    fn on_set_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} graded, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    problems_path: PathBuf,
    submissions_path: PathBuf,
    seed: u64,
    format: String,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "table" | "json"),
        "unknown format '{format}', expected table or json"
    );

    let config = load_config_from(config_path.as_deref())?;
    let sets = parser::load_problem_sets(&problems_path)?;
    anyhow::ensure!(
        !sets.is_empty(),
        "no problem sets found in {}",
        problems_path.display()
    );
    let submissions = parser::load_submissions(&submissions_path)?;

    let sandbox: Arc<dyn ScriptSandbox> = Arc::new(RhaiSandbox::from_config(&config.sandbox));
    let engine = GradingEngine::new(Arc::new(Calculator::new()), Some(sandbox), &config)?;

    let mut reports = Vec::with_capacity(sets.len());
    for set in &sets {
        eprintln!("Grading {} ({} problems)", set.name, set.problems.len());
        reports.push(
            engine
                .grade_batch(set, &submissions, seed, &ConsoleReporter)
                .await?,
        );
    }

    match format.as_str() {
        "json" => {
            for report in &reports {
                println!("{}", serde_json::to_string_pretty(report)?);
            }
        }
        _ => {
            for report in &reports {
                print_table(report);
            }
        }
    }

    if let Some(dir) = output {
        let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        for report in &reports {
            let name = if reports.len() == 1 {
                format!("report-{timestamp}.json")
            } else {
                format!("report-{}-{timestamp}.json", report.problem_set.id)
            };
            let path = dir.join(name);
            report.save_json(&path)?;
            eprintln!("JSON report: {}", path.display());
        }
    }

    Ok(())
}

fn print_table(report: &GradeReport) {
    let mut table = Table::new();
    table.set_header(vec!["Problem", "Answer", "Correctness", "Points", "Message"]);

    for outcome in &report.outcomes {
        if let Some(error) = &outcome.error {
            table.add_row(vec![
                Cell::new(&outcome.problem_id),
                Cell::new("-"),
                Cell::new("error"),
                Cell::new("-"),
                Cell::new(error),
            ]);
            continue;
        }
        for (answer_id, entry) in outcome.correct_map.entries() {
            table.add_row(vec![
                Cell::new(&outcome.problem_id),
                Cell::new(answer_id),
                Cell::new(entry.correctness),
                Cell::new(format!("{:.2}", outcome.correct_map.get_points(answer_id))),
                Cell::new(entry.msg.as_deref().unwrap_or("")),
            ]);
        }
        for failure in &outcome.failures {
            table.add_row(vec![
                Cell::new(&outcome.problem_id),
                Cell::new(&failure.question_id),
                Cell::new("ungraded"),
                Cell::new("-"),
                Cell::new(&failure.message),
            ]);
        }
    }

    println!("{}", report.problem_set.name);
    println!("{table}");
    println!(
        "Total: {:.2}/{:.2}",
        report.total_score(),
        report.total_max_score()
    );
}
