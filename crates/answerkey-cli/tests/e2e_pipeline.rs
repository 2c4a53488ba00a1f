//! End-to-end pipeline tests: parse a problem set, prepare it, and grade
//! submissions with the real calculator and the rhai sandbox.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use answerkey_core::calc::Calculator;
use answerkey_core::config::AnswerkeyConfig;
use answerkey_core::engine::{GradingEngine, NoopReporter};
use answerkey_core::model::{Submission, SubmissionValue};
use answerkey_core::parser;
use answerkey_core::report::{FailureKind, GradeReport};
use answerkey_core::traits::ScriptSandbox;
use answerkey_core::Correctness;
use answerkey_sandbox::RhaiSandbox;

fn engine_with(sandbox: RhaiSandbox) -> GradingEngine {
    let sandbox: Arc<dyn ScriptSandbox> = Arc::new(sandbox);
    GradingEngine::new(
        Arc::new(Calculator::new()),
        Some(sandbox),
        &AnswerkeyConfig::default(),
    )
    .unwrap()
}

fn engine() -> GradingEngine {
    engine_with(RhaiSandbox::new())
}

fn submission(pairs: &[(&str, &str)]) -> Submission {
    pairs
        .iter()
        .map(|(id, v)| (id.to_string(), SubmissionValue::from(*v)))
        .collect()
}

async fn grade_fixture(set: &str, submissions: &str) -> GradeReport {
    let dir = Path::new("../../problem-sets");
    let set = parser::parse_problem_set(&dir.join(set)).unwrap();
    let submissions = parser::load_submissions(&dir.join(submissions)).unwrap();
    engine()
        .grade_batch(&set, &submissions, 0, &NoopReporter)
        .await
        .unwrap()
}

// --- Fixture problem sets ---

#[tokio::test]
async fn e2e_mechanics_fixture() {
    let report = grade_fixture("mechanics.toml", "mechanics-submissions.json").await;

    assert_eq!(report.problem_set.id, "mechanics");
    assert_eq!(report.failed_count(), 0);
    assert!((report.total_score() - 5.0).abs() < 1e-9);
    assert!((report.total_max_score() - 7.0).abs() < 1e-9);

    let kinematics = &report.outcomes[0];
    assert_eq!(kinematics.problem_id, "kinematics");
    assert_eq!(kinematics.seed, 3);
    let cmap = &kinematics.correct_map;
    assert!(cmap.is_correct("distance"));
    assert_eq!(cmap.get_points("distance"), 2.0);
    assert!(cmap.is_partially_correct("speed_range"));
    assert_eq!(cmap.get_points("speed_range"), 0.5);
    assert!(cmap.is_correct("units"));

    let forces = &report.outcomes[1];
    let cmap = &forces.correct_map;
    assert_eq!(cmap.get_points("vectors"), 0.25);
    assert!(cmap.is_partially_correct("dropdowns_1"));
    assert_eq!(cmap.get_points("dropdowns_1"), 0.25);
    assert!(cmap.is_correct("claims"));
}

#[tokio::test]
async fn e2e_scripted_fixture() {
    let report = grade_fixture("scripted.toml", "scripted-submissions.json").await;

    let roots = &report.outcomes[0];
    assert!(roots.failures.is_empty());
    let cmap = &roots.correct_map;
    assert!(cmap.is_partially_correct("root_1"));
    assert_eq!(cmap.get_points("root_1"), 0.5);
    assert!(cmap
        .get_message("root_1")
        .unwrap()
        .contains("Both signs work"));
    assert!(cmap.is_correct("pair_1"));
    assert_eq!(
        cmap.get_correctness("pair_2"),
        Some(Correctness::Incorrect)
    );
    assert_eq!(cmap.get_message("pair_2"), Some("expected pair_2"));
    assert_eq!(cmap.get_overall_message(), "checked 2 fields");

    let broken = &report.outcomes[1];
    assert!(!broken.is_failed());
    assert_eq!(broken.failures.len(), 1);
    assert_eq!(broken.failures[0].question_id, "oops");
    assert_eq!(broken.failures[0].kind, FailureKind::Scoring);
    assert!(broken.failures[0].message.contains("grader bug"));
    assert_eq!(broken.score(), 0.0);
    assert_eq!(broken.max_score(), 1.0);

    assert!((report.total_score() - 1.5).abs() < 1e-9);
    assert!((report.total_max_score() - 4.0).abs() < 1e-9);
}

// --- Inline problem sets ---

const CHECKS: &str = r#"
[problem_set]
id = "checks"
name = "Checks"

[[problems]]
id = "sum"
seed = 11

[problems.context]
a = 4
b = 5

[[problems.questions]]
id = "total"
type = "scripted"
fields = ["total_1"]
expect = "$a + $b"
cfn = "check"
extra_args = { hint = "add them" }
script = '''
fn check(expect, ans, args) {
    if ans == "9" {
        true
    } else {
        #{ ok: false, msg: args.hint + " (" + expect + ")" }
    }
}
'''

[[problems.questions]]
id = "value"
type = "numerical"
answer = "$a * $b"
"#;

#[test]
fn e2e_contextualized_expect_and_extra_args() {
    let set = parser::parse_problem_set_str(CHECKS, Path::new("checks.toml")).unwrap();
    let engine = engine();
    let problem = &set.problems[0];
    let prepared = engine.prepare(problem, 0).unwrap();
    assert_eq!(prepared.seed(), 11);

    let right = engine
        .grade(&prepared, &submission(&[("total_1", "9"), ("value", "20")]))
        .unwrap();
    assert!(right.is_correct("total_1"));
    assert!(right.is_correct("value"));
    assert_eq!(right.total_points(), 2.0);

    let wrong = engine
        .grade(&prepared, &submission(&[("total_1", "8"), ("value", "21")]))
        .unwrap();
    assert!(!wrong.is_correct("total_1"));
    assert_eq!(wrong.get_message("total_1"), Some("add them (4 + 5)"));
    assert!(!wrong.is_correct("value"));
}

#[test]
fn e2e_blank_scripted_answer_is_incorrect_without_running() {
    let set = parser::parse_problem_set_str(CHECKS, Path::new("checks.toml")).unwrap();
    let engine = engine();
    let prepared = engine.prepare(&set.problems[0], 0).unwrap();

    let cmap = engine
        .grade(&prepared, &submission(&[("total_1", "  "), ("value", "20")]))
        .unwrap();
    assert_eq!(cmap.get_correctness("total_1"), Some(Correctness::Incorrect));
    assert_eq!(cmap.get_message("total_1"), None);
}

const RUNAWAY: &str = r#"
[problem_set]
id = "runaway"
name = "Runaway"

[[problems]]
id = "spin"

[[problems.questions]]
id = "loop"
type = "scripted"
fields = ["loop_1"]
script = '''
let n = 0;
loop { n += 1; }
'''

[[problems.questions]]
id = "pick"
type = "multiple_choice"

[[problems.questions.choices]]
correct = true
text = "yes"

[[problems.questions.choices]]
correct = false
text = "no"
"#;

#[test]
fn e2e_runaway_script_fails_only_its_question() {
    let set = parser::parse_problem_set_str(RUNAWAY, Path::new("runaway.toml")).unwrap();
    let engine = engine_with(
        RhaiSandbox::new()
            .with_max_operations(0)
            .with_timeout(Duration::from_millis(50)),
    );

    let outcome = engine.grade_problem(
        &set.problems[0],
        &submission(&[("loop_1", "x"), ("pick", "choice_0")]),
        0,
    );
    assert!(outcome.correct_map.is_correct("pick"));
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].kind, FailureKind::Scoring);
    assert!(outcome.failures[0].message.contains("timed out"));
}

#[tokio::test]
async fn e2e_missing_submission_grades_blank() {
    let set = parser::parse_problem_set_str(RUNAWAY, Path::new("runaway.toml")).unwrap();
    let report = engine()
        .grade_batch(&set, &Default::default(), 0, &NoopReporter)
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.correct_map.get_correctness("pick"), Some(Correctness::Incorrect));
    assert_eq!(outcome.correct_map.get_correctness("loop_1"), Some(Correctness::Incorrect));
    assert_eq!(report.total_score(), 0.0);
}

#[tokio::test]
async fn e2e_report_round_trips_through_disk() {
    let report = grade_fixture("mechanics.toml", "mechanics-submissions.json").await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");

    report.save_json(&path).unwrap();
    let loaded = GradeReport::load_json(&path).unwrap();
    assert_eq!(loaded.id, report.id);
    assert_eq!(loaded.outcomes.len(), report.outcomes.len());
    assert!((loaded.total_score() - report.total_score()).abs() < 1e-9);
}
