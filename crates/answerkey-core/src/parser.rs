//! TOML problem-set parser.
//!
//! Loads problem sets from TOML files and directories, validates them, and
//! reads learner submissions from JSON.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{ChoiceCorrectness, Problem, ProblemSet, QuestionKind, SubmissionSet};
use crate::responses::ChoiceSetCredit;

/// On-disk shape of a problem-set file.
#[derive(Debug, Deserialize)]
struct TomlProblemFile {
    problem_set: TomlProblemSetHeader,
    #[serde(default)]
    problems: Vec<Problem>,
}

#[derive(Debug, Deserialize)]
struct TomlProblemSetHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

/// Parse a single TOML file into a `ProblemSet`.
pub fn parse_problem_set(path: &Path) -> Result<ProblemSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read problem set file: {}", path.display()))?;

    parse_problem_set_str(&content, path)
}

/// Parse a TOML string into a `ProblemSet`.
pub fn parse_problem_set_str(content: &str, source_path: &Path) -> Result<ProblemSet> {
    let parsed: TomlProblemFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    Ok(ProblemSet {
        id: parsed.problem_set.id,
        name: parsed.problem_set.name,
        description: parsed.problem_set.description,
        problems: parsed.problems,
    })
}

/// Recursively load all `.toml` problem-set files from a directory.
/// Files that fail to parse are skipped with a warning.
pub fn load_problem_directory(dir: &Path) -> Result<Vec<ProblemSet>> {
    let mut sets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            sets.extend(load_problem_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_problem_set(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sets)
}

/// Load a problem set file, or every problem set under a directory.
pub fn load_problem_sets(path: &Path) -> Result<Vec<ProblemSet>> {
    if path.is_dir() {
        load_problem_directory(path)
    } else {
        Ok(vec![parse_problem_set(path)?])
    }
}

/// Read a JSON submissions file: problem id → answer id → value(s).
pub fn load_submissions(path: &Path) -> Result<SubmissionSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read submissions: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse submissions: {}", path.display()))
}

/// A warning from problem-set validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub problem_id: Option<String>,
    pub question_id: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn question(problem: &Problem, question_id: &str, message: impl Into<String>) -> Self {
        Self {
            problem_id: Some(problem.id.clone()),
            question_id: Some(question_id.to_string()),
            message: message.into(),
        }
    }
}

/// Validate a problem set for authoring mistakes that parse fine.
pub fn validate_problem_set(set: &ProblemSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_problems = HashSet::new();
    for problem in &set.problems {
        if !seen_problems.insert(&problem.id) {
            warnings.push(ValidationWarning {
                problem_id: Some(problem.id.clone()),
                question_id: None,
                message: format!("duplicate problem ID: {}", problem.id),
            });
        }
    }

    for problem in &set.problems {
        let mut seen_questions = HashSet::new();
        for question in &problem.questions {
            if !seen_questions.insert(&question.id) {
                warnings.push(ValidationWarning::question(
                    problem,
                    &question.id,
                    format!("duplicate question ID: {}", question.id),
                ));
            }

            match &question.kind {
                QuestionKind::MultipleChoice(spec) | QuestionKind::TrueFalse(spec) => {
                    if !spec.choices.iter().any(|c| c.correct == ChoiceCorrectness::True) {
                        warnings.push(ValidationWarning::question(
                            problem,
                            &question.id,
                            "no choice is marked correct",
                        ));
                    }
                    let pooled = spec.answer_pool.as_deref().is_some_and(|p| p.trim() != "0");
                    if spec.shuffle && pooled {
                        warnings.push(ValidationWarning::question(
                            problem,
                            &question.id,
                            "shuffle and answer_pool are both set",
                        ));
                    }
                }
                QuestionKind::ChoiceSet(spec) => {
                    let halves = spec
                        .partial_credit
                        .as_deref()
                        .and_then(|p| p.parse::<ChoiceSetCredit>().ok())
                        == Some(ChoiceSetCredit::Halves);
                    if halves && spec.choices.len() <= 2 {
                        warnings.push(ValidationWarning::question(
                            problem,
                            &question.id,
                            "halves partial credit with 2 or fewer choices never awards partial credit",
                        ));
                    }
                }
                QuestionKind::Scripted(spec) => {
                    if spec.script.as_deref().map_or(true, |s| s.trim().is_empty()) {
                        warnings.push(ValidationWarning::question(
                            problem,
                            &question.id,
                            "scripted question has no script",
                        ));
                    }
                }
                QuestionKind::Numerical(_) | QuestionKind::Option(_) => {}
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubmissionValue;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[problem_set]
id = "physics-101"
name = "Physics 101"
description = "Week one quiz"

[[problems]]
id = "kinematics"
seed = 7

[problems.context]
g = 9.81

[[problems.questions]]
id = "gravity"
type = "numerical"
answer = "$g"
tolerance = "1%"
partial_credit = "close"

[[problems.questions]]
id = "units"
type = "multiple_choice"
shuffle = true

[[problems.questions.choices]]
correct = true
text = "m/s^2"

[[problems.questions.choices]]
correct = false
text = "m/s"

[[problems.questions]]
id = "vectors"
type = "choice_set"
partial_credit = "edc"
max_points = 2

[[problems.questions.choices]]
correct = true
text = "velocity"

[[problems.questions.choices]]
correct = false
text = "speed"

[[problems.questions.choices]]
correct = "partial"
text = "displacement"
"#;

    #[test]
    fn parse_valid_toml() {
        let set = parse_problem_set_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(set.id, "physics-101");
        assert_eq!(set.problems.len(), 1);

        let problem = &set.problems[0];
        assert_eq!(problem.seed, Some(7));
        assert_eq!(problem.questions.len(), 3);
        assert_eq!(problem.questions[0].kind.name(), "numerical");
        assert_eq!(problem.questions[2].max_points, 2.0);
        match &problem.questions[2].kind {
            QuestionKind::ChoiceSet(spec) => {
                assert_eq!(spec.choices[2].correct, ChoiceCorrectness::Partial);
            }
            other => panic!("unexpected kind {}", other.name()),
        }
        assert!(validate_problem_set(&set).is_empty());
    }

    #[test]
    fn parse_unknown_type_fails() {
        let toml = r#"
[problem_set]
id = "x"
name = "X"

[[problems]]
id = "p"

[[problems.questions]]
id = "q"
type = "essay"
"#;
        assert!(parse_problem_set_str(toml, &PathBuf::from("x.toml")).is_err());
    }

    #[test]
    fn validate_common_mistakes() {
        let toml = r#"
[problem_set]
id = "mistakes"
name = "Mistakes"

[[problems]]
id = "p"

[[problems.questions]]
id = "mc"
type = "multiple_choice"
shuffle = true
answer_pool = 2

[[problems.questions.choices]]
correct = false
text = "a"

[[problems.questions]]
id = "mc"
type = "choice_set"
partial_credit = "halves"

[[problems.questions.choices]]
correct = true
text = "a"

[[problems.questions]]
id = "s_1"
type = "scripted"
fields = ["s_1"]

[[problems]]
id = "p"
"#;
        let set = parse_problem_set_str(toml, &PathBuf::from("test.toml")).unwrap();
        let messages: Vec<_> = validate_problem_set(&set)
            .into_iter()
            .map(|w| w.message)
            .collect();
        for expected in [
            "duplicate problem ID",
            "duplicate question ID",
            "no choice is marked correct",
            "shuffle and answer_pool",
            "halves partial credit",
            "no script",
        ] {
            assert!(
                messages.iter().any(|m| m.contains(expected)),
                "missing '{expected}' in {messages:?}"
            );
        }
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        assert!(parse_problem_set_str(bad, &PathBuf::from("bad.toml")).is_err());
    }

    #[test]
    fn load_directory_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "[problem_set").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("again.toml"), VALID_TOML).unwrap();

        let sets = load_problem_directory(dir.path()).unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.iter().all(|s| s.id == "physics-101"));
        assert_eq!(load_problem_sets(&dir.path().join("good.toml")).unwrap().len(), 1);
    }

    #[test]
    fn load_submissions_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        std::fs::write(
            &path,
            r#"{"kinematics": {"gravity": "9.8", "vectors": ["choice_0", "choice_2"]}}"#,
        )
        .unwrap();
        let subs = load_submissions(&path).unwrap();
        let answers = &subs["kinematics"];
        assert_eq!(answers["gravity"], SubmissionValue::from("9.8"));
        assert_eq!(answers["vectors"].as_list(), vec!["choice_0", "choice_2"]);

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(load_submissions(&path).is_err());
    }
}
