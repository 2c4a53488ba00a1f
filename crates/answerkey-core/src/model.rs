//! Core data model types for answerkey.
//!
//! Problem sets hold problems (question groups sharing one seed and one
//! authoring context), problems hold questions, and each question carries a
//! response kind with its own correctness rules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// A collection of problems loaded from one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemSet {
    /// Unique identifier for this problem set.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub problems: Vec<Problem>,
}

/// A question group. Every question in a problem shares one seed and one
/// random source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    /// Seed for shuffling and pool sampling. Falls back to the caller's
    /// session seed when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Authoring-context variables, referenced as `$name` in answers.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Worked solutions, optionally tied to a choice by explanation id.
    #[serde(default)]
    pub solutions: Vec<Solution>,
}

/// A worked solution shown after grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    #[serde(default)]
    pub explanation_id: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// One gradable question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default = "default_max_points")]
    pub max_points: f64,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

fn default_max_points() -> f64 {
    1.0
}

/// The response kinds, selected by the `type` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    ChoiceSet(ChoiceSetSpec),
    Numerical(NumericalSpec),
    Option(OptionSpec),
    MultipleChoice(MultipleChoiceSpec),
    TrueFalse(MultipleChoiceSpec),
    Scripted(ScriptedSpec),
}

impl QuestionKind {
    pub fn name(&self) -> &'static str {
        match self {
            QuestionKind::ChoiceSet(_) => "choice_set",
            QuestionKind::Numerical(_) => "numerical",
            QuestionKind::Option(_) => "option",
            QuestionKind::MultipleChoice(_) => "multiple_choice",
            QuestionKind::TrueFalse(_) => "true_false",
            QuestionKind::Scripted(_) => "scripted",
        }
    }
}

/// Correctness tag on a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceCorrectness {
    True,
    #[default]
    False,
    Partial,
}

impl fmt::Display for ChoiceCorrectness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceCorrectness::True => write!(f, "true"),
            ChoiceCorrectness::False => write!(f, "false"),
            ChoiceCorrectness::Partial => write!(f, "partial"),
        }
    }
}

impl FromStr for ChoiceCorrectness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" => Ok(ChoiceCorrectness::True),
            "false" => Ok(ChoiceCorrectness::False),
            "partial" => Ok(ChoiceCorrectness::Partial),
            other => Err(format!("unknown choice correctness: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for ChoiceCorrectness {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(ChoiceCorrectness::True),
            Raw::Flag(false) => Ok(ChoiceCorrectness::False),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A selectable choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDef {
    /// Author-given name suffix. Unnamed choices are numbered in order.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub correct: ChoiceCorrectness,
    /// Points awarded when a partial choice is selected.
    #[serde(default)]
    pub point_value: Option<f64>,
    /// Held in place when shuffling.
    #[serde(default)]
    pub fixed: bool,
    #[serde(default)]
    pub explanation_id: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Checkbox group: choose all that apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceSetSpec {
    pub choices: Vec<ChoiceDef>,
    /// `halves`, `edc`, or none.
    #[serde(default)]
    pub partial_credit: Option<String>,
}

/// A number or expression, or a range, with a tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericalSpec {
    /// Target value, or `[a, b]` / `(a, b)` range syntax.
    pub answer: String,
    #[serde(default)]
    pub tolerance: Option<String>,
    /// Comma-separated set of `close` and `list`.
    #[serde(default)]
    pub partial_credit: Option<String>,
    /// Alternate answers worth partial credit under `list`.
    #[serde(default)]
    pub partial_answers: Vec<String>,
    /// Expansion multiple for `close`, written as e.g. `2`, `x3` or `3x`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub partial_range: Option<String>,
}

/// Dropdown fields, each graded independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionSpec {
    pub fields: Vec<OptionField>,
    /// `points` or none.
    #[serde(default)]
    pub partial_credit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionField {
    pub id: String,
    /// Comma-separated list of correct values.
    pub correct: String,
    /// Comma-separated list of values worth partial credit.
    #[serde(default)]
    pub partial: Option<String>,
    /// Comma-separated points, parallel to `partial`.
    #[serde(default)]
    pub point_values: Option<String>,
    /// Values offered in the dropdown.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Single-answer choice group with optional shuffle and answer pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipleChoiceSpec {
    pub choices: Vec<ChoiceDef>,
    /// `points` or none.
    #[serde(default)]
    pub partial_credit: Option<String>,
    #[serde(default)]
    pub shuffle: bool,
    /// Number of choices to show: one correct plus `n - 1` incorrect.
    #[serde(default, deserialize_with = "lenient_string")]
    pub answer_pool: Option<String>,
    /// Replace choice names with opaque `mask_N` tokens.
    #[serde(default)]
    pub masked: bool,
}

/// Graded by an author-supplied check script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedSpec {
    /// Answer ids of the input fields, each ending in `_N`.
    pub fields: Vec<String>,
    #[serde(default)]
    pub script: Option<String>,
    /// Name of a check function `f(expect, answer)` defined in `script`.
    #[serde(default)]
    pub cfn: Option<String>,
    #[serde(default)]
    pub expect: Option<String>,
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default)]
    pub extra_args: BTreeMap<String, String>,
    /// Attach "No answer entered!" to a single empty field.
    #[serde(default)]
    pub empty_answer_err: bool,
}

/// Accept strings, integers, floats or booleans and keep their text.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Flag(bool),
        Text(String),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Int(v) => v.to_string(),
        Raw::Float(v) => v.to_string(),
        Raw::Flag(v) => v.to_string(),
        Raw::Text(v) => v,
    }))
}

/// A learner's raw value for one answer id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmissionValue {
    Single(String),
    Multiple(Vec<String>),
}

impl SubmissionValue {
    /// The value as a list; a scalar becomes a one-element list.
    pub fn as_list(&self) -> Vec<&str> {
        match self {
            SubmissionValue::Single(s) => vec![s.as_str()],
            SubmissionValue::Multiple(v) => v.iter().map(String::as_str).collect(),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            SubmissionValue::Single(s) => Some(s),
            SubmissionValue::Multiple(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SubmissionValue::Single(s) => s.trim().is_empty(),
            SubmissionValue::Multiple(v) => v.is_empty(),
        }
    }
}

impl fmt::Display for SubmissionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionValue::Single(s) => write!(f, "{s}"),
            SubmissionValue::Multiple(v) => write!(f, "[{}]", v.join(", ")),
        }
    }
}

impl From<&str> for SubmissionValue {
    fn from(s: &str) -> Self {
        SubmissionValue::Single(s.to_string())
    }
}

impl From<Vec<&str>> for SubmissionValue {
    fn from(v: Vec<&str>) -> Self {
        SubmissionValue::Multiple(v.into_iter().map(String::from).collect())
    }
}

/// One learner's answers for a problem, keyed by answer id.
pub type Submission = BTreeMap<String, SubmissionValue>;

/// Submissions for a whole problem set, keyed by problem id.
pub type SubmissionSet = BTreeMap<String, Submission>;

/// Text form of a context value, as compared against submissions.
pub fn context_value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_correctness_from_bool_or_text() {
        #[derive(Deserialize)]
        struct Wrapper {
            choices: Vec<ChoiceDef>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
[[choices]]
correct = true
[[choices]]
correct = "partial"
point_value = 0.25
[[choices]]
text = "unmarked"
"#,
        )
        .unwrap();
        let tags: Vec<_> = parsed.choices.iter().map(|c| c.correct).collect();
        assert_eq!(
            tags,
            vec![
                ChoiceCorrectness::True,
                ChoiceCorrectness::Partial,
                ChoiceCorrectness::False
            ]
        );
        assert_eq!(parsed.choices[1].point_value, Some(0.25));
    }

    #[test]
    fn question_kind_tag() {
        let q: Question = toml::from_str(
            r#"
id = "q1"
type = "numerical"
answer = "5"
tolerance = "1%"
"#,
        )
        .unwrap();
        assert_eq!(q.max_points, 1.0);
        assert_eq!(q.kind.name(), "numerical");
        match q.kind {
            QuestionKind::Numerical(spec) => assert_eq!(spec.tolerance.as_deref(), Some("1%")),
            other => panic!("unexpected kind {}", other.name()),
        }
    }

    #[test]
    fn answer_pool_accepts_numbers_and_text() {
        let q: Question = toml::from_str(
            r#"
id = "q1"
type = "multiple_choice"
answer_pool = 3
choices = []
"#,
        )
        .unwrap();
        match q.kind {
            QuestionKind::MultipleChoice(spec) => {
                assert_eq!(spec.answer_pool.as_deref(), Some("3"))
            }
            other => panic!("unexpected kind {}", other.name()),
        }
    }

    #[test]
    fn submission_values() {
        let json = r#"{"a": "x", "b": ["1", "2"], "c": []}"#;
        let sub: Submission = serde_json::from_str(json).unwrap();
        assert_eq!(sub["a"].as_list(), vec!["x"]);
        assert_eq!(sub["b"].as_single(), None);
        assert!(sub["c"].is_empty());
        assert_eq!(sub["b"].to_string(), "[1, 2]");
    }

    #[test]
    fn context_text() {
        assert_eq!(context_value_text(&serde_json::json!("abc")), "abc");
        assert_eq!(context_value_text(&serde_json::json!(5)), "5");
        assert_eq!(context_value_text(&serde_json::json!(2.5)), "2.5");
    }
}
