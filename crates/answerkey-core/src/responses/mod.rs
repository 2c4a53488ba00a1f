//! Response graders, one per question kind.
//!
//! [`Grader`] is a closed enum over the kinds. Setup happens once per
//! question (naming, masking, randomization, parsing the staff answer);
//! grading is then a pure function of the prepared grader and a
//! submission.

pub mod choice_set;
pub mod multiple_choice;
pub mod numerical;
pub mod option;
pub mod scripted;

use std::collections::BTreeMap;

use crate::correctmap::CorrectMap;
use crate::error::Result;
use crate::model::{context_value_text, Question, QuestionKind, Solution, Submission};
use crate::randomize::GroupRng;
use crate::tolerance::Tolerance;
use crate::traits::{Evaluator, ScriptSandbox};

pub use choice_set::{ChoiceSetCredit, ChoiceSetGrader};
pub use multiple_choice::MultipleChoiceGrader;
pub use numerical::NumericalGrader;
pub use option::OptionGrader;
pub use scripted::ScriptedGrader;

/// Engine-wide defaults applied when a question leaves them unset.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingSettings {
    pub default_tolerance: Tolerance,
    /// Fraction of max points awarded for partial credit.
    pub partial_credit_fraction: f64,
    /// Default expansion multiple for `close` partial credit.
    pub partial_range: f64,
    /// Lift the script sandbox's safety restrictions.
    pub allow_unsafe: bool,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            default_tolerance: Tolerance::default(),
            partial_credit_fraction: 0.5,
            partial_range: 2.0,
            allow_unsafe: false,
        }
    }
}

/// Everything a grader may consult while being set up.
pub struct SetupContext<'a> {
    /// Authoring-context variables of the enclosing problem.
    pub context: &'a BTreeMap<String, serde_json::Value>,
    /// Worked solutions of the enclosing problem.
    pub solutions: &'a [Solution],
    pub rng: &'a GroupRng,
    pub evaluator: &'a dyn Evaluator,
    pub settings: &'a GradingSettings,
}

/// Collaborators available during a grading pass.
pub struct GradeContext<'a> {
    pub evaluator: &'a dyn Evaluator,
    pub sandbox: Option<&'a dyn ScriptSandbox>,
    pub seed: u64,
    pub allow_unsafe: bool,
}

/// A prepared question, ready to grade submissions.
#[derive(Debug, Clone)]
pub enum Grader {
    ChoiceSet(ChoiceSetGrader),
    Numerical(NumericalGrader),
    Option(OptionGrader),
    MultipleChoice(MultipleChoiceGrader),
    Scripted(ScriptedGrader),
}

impl Grader {
    /// Build the grader for `question`.
    pub fn setup(question: &Question, ctx: &SetupContext<'_>) -> Result<Self> {
        let grader = match &question.kind {
            QuestionKind::ChoiceSet(spec) => {
                Grader::ChoiceSet(ChoiceSetGrader::setup(question, spec, ctx)?)
            }
            QuestionKind::Numerical(spec) => {
                Grader::Numerical(NumericalGrader::setup(question, spec, ctx)?)
            }
            QuestionKind::Option(spec) => Grader::Option(OptionGrader::setup(question, spec, ctx)?),
            QuestionKind::MultipleChoice(spec) => {
                Grader::MultipleChoice(MultipleChoiceGrader::setup(question, spec, false, ctx)?)
            }
            QuestionKind::TrueFalse(spec) => {
                Grader::MultipleChoice(MultipleChoiceGrader::setup(question, spec, true, ctx)?)
            }
            QuestionKind::Scripted(spec) => {
                Grader::Scripted(ScriptedGrader::setup(question, spec, ctx)?)
            }
        };
        tracing::debug!(question = %question.id, kind = question.kind.name(), "prepared question");
        Ok(grader)
    }

    /// Id of the question this grader was built from.
    pub fn question_id(&self) -> &str {
        match self {
            Grader::ChoiceSet(g) => g.question_id(),
            Grader::Numerical(g) => g.question_id(),
            Grader::Option(g) => g.question_id(),
            Grader::MultipleChoice(g) => g.question_id(),
            Grader::Scripted(g) => g.question_id(),
        }
    }

    pub fn max_points(&self) -> f64 {
        match self {
            Grader::ChoiceSet(g) => g.max_points(),
            Grader::Numerical(g) => g.max_points(),
            Grader::Option(g) => g.max_points(),
            Grader::MultipleChoice(g) => g.max_points(),
            Grader::Scripted(g) => g.max_points(),
        }
    }

    /// Answer ids this grader writes into its map.
    pub fn answer_ids(&self) -> Vec<String> {
        match self {
            Grader::ChoiceSet(g) => g.answer_ids(),
            Grader::Numerical(g) => g.answer_ids(),
            Grader::Option(g) => g.answer_ids(),
            Grader::MultipleChoice(g) => g.answer_ids(),
            Grader::Scripted(g) => g.answer_ids(),
        }
    }

    /// Expected values per answer id, for "show answer".
    pub fn correct_answers(&self) -> BTreeMap<String, Vec<String>> {
        match self {
            Grader::ChoiceSet(g) => g.correct_answers(),
            Grader::Numerical(g) => g.correct_answers(),
            Grader::Option(g) => g.correct_answers(),
            Grader::MultipleChoice(g) => g.correct_answers(),
            Grader::Scripted(g) => g.correct_answers(),
        }
    }

    /// Grade one submission.
    pub fn grade(&self, submission: &Submission, ctx: &GradeContext<'_>) -> Result<CorrectMap> {
        match self {
            Grader::ChoiceSet(g) => Ok(g.grade(submission)),
            Grader::Numerical(g) => g.grade(submission, ctx.evaluator),
            Grader::Option(g) => Ok(g.grade(submission)),
            Grader::MultipleChoice(g) => Ok(g.grade(submission)),
            Grader::Scripted(g) => g.grade(submission, ctx),
        }
    }
}

/// Substitute `$name` and `${name}` references to context variables.
/// Unknown names are left as written.
pub fn contextualize(text: &str, context: &BTreeMap<String, serde_json::Value>) -> String {
    if context.is_empty() || !text.contains('$') {
        return text.to_string();
    }

    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('$') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        match context.get(name) {
            Some(value) if !name.is_empty() => {
                result.push_str(&context_value_text(value));
                rest = &after[consumed..];
            }
            _ => {
                result.push('$');
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

/// Split a comma-separated `partial_credit` attribute into lowercase
/// keywords. `false`, `none` and empty mean no partial credit.
pub(crate) fn credit_keywords(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty() && w != "false" && w != "none")
                .collect()
        })
        .unwrap_or_default()
}

/// Split a comma-separated list, trimming each entry.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|w| w.trim().to_string()).collect()
}

/// Round to two decimals, as credit amounts are reported.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
