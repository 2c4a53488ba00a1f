//! Questions graded by an author-supplied check script.
//!
//! The script runs in a [`ScriptSandbox`](crate::traits::ScriptSandbox).
//! Whatever comes back (a bare verdict, an `{ok, msg, grade_decimal}`
//! record, an `{input_list, overall_message}` record, or the accumulators
//! the script filled in) is normalized into a [`CheckResult`] before it
//! touches the correct map.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::correctmap::{CorrectEntry, CorrectMap, Correctness};
use crate::error::{ContentError, GradeError, InputError, Result, SandboxError};
use crate::model::{Question, ScriptedSpec, Submission, SubmissionValue};
use crate::traits::{ScriptContext, ScriptOutcome};

use super::{contextualize, GradeContext, SetupContext};

const EMPTY_ANSWER_MSG: &str = "No answer entered!";

/// Verdict for one input field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldVerdict {
    pub correctness: Correctness,
    pub message: String,
    /// Fraction of max points; `None` uses the default for the verdict.
    pub grade_decimal: Option<f64>,
}

/// A script's result, one verdict per field plus a question-wide message.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub fields: Vec<FieldVerdict>,
    pub overall_message: String,
}

#[derive(Debug, Clone)]
pub struct ScriptedGrader {
    question_id: String,
    max_points: f64,
    idset: Vec<String>,
    script: String,
    cfn: Option<String>,
    expect: Option<String>,
    options: Option<String>,
    extra_args: BTreeMap<String, String>,
    empty_answer_err: bool,
    fraction: f64,
}

impl ScriptedGrader {
    pub fn setup(question: &Question, spec: &ScriptedSpec, ctx: &SetupContext<'_>) -> Result<Self> {
        if spec.fields.is_empty() {
            return Err(ContentError::NoFields(question.id.clone()).into());
        }
        let script = spec
            .script
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ContentError::MissingScript(question.id.clone()))?;

        Ok(Self {
            question_id: question.id.clone(),
            max_points: question.max_points,
            idset: order_fields(&spec.fields)?,
            script,
            cfn: spec.cfn.clone(),
            expect: spec.expect.as_deref().map(|e| contextualize(e, ctx.context)),
            options: spec.options.clone(),
            extra_args: spec
                .extra_args
                .iter()
                .map(|(k, v)| (k.clone(), contextualize(v, ctx.context)))
                .collect(),
            empty_answer_err: spec.empty_answer_err,
            fraction: ctx.settings.partial_credit_fraction,
        })
    }

    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    /// Field ids in position order.
    pub fn answer_ids(&self) -> Vec<String> {
        self.idset.clone()
    }

    pub fn correct_answers(&self) -> BTreeMap<String, Vec<String>> {
        match &self.expect {
            Some(expect) => self
                .idset
                .iter()
                .map(|id| (id.clone(), vec![expect.clone()]))
                .collect(),
            None => BTreeMap::new(),
        }
    }

    pub fn grade(&self, submission: &Submission, ctx: &GradeContext<'_>) -> Result<CorrectMap> {
        let mut cmap = CorrectMap::with_max_points(self.max_points);

        if let [only] = self.idset.as_slice() {
            if submission.get(only).map_or(true, SubmissionValue::is_empty) {
                let mut entry = CorrectEntry::incorrect();
                if self.empty_answer_err {
                    entry = entry.message(EMPTY_ANSWER_MSG);
                }
                cmap.set(only, entry);
                return Ok(cmap);
            }
        }

        let values = self
            .idset
            .iter()
            .map(|id| {
                submission
                    .get(id)
                    .cloned()
                    .ok_or_else(|| InputError::MissingAnswer(id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut script_ctx = ScriptContext::new(&self.question_id, self.idset.clone(), values);
        script_ctx.expect = self.expect.clone();
        script_ctx.answers = submission.clone();
        script_ctx.options = self.options.clone();
        script_ctx.extra_args = self.extra_args.clone();
        script_ctx.check_function = self.cfn.clone();
        script_ctx.seed = ctx.seed;
        script_ctx.allow_unsafe = ctx.allow_unsafe;

        let sandbox = ctx.sandbox.ok_or(SandboxError::Unavailable)?;
        let outcome = sandbox.run(&self.script, script_ctx).map_err(|e| {
            tracing::debug!(
                question = %self.question_id,
                sandbox = sandbox.name(),
                "check script failed: {}",
                e
            );
            GradeError::from(e)
        })?;

        let result = normalize_outcome(outcome, self.idset.len())?;
        cmap.set_overall_message(Some(result.overall_message.as_str()));
        for (id, verdict) in self.idset.iter().zip(result.fields) {
            let decimal = verdict
                .grade_decimal
                .unwrap_or_else(|| self.default_decimal(verdict.correctness));
            let mut entry =
                CorrectEntry::new(verdict.correctness).points(self.max_points * decimal);
            if !verdict.message.is_empty() {
                entry = entry.message(verdict.message);
            }
            cmap.set(id, entry);
        }
        Ok(cmap)
    }

    fn default_decimal(&self, correctness: Correctness) -> f64 {
        match correctness {
            Correctness::Correct => 1.0,
            Correctness::PartiallyCorrect => self.fraction,
            Correctness::Incorrect => 0.0,
        }
    }
}

/// Sort field ids by the integer after their last `_`.
fn order_fields(fields: &[String]) -> Result<Vec<String>, ContentError> {
    let mut keyed = fields
        .iter()
        .map(|id| {
            id.rsplit_once('_')
                .and_then(|(_, n)| n.parse::<u64>().ok())
                .map(|n| (n, id.clone()))
                .ok_or_else(|| ContentError::InvalidFieldId(id.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    keyed.sort_by_key(|(n, _)| *n);
    Ok(keyed.into_iter().map(|(_, id)| id).collect())
}

/// Turn whatever the sandbox handed back into one verdict per field.
pub fn normalize_outcome(outcome: ScriptOutcome, fields: usize) -> Result<CheckResult> {
    match outcome.returned {
        Some(value) => normalize_return(&value, fields),
        None => Ok(from_accumulators(outcome, fields)),
    }
}

fn normalize_return(value: &Value, fields: usize) -> Result<CheckResult> {
    match value {
        Value::Object(map) if map.contains_key("ok") => {
            let verdict = record_verdict(value)?;
            let mut result = CheckResult {
                fields: vec![
                    FieldVerdict {
                        message: String::new(),
                        ..verdict.clone()
                    };
                    fields
                ],
                overall_message: String::new(),
            };
            if fields > 1 {
                result.overall_message = verdict.message;
            } else if let Some(first) = result.fields.first_mut() {
                first.message = verdict.message;
            }
            Ok(result)
        }
        Value::Object(map) if map.contains_key("input_list") => {
            let list = map
                .get("input_list")
                .and_then(Value::as_array)
                .ok_or_else(|| GradeError::invalid_response("input_list is not a list"))?;
            if list.len() != fields {
                return Err(GradeError::invalid_response(format!(
                    "input_list has {} entries for {} fields",
                    list.len(),
                    fields
                )));
            }
            Ok(CheckResult {
                fields: list.iter().map(record_verdict).collect::<Result<_>>()?,
                overall_message: map
                    .get("overall_message")
                    .map(message_text)
                    .unwrap_or_default(),
            })
        }
        Value::Object(_) => Err(GradeError::invalid_response(
            "check function returned an invalid dictionary",
        )),
        Value::Array(_) => Err(GradeError::invalid_response(
            "check function returned a list",
        )),
        scalar => Ok(CheckResult {
            fields: vec![
                FieldVerdict {
                    correctness: verdict_of(scalar),
                    message: String::new(),
                    grade_decimal: None,
                };
                fields
            ],
            overall_message: String::new(),
        }),
    }
}

/// One `{ok, msg?, grade_decimal?}` record.
fn record_verdict(record: &Value) -> Result<FieldVerdict> {
    let ok = record
        .get("ok")
        .ok_or_else(|| GradeError::invalid_response("verdict record has no 'ok'"))?;
    let grade_decimal = match record.get("grade_decimal") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_f64().ok_or_else(|| {
            GradeError::invalid_response(format!("grade_decimal is not a number: {v}"))
        })?),
    };
    Ok(FieldVerdict {
        correctness: verdict_of(ok),
        message: record.get("msg").map(message_text).unwrap_or_default(),
        grade_decimal,
    })
}

/// Falsy values are incorrect; anything mentioning "partial" is partial
/// credit; everything else is correct.
fn verdict_of(value: &Value) -> Correctness {
    let falsy = match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    };
    if falsy {
        Correctness::Incorrect
    } else if message_text(value).contains("partial") {
        Correctness::PartiallyCorrect
    } else {
        Correctness::Correct
    }
}

fn message_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn from_accumulators(outcome: ScriptOutcome, fields: usize) -> CheckResult {
    let verdicts = (0..fields)
        .map(|k| {
            let correctness = outcome
                .correct
                .get(k)
                .and_then(|c| c.parse::<Correctness>().ok())
                .unwrap_or_else(|| {
                    tracing::debug!(field = k, "script left no verdict; grading incorrect");
                    Correctness::Incorrect
                });
            FieldVerdict {
                correctness,
                message: outcome.messages.get(k).cloned().unwrap_or_default(),
                grade_decimal: outcome
                    .grade_decimals
                    .as_ref()
                    .and_then(|d| d.get(k).copied()),
            }
        })
        .collect();
    CheckResult {
        fields: verdicts,
        overall_message: outcome.overall_message,
    }
}
