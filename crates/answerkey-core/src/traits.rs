//! Collaborator traits for expression evaluation and script execution.
//!
//! The grading engine never evaluates math or runs author scripts itself.
//! [`Evaluator`] is implemented by [`crate::calc::Calculator`] and
//! [`ScriptSandbox`] by the `answerkey-sandbox` crate.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, SandboxError};
use crate::model::SubmissionValue;
use crate::number::Complex;

// ---------------------------------------------------------------------------
// Expression evaluator
// ---------------------------------------------------------------------------

/// A single-argument math function callable from expressions.
pub type MathFn = fn(Complex) -> Result<Complex, EvalError>;

/// Evaluates arithmetic expressions to (possibly complex) numbers.
pub trait Evaluator: Send + Sync {
    /// Evaluate `expression` with the given extra variables and functions
    /// layered over the evaluator's built-ins.
    fn evaluate(
        &self,
        variables: &HashMap<String, Complex>,
        functions: &HashMap<String, MathFn>,
        expression: &str,
    ) -> Result<Complex, EvalError>;
}

// ---------------------------------------------------------------------------
// Script sandbox
// ---------------------------------------------------------------------------

/// Runs author-supplied check scripts under a resource budget.
pub trait ScriptSandbox: Send + Sync {
    /// Human-readable sandbox name (e.g. "rhai").
    fn name(&self) -> &str;

    /// Execute `script` against `context` and hand back the check result.
    fn run(&self, script: &str, context: ScriptContext) -> Result<ScriptOutcome, SandboxError>;
}

/// Everything a check script can see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptContext {
    /// Id of the question being graded.
    pub response_id: String,
    /// Expected answer, if the question declares one.
    pub expect: Option<String>,
    /// Ordered submitted values, one per field in `idset`.
    pub submission: Vec<SubmissionValue>,
    /// Field ids in position order.
    pub idset: Vec<String>,
    /// The whole submission, keyed by answer id.
    pub answers: BTreeMap<String, SubmissionValue>,
    /// Free-form options string passed through from the question.
    pub options: Option<String>,
    /// Named extra arguments for the check function.
    pub extra_args: BTreeMap<String, String>,
    /// When set, call this function as `f(expect, answer)` instead of
    /// reading the accumulators.
    pub check_function: Option<String>,
    /// Seed of the problem, for scripts that randomize.
    pub seed: u64,
    /// Lifts the sandbox's safety restrictions.
    pub allow_unsafe: bool,
    /// Per-field verdict accumulator, pre-filled with "unknown".
    pub correct: Vec<String>,
    /// Per-field message accumulator.
    pub messages: Vec<String>,
    /// Message for the whole question.
    pub overall_message: String,
}

impl ScriptContext {
    /// Fresh context with empty accumulators for `idset`.
    pub fn new(response_id: &str, idset: Vec<String>, submission: Vec<SubmissionValue>) -> Self {
        let n = idset.len();
        Self {
            response_id: response_id.to_string(),
            expect: None,
            submission,
            idset,
            answers: BTreeMap::new(),
            options: None,
            extra_args: BTreeMap::new(),
            check_function: None,
            seed: 0,
            allow_unsafe: false,
            correct: vec!["unknown".to_string(); n],
            messages: vec![String::new(); n],
            overall_message: String::new(),
        }
    }
}

/// What came back from a script run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptOutcome {
    /// The check function's return value, when one was called or the
    /// script's final expression produced a value.
    pub returned: Option<serde_json::Value>,
    /// Accumulators as left by the script.
    pub correct: Vec<String>,
    pub messages: Vec<String>,
    pub overall_message: String,
    /// Optional per-field credit fractions set by the script.
    pub grade_decimals: Option<Vec<f64>>,
}
