//! Moving a [`ScriptContext`] into a rhai scope and the accumulators back out.

use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Scope, INT};
use serde_json::Value;

use answerkey_core::error::SandboxError;
use answerkey_core::model::SubmissionValue;
use answerkey_core::traits::{ScriptContext, ScriptOutcome};

fn encode<T: serde::Serialize + ?Sized>(name: &str, value: &T) -> Result<Dynamic, SandboxError> {
    to_dynamic(value)
        .map_err(|e| SandboxError::Execution(format!("cannot pass '{name}' to script: {e}")))
}

/// Script-visible variables: `response_id`, `expect`, `submission`,
/// `idset`, `answers`, `options`, `extra_args`, `seed`, plus the mutable
/// accumulators `correct`, `messages`, `overall_message`, `grade_decimals`.
pub fn build_scope(ctx: &ScriptContext) -> Result<Scope<'static>, SandboxError> {
    let mut scope = Scope::new();
    scope
        .push("response_id", ctx.response_id.clone())
        .push("expect", ctx.expect.clone().unwrap_or_default())
        .push_dynamic("submission", encode("submission", &ctx.submission)?)
        .push_dynamic("idset", encode("idset", &ctx.idset)?)
        .push_dynamic("answers", encode("answers", &ctx.answers)?)
        .push("options", ctx.options.clone().unwrap_or_default())
        .push_dynamic("extra_args", encode("extra_args", &ctx.extra_args)?)
        .push("seed", ctx.seed as INT)
        .push_dynamic("correct", encode("correct", &ctx.correct)?)
        .push_dynamic("messages", encode("messages", &ctx.messages)?)
        .push("overall_message", ctx.overall_message.clone())
        .push("grade_decimals", ());
    Ok(scope)
}

/// The check function's answer argument: the lone value for one field,
/// otherwise the list of values.
pub fn answer_argument(ctx: &ScriptContext) -> Result<Dynamic, SandboxError> {
    match ctx.submission.as_slice() {
        [only] => encode("answer", only),
        many => {
            let values: Vec<&SubmissionValue> = many.iter().collect();
            encode("answer", &values)
        }
    }
}

pub fn extra_args_argument(ctx: &ScriptContext) -> Result<Dynamic, SandboxError> {
    encode("extra_args", &ctx.extra_args)
}

/// Convert any script value to JSON. Unit becomes `null`.
pub fn to_json(value: &Dynamic) -> Result<Value, SandboxError> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    from_dynamic::<Value>(value)
        .map_err(|e| SandboxError::Execution(format!("script returned an unusable value: {e}")))
}

/// Read the accumulators back after an exec-mode run.
pub fn read_outcome(
    scope: &Scope<'_>,
    returned: Option<Value>,
) -> Result<ScriptOutcome, SandboxError> {
    let var = |name: &str| -> Result<Value, SandboxError> {
        scope
            .get_value::<Dynamic>(name)
            .map_or(Ok(Value::Null), |v| to_json(&v))
    };

    let grade_decimals = match var("grade_decimals")? {
        Value::Null => None,
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| {
                        SandboxError::Execution(format!(
                            "grade_decimals entry is not a number: {v}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        ),
        other => {
            return Err(SandboxError::Execution(format!(
                "grade_decimals must be a list, got {other}"
            )))
        }
    };

    Ok(ScriptOutcome {
        returned,
        correct: strings(var("correct")?),
        messages: strings(var("messages")?),
        overall_message: text(&var("overall_message")?),
        grade_decimals,
    })
}

fn strings(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(text).collect(),
        Value::Null => Vec::new(),
        other => vec![text(&other)],
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

