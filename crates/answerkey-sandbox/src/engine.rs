//! Construction of a resource-limited rhai engine.

use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult, ParseError};

use answerkey_core::error::SandboxError;

/// Token the progress callback terminates a run with when time is up.
const TIMEOUT_TOKEN: &str = "timeout";

/// Limits applied to every script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    pub max_operations: u64,
    /// Re-enable `eval` inside scripts.
    pub allow_unsafe: bool,
}

/// Build an engine for one run. The wall clock starts now.
pub fn build_engine(limits: Limits) -> Engine {
    let mut engine = Engine::new();
    engine
        .set_max_operations(limits.max_operations)
        .set_max_expr_depths(64, 32)
        .set_max_call_levels(32)
        .set_max_string_size(64 * 1024)
        .set_max_array_size(10_000)
        .set_max_map_size(10_000);

    if !limits.allow_unsafe {
        engine.disable_symbol("eval");
    }

    engine
        .on_print(|text| tracing::debug!(target: "answerkey::script", "{}", text))
        .on_debug(|text, source, pos| {
            tracing::debug!(target: "answerkey::script", "{} {:?} @ {}", text, source, pos)
        });

    let started = Instant::now();
    let timeout = limits.timeout;
    engine.on_progress(move |_ops| {
        if started.elapsed() > timeout {
            Some(Dynamic::from(TIMEOUT_TOKEN.to_string()))
        } else {
            None
        }
    });

    engine
}

/// Map a rhai runtime failure to a sandbox error.
pub fn runtime_error(err: Box<EvalAltResult>, limits: Limits) -> SandboxError {
    match *err {
        EvalAltResult::ErrorTerminated(ref token, _)
            if token.clone().into_string().ok().as_deref() == Some(TIMEOUT_TOKEN) =>
        {
            SandboxError::Timeout(limits.timeout.as_millis() as u64)
        }
        EvalAltResult::ErrorTooManyOperations(_) => SandboxError::ResourceLimit(format!(
            "more than {} operations",
            limits.max_operations
        )),
        EvalAltResult::ErrorStackOverflow(_) => {
            SandboxError::ResourceLimit("call stack overflow".into())
        }
        EvalAltResult::ErrorDataTooLarge(ref what, _) => {
            SandboxError::ResourceLimit(format!("{what} too large"))
        }
        ref other => SandboxError::Execution(other.to_string()),
    }
}

pub fn parse_error(err: ParseError) -> SandboxError {
    SandboxError::Execution(format!("syntax error: {err}"))
}
