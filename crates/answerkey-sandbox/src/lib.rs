//! answerkey-sandbox: check scripts run in an embedded rhai engine.
//!
//! Every run gets a fresh engine with an operation budget and a wall-clock
//! timeout. Scripts either define a check function called as
//! `check(expect, answer)` (or `check(expect, answer, extra_args)` when the
//! question passes extra arguments), or run top to bottom and fill in the
//! `correct`, `messages`, `overall_message` and `grade_decimals` variables.

pub mod engine;
pub mod scope;

use std::time::Duration;

use rhai::Dynamic;

use answerkey_core::config::SandboxConfig;
use answerkey_core::error::SandboxError;
use answerkey_core::traits::{ScriptContext, ScriptOutcome, ScriptSandbox};

use crate::engine::{build_engine, parse_error, runtime_error, Limits};

/// Script sandbox backed by rhai.
#[derive(Debug, Clone)]
pub struct RhaiSandbox {
    timeout: Duration,
    max_operations: u64,
    allow_unsafe: bool,
}

impl Default for RhaiSandbox {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl RhaiSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_operations: config.max_operations,
            allow_unsafe: config.allow_unsafe,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    pub fn allow_unsafe(mut self, allow: bool) -> Self {
        self.allow_unsafe = allow;
        self
    }

    fn limits(&self, context: &ScriptContext) -> Limits {
        Limits {
            timeout: self.timeout,
            max_operations: self.max_operations,
            allow_unsafe: self.allow_unsafe || context.allow_unsafe,
        }
    }
}

impl ScriptSandbox for RhaiSandbox {
    fn name(&self) -> &str {
        "rhai"
    }

    fn run(&self, script: &str, context: ScriptContext) -> Result<ScriptOutcome, SandboxError> {
        let limits = self.limits(&context);
        let engine = build_engine(limits);
        let ast = engine.compile(script).map_err(parse_error)?;
        let mut scope = scope::build_scope(&context)?;

        let returned = match &context.check_function {
            Some(name) => {
                tracing::debug!(
                    question = %context.response_id,
                    function = %name,
                    "calling check function"
                );
                let expect = context.expect.clone().unwrap_or_default();
                let answer = scope::answer_argument(&context)?;
                let result = if context.extra_args.is_empty() {
                    engine.call_fn::<Dynamic>(&mut scope, &ast, name, (expect, answer))
                } else {
                    let extra = scope::extra_args_argument(&context)?;
                    engine.call_fn::<Dynamic>(&mut scope, &ast, name, (expect, answer, extra))
                };
                let value = result.map_err(|e| runtime_error(e, limits))?;
                Some(scope::to_json(&value)?)
            }
            None => {
                engine
                    .run_ast_with_scope(&mut scope, &ast)
                    .map_err(|e| runtime_error(e, limits))?;
                None
            }
        };

        scope::read_outcome(&scope, returned)
    }
}
