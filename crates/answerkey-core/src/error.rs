//! Grading error types.
//!
//! Three families matter to callers: content errors (the author's question is
//! broken), input errors (the learner's text can't be graded and should be
//! re-prompted), and scoring errors (an external check script failed). Each
//! is a distinct variant of [`GradeError`] so callers can branch without
//! string matching.

use thiserror::Error;

/// Malformed author data. Always fatal for the question.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContentError {
    /// A tolerance attribute that is neither a number nor a percentage.
    #[error("invalid tolerance '{0}'")]
    InvalidTolerance(String),

    /// The `answer_pool` attribute is not an integer.
    #[error("answer-pool value should be an integer, got '{0}'")]
    InvalidPoolSize(String),

    /// Pool sampling needs something to sample on both sides.
    #[error("choice group must include at least 1 correct and 1 incorrect choice")]
    InsufficientPoolChoices,

    #[error("do not use shuffle and answer-pool at the same time")]
    ShuffleWithPool,

    /// A `partial_credit` keyword the response kind does not understand.
    #[error("unknown partial_credit value '{value}', expected one of: {expected}")]
    UnknownPartialCredit {
        value: String,
        expected: &'static str,
    },

    /// The staff answer does not evaluate to a number.
    #[error("there was a problem with the staff answer '{0}'")]
    InvalidStaffAnswer(String),

    #[error("'{0}' is not a valid range answer")]
    InvalidRange(String),

    #[error("there was a problem with the staff answer to this problem: complex boundary '{0}'")]
    ComplexBoundary(String),

    #[error("there was a problem with the staff answer to this problem: empty boundary")]
    EmptyBoundary,

    #[error("invalid partial credit range '{0}'")]
    InvalidPartialRange(String),

    /// `partial_credit = "list"` without any alternates to compare against.
    #[error("partial_credit 'list' requires partial_answers")]
    MissingPartialAnswers,

    #[error("field '{field}' declares {values} point values for {partials} partial answers")]
    PointValuesMismatch {
        field: String,
        values: usize,
        partials: usize,
    },

    #[error("invalid point value '{0}'")]
    InvalidPointValue(String),

    #[error("scripted question '{0}' has no check script")]
    MissingScript(String),

    /// Scripted field ids are ordered by their trailing `_N` position.
    #[error("answer field id '{0}' has no trailing position number")]
    InvalidFieldId(String),

    #[error("question '{0}' declares no answer fields")]
    NoFields(String),
}

/// The learner's answer could not be interpreted. The answer stays ungraded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("You may not use variables ({0}) in numerical problems.")]
    UndefinedVariable(String),

    #[error("Invalid math syntax: '{0}'")]
    MalformedSyntax(String),

    #[error("factorial function evaluated outside its domain: '{0}'")]
    FactorialDomain(String),

    #[error("You may not use complex numbers in range tolerance problems")]
    ComplexInRange,

    #[error("Could not interpret '{0}' as a number.")]
    NotANumber(String),

    #[error("no answer was submitted for '{0}'")]
    MissingAnswer(String),
}

/// Failures from the expression evaluator collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("undefined variable(s): {}", .0.join(", "))]
    UndefinedVariable(Vec<String>),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("domain error: {0}")]
    Domain(String),

    #[error("{0}")]
    Other(String),
}

/// Failures from the external script sandbox.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    #[error("script execution failed: {0}")]
    Execution(String),

    #[error("script timed out after {0}ms")]
    Timeout(u64),

    #[error("script exceeded its resource budget: {0}")]
    ResourceLimit(String),

    #[error("no script sandbox is configured")]
    Unavailable,
}

/// Top-level grading error.
#[derive(Debug, Error)]
pub enum GradeError {
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    #[error("{0}")]
    Input(#[from] InputError),

    /// The check script failed or returned something unusable.
    #[error("scoring error: {message}")]
    Scoring {
        message: String,
        #[source]
        source: Option<SandboxError>,
    },

    /// An API was called in a state that doesn't support it.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("type error: {0}")]
    TypeMismatch(String),
}

impl GradeError {
    /// A scoring error for a check function return value of the wrong shape.
    pub fn invalid_response(detail: impl Into<String>) -> Self {
        GradeError::Scoring {
            message: detail.into(),
            source: None,
        }
    }

    pub fn is_content_error(&self) -> bool {
        matches!(self, GradeError::Content(_))
    }

    pub fn is_input_error(&self) -> bool {
        matches!(self, GradeError::Input(_))
    }

    pub fn is_scoring_error(&self) -> bool {
        matches!(self, GradeError::Scoring { .. })
    }
}

impl From<SandboxError> for GradeError {
    fn from(err: SandboxError) -> Self {
        GradeError::Scoring {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Result alias used throughout the grading code.
pub type Result<T, E = GradeError> = std::result::Result<T, E>;
