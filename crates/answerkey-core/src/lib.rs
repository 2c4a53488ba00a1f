//! answerkey-core: response grading engine.
//!
//! This crate defines the question model, the per-kind graders with their
//! partial-credit rules, numeric tolerance and range logic, seeded choice
//! randomization, and the engine that grades submissions in batches.

pub mod calc;
pub mod config;
pub mod correctmap;
pub mod engine;
pub mod error;
pub mod model;
pub mod number;
pub mod parser;
pub mod randomize;
pub mod report;
pub mod responses;
pub mod tolerance;
pub mod traits;

pub use correctmap::{CorrectEntry, CorrectMap, Correctness};
pub use error::{ContentError, EvalError, GradeError, InputError, SandboxError};
pub use number::Complex;
