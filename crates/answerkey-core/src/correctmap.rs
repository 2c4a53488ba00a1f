//! The grading result ledger.
//!
//! A [`CorrectMap`] maps each answer id to a [`CorrectEntry`] verdict. Every
//! grader writes into one; callers read it for scoring and feedback.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GradeError, Result};

/// Verdict for a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Correctness {
    Correct,
    Incorrect,
    PartiallyCorrect,
}

impl fmt::Display for Correctness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Correctness::Correct => write!(f, "correct"),
            Correctness::Incorrect => write!(f, "incorrect"),
            Correctness::PartiallyCorrect => write!(f, "partially-correct"),
        }
    }
}

impl FromStr for Correctness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "correct" => Ok(Correctness::Correct),
            "incorrect" => Ok(Correctness::Incorrect),
            "partially-correct" | "partially_correct" => Ok(Correctness::PartiallyCorrect),
            other => Err(format!("unknown correctness: {other}")),
        }
    }
}

/// When a hint is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HintMode {
    Never,
    Always,
    OnDemand,
}

/// Bookkeeping for answers graded asynchronously by an external queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueState {
    /// Secret key the queue must echo back.
    pub key: String,
    /// Enqueue timestamp, as given by the queue.
    pub time: String,
}

/// One answer's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectEntry {
    pub correctness: Correctness,
    /// Explicit points; `None` falls back to the map's default rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npoints: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_mode: Option<HintMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_state: Option<QueueState>,
    /// Name of the authoring-context variable whose value matched the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_variable: Option<String>,
}

impl CorrectEntry {
    pub fn new(correctness: Correctness) -> Self {
        Self {
            correctness,
            npoints: None,
            msg: None,
            hint: None,
            hint_mode: None,
            queue_state: None,
            answer_variable: None,
        }
    }

    pub fn correct() -> Self {
        Self::new(Correctness::Correct)
    }

    pub fn incorrect() -> Self {
        Self::new(Correctness::Incorrect)
    }

    /// Partial credit always carries explicit points.
    pub fn partial(points: f64) -> Self {
        Self::new(Correctness::PartiallyCorrect).points(points)
    }

    pub fn points(mut self, points: f64) -> Self {
        self.npoints = Some(points);
        self
    }

    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn hint(mut self, hint: impl Into<String>, mode: HintMode) -> Self {
        self.hint = Some(hint.into());
        self.hint_mode = Some(mode);
        self
    }

    pub fn queued(mut self, state: QueueState) -> Self {
        self.queue_state = Some(state);
        self
    }
}

fn default_max_points() -> f64 {
    1.0
}

/// Mapping from answer id to verdict, plus a question-wide message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectMap {
    #[serde(default)]
    entries: BTreeMap<String, CorrectEntry>,
    #[serde(default)]
    overall_message: String,
    /// Points an unscored correct answer is worth.
    #[serde(default = "default_max_points")]
    max_points: f64,
}

impl Default for CorrectMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectMap {
    pub fn new() -> Self {
        Self::with_max_points(default_max_points())
    }

    pub fn with_max_points(max_points: f64) -> Self {
        Self {
            entries: BTreeMap::new(),
            overall_message: String::new(),
            max_points,
        }
    }

    /// Insert or overwrite the verdict for `answer_id`.
    pub fn set(&mut self, answer_id: impl Into<String>, entry: CorrectEntry) {
        self.entries.insert(answer_id.into(), entry);
    }

    /// Overwrite just the points of an existing entry.
    pub fn set_points(&mut self, answer_id: &str, points: f64) {
        if let Some(entry) = self.entries.get_mut(answer_id) {
            entry.npoints = Some(points);
        }
    }

    pub fn set_hint_and_mode(&mut self, answer_id: &str, hint: impl Into<String>, mode: HintMode) {
        if let Some(entry) = self.entries.get_mut(answer_id) {
            entry.hint = Some(hint.into());
            entry.hint_mode = Some(mode);
        }
    }

    pub fn set_answer_variable(&mut self, answer_id: &str, variable: impl Into<String>) {
        if let Some(entry) = self.entries.get_mut(answer_id) {
            entry.answer_variable = Some(variable.into());
        }
    }

    pub fn entry(&self, answer_id: &str) -> Option<&CorrectEntry> {
        self.entries.get(answer_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &CorrectEntry)> {
        self.entries.iter()
    }

    pub fn contains(&self, answer_id: &str) -> bool {
        self.entries.contains_key(answer_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    pub fn get_correctness(&self, answer_id: &str) -> Option<Correctness> {
        self.entries.get(answer_id).map(|e| e.correctness)
    }

    /// Points for `answer_id`.
    ///
    /// Explicit points win. Otherwise a correct or partially-correct answer
    /// is worth the map's max points and anything else is worth zero.
    pub fn get_points(&self, answer_id: &str) -> f64 {
        let Some(entry) = self.entries.get(answer_id) else {
            return 0.0;
        };
        match (entry.npoints, entry.correctness) {
            (Some(points), _) => points,
            (None, Correctness::Correct | Correctness::PartiallyCorrect) => self.max_points,
            (None, Correctness::Incorrect) => 0.0,
        }
    }

    /// Sum of points across all entries.
    pub fn total_points(&self) -> f64 {
        self.entries.keys().map(|id| self.get_points(id)).sum()
    }

    /// True for any answer that earned credit, partial included.
    pub fn is_correct(&self, answer_id: &str) -> bool {
        matches!(
            self.get_correctness(answer_id),
            Some(Correctness::Correct | Correctness::PartiallyCorrect)
        )
    }

    pub fn is_partially_correct(&self, answer_id: &str) -> bool {
        self.get_correctness(answer_id) == Some(Correctness::PartiallyCorrect)
    }

    pub fn is_queued(&self, answer_id: &str) -> bool {
        self.entries
            .get(answer_id)
            .is_some_and(|e| e.queue_state.is_some())
    }

    /// Whether `candidate` matches the stored queue key. False when the
    /// answer isn't queued or no candidate is given.
    pub fn is_right_queue_key(&self, answer_id: &str, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };
        self.entries
            .get(answer_id)
            .and_then(|e| e.queue_state.as_ref())
            .is_some_and(|q| q.key == candidate)
    }

    pub fn get_queue_time(&self, answer_id: &str) -> Option<&str> {
        self.entries
            .get(answer_id)
            .and_then(|e| e.queue_state.as_ref())
            .map(|q| q.time.as_str())
    }

    pub fn get_message(&self, answer_id: &str) -> Option<&str> {
        self.entries.get(answer_id).and_then(|e| e.msg.as_deref())
    }

    pub fn get_hint(&self, answer_id: &str) -> Option<&str> {
        self.entries.get(answer_id).and_then(|e| e.hint.as_deref())
    }

    pub fn get_hint_mode(&self, answer_id: &str) -> Option<HintMode> {
        self.entries.get(answer_id).and_then(|e| e.hint_mode)
    }

    pub fn get_answer_variable(&self, answer_id: &str) -> Option<&str> {
        self.entries
            .get(answer_id)
            .and_then(|e| e.answer_variable.as_deref())
    }

    /// `None` clears the message.
    pub fn set_overall_message(&mut self, message: Option<&str>) {
        self.overall_message = message.unwrap_or_default().to_string();
    }

    pub fn get_overall_message(&self) -> &str {
        &self.overall_message
    }

    /// Copy every entry and the overall message from `other`, overwriting
    /// collisions.
    pub fn update(&mut self, other: &CorrectMap) {
        for (id, entry) in &other.entries {
            self.entries.insert(id.clone(), entry.clone());
        }
        self.overall_message = other.overall_message.clone();
    }

    /// [`update`](Self::update) from an untyped JSON value, as stored by a
    /// persistence layer. Anything that isn't a serialized map is rejected.
    pub fn update_from_value(&mut self, value: &serde_json::Value) -> Result<()> {
        if !value.is_object() {
            return Err(GradeError::TypeMismatch(format!(
                "cannot update a CorrectMap from {}",
                json_kind(value)
            )));
        }
        let other: CorrectMap = serde_json::from_value(value.clone())
            .map_err(|e| GradeError::TypeMismatch(format!("not a CorrectMap: {e}")))?;
        self.update(&other);
        Ok(())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
