//! Dropdown fields, each with its own correct and partial value lists.

use std::collections::BTreeMap;

use crate::correctmap::{CorrectEntry, CorrectMap};
use crate::error::{ContentError, Result};
use crate::model::{context_value_text, OptionSpec, Question, Submission};

use super::{contextualize, credit_keywords, split_list, SetupContext};

#[derive(Debug, Clone, PartialEq)]
struct FieldRule {
    id: String,
    correct: Vec<String>,
    partial: Vec<String>,
    /// Points for each entry of `partial`.
    points: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct OptionGrader {
    question_id: String,
    max_points: f64,
    fields: Vec<FieldRule>,
    points_mode: bool,
    context: BTreeMap<String, serde_json::Value>,
}

impl OptionGrader {
    pub fn setup(question: &Question, spec: &OptionSpec, ctx: &SetupContext<'_>) -> Result<Self> {
        let points_mode = match credit_keywords(spec.partial_credit.as_deref()).as_slice() {
            [] => false,
            [word] if word == "points" => true,
            other => {
                return Err(ContentError::UnknownPartialCredit {
                    value: other.join(","),
                    expected: "points",
                }
                .into())
            }
        };

        if spec.fields.is_empty() {
            return Err(ContentError::NoFields(question.id.clone()).into());
        }

        let default_points = ctx.settings.partial_credit_fraction * question.max_points;
        let fields = spec
            .fields
            .iter()
            .map(|field| {
                let correct = split_list(&contextualize(&field.correct, ctx.context));
                let partial = field
                    .partial
                    .as_deref()
                    .map(|p| split_list(&contextualize(p, ctx.context)))
                    .unwrap_or_default();
                let points = match field.point_values.as_deref() {
                    Some(raw) => {
                        let values = split_list(&contextualize(raw, ctx.context))
                            .into_iter()
                            .map(|v| {
                                v.parse::<f64>()
                                    .map_err(|_| ContentError::InvalidPointValue(v.clone()))
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        if values.len() != partial.len() {
                            return Err(ContentError::PointValuesMismatch {
                                field: field.id.clone(),
                                values: values.len(),
                                partials: partial.len(),
                            });
                        }
                        values
                    }
                    None => vec![default_points; partial.len()],
                };
                Ok(FieldRule {
                    id: field.id.clone(),
                    correct,
                    partial,
                    points,
                })
            })
            .collect::<Result<Vec<_>, ContentError>>()?;

        Ok(Self {
            question_id: question.id.clone(),
            max_points: question.max_points,
            fields,
            points_mode,
            context: ctx.context.clone(),
        })
    }

    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    pub fn answer_ids(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.id.clone()).collect()
    }

    pub fn correct_answers(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .map(|f| (f.id.clone(), f.correct.clone()))
            .collect()
    }

    /// Values worth partial credit, per field.
    pub fn partial_answers(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .map(|f| (f.id.clone(), f.partial.clone()))
            .collect()
    }

    pub fn grade(&self, submission: &Submission) -> CorrectMap {
        let mut cmap = CorrectMap::with_max_points(self.max_points);
        for field in &self.fields {
            let answer = submission.get(&field.id).and_then(|v| v.as_single());
            let entry = match answer {
                Some(a) if field.correct.iter().any(|c| c == a) => CorrectEntry::correct(),
                Some(a) if self.points_mode => match field.partial.iter().position(|p| p == a) {
                    Some(index) => {
                        tracing::debug!(field = %field.id, "partial option selected");
                        CorrectEntry::partial(field.points[index])
                    }
                    None => CorrectEntry::incorrect(),
                },
                _ => CorrectEntry::incorrect(),
            };
            cmap.set(&field.id, entry);

            if let Some(variable) = answer.and_then(|a| self.answer_variable(a)) {
                cmap.set_answer_variable(&field.id, variable);
            }
        }
        cmap
    }

    /// `$name` of the first context variable whose text equals `answer`.
    fn answer_variable(&self, answer: &str) -> Option<String> {
        self.context
            .iter()
            .find(|(_, value)| context_value_text(value) == answer)
            .map(|(name, _)| format!("${name}"))
    }
}
