//! Single-answer multiple choice, with shuffle, answer pool and masking.
//! True/false questions reuse the same setup but grade by set equality.

use std::collections::{BTreeMap, BTreeSet};

use crate::correctmap::{CorrectEntry, CorrectMap};
use crate::error::{ContentError, Result};
use crate::model::{ChoiceCorrectness, MultipleChoiceSpec, Question, Solution, Submission};
use crate::randomize::ChoiceGroup;

use super::{credit_keywords, SetupContext};

#[derive(Debug, Clone)]
pub struct MultipleChoiceGrader {
    answer_id: String,
    max_points: f64,
    true_false: bool,
    points_mode: bool,
    group: ChoiceGroup,
    correct: Vec<String>,
    partial: Vec<String>,
    partial_values: Vec<f64>,
    solutions: Vec<Solution>,
}

impl MultipleChoiceGrader {
    pub fn setup(
        question: &Question,
        spec: &MultipleChoiceSpec,
        true_false: bool,
        ctx: &SetupContext<'_>,
    ) -> Result<Self> {
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

        let mut group = ChoiceGroup::new(&spec.choices, spec.masked && !true_false, ctx.rng);

        let default_value = ctx.settings.partial_credit_fraction * question.max_points;
        let mut correct = Vec::new();
        let mut partial = Vec::new();
        let mut partial_values = Vec::new();
        for nc in group.choices() {
            match nc.choice.correct {
                ChoiceCorrectness::True => correct.push(nc.name.clone()),
                ChoiceCorrectness::Partial => {
                    partial.push(nc.name.clone());
                    partial_values.push(nc.choice.point_value.unwrap_or(default_value));
                }
                ChoiceCorrectness::False => {}
            }
        }

        if !true_false {
            group.randomize(spec.shuffle, spec.answer_pool.as_deref(), ctx.rng)?;
        }

        Ok(Self {
            answer_id: question.id.clone(),
            max_points: question.max_points,
            true_false,
            points_mode,
            group,
            correct,
            partial,
            partial_values,
            solutions: ctx.solutions.to_vec(),
        })
    }

    pub fn question_id(&self) -> &str {
        &self.answer_id
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    pub fn is_true_false(&self) -> bool {
        self.true_false
    }

    pub fn answer_ids(&self) -> Vec<String> {
        vec![self.answer_id.clone()]
    }

    pub fn correct_answers(&self) -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([(self.answer_id.clone(), self.correct.clone())])
    }

    /// The displayed choices and their randomization state.
    pub fn group(&self) -> &ChoiceGroup {
        &self.group
    }

    pub fn grade(&self, submission: &Submission) -> CorrectMap {
        let mut cmap = CorrectMap::with_max_points(self.max_points);
        let answer = submission.get(&self.answer_id);

        let entry = if self.true_false {
            let selected: BTreeSet<&str> = answer
                .map(|v| v.as_list())
                .unwrap_or_default()
                .into_iter()
                .collect();
            let expected: BTreeSet<&str> = self.correct.iter().map(String::as_str).collect();
            if selected == expected {
                CorrectEntry::correct()
            } else {
                CorrectEntry::incorrect()
            }
        } else {
            match answer.and_then(|v| v.as_single()) {
                Some(a) if self.correct.iter().any(|c| c == a) => CorrectEntry::correct(),
                Some(a) if self.points_mode => match self.partial.iter().position(|p| p == a) {
                    Some(index) => CorrectEntry::partial(self.partial_values[index]),
                    None => CorrectEntry::incorrect(),
                },
                _ => CorrectEntry::incorrect(),
            }
        };
        cmap.set(&self.answer_id, entry);
        cmap
    }

    /// Regular name behind a masked one.
    pub fn unmask(&self, name: &str) -> Result<String> {
        self.group.unmask(name)
    }

    /// Regular names in the order shown to the learner.
    pub fn display_order(&self) -> Vec<String> {
        self.group.display_order()
    }

    /// Explanation id of the correct choice picked by the answer pool.
    pub fn solution_id(&self) -> Option<&str> {
        self.group.solution_id()
    }

    /// Solutions to show. With an answer pool, only those explaining the
    /// correct choice that was actually shown.
    pub fn visible_solutions(&self) -> Vec<&Solution> {
        if !self.group.has_answer_pool() {
            return self.solutions.iter().collect();
        }
        self.solutions
            .iter()
            .filter(|s| s.explanation_id.as_deref() == self.solution_id())
            .collect()
    }
}
