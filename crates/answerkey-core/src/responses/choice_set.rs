//! Checkbox "choose all that apply" grading.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::correctmap::{CorrectEntry, CorrectMap};
use crate::error::{ContentError, Result};
use crate::model::{ChoiceCorrectness, ChoiceSetSpec, Question, Submission};
use crate::randomize::assign_names;

use super::{round2, SetupContext};

/// Partial credit formula for a choice set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChoiceSetCredit {
    /// Exact set equality only.
    #[default]
    None,
    /// Half credit off per error.
    Halves,
    /// Every decision counts: one share per correctly handled choice.
    Edc,
}

impl FromStr for ChoiceSetCredit {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "false" | "none" => Ok(ChoiceSetCredit::None),
            "halves" => Ok(ChoiceSetCredit::Halves),
            "edc" | "every_decision_counts" => Ok(ChoiceSetCredit::Edc),
            other => Err(ContentError::UnknownPartialCredit {
                value: other.to_string(),
                expected: "edc, halves, false",
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChoiceSetGrader {
    answer_id: String,
    max_points: f64,
    names: Vec<String>,
    correct: BTreeSet<String>,
    incorrect: BTreeSet<String>,
    credit: ChoiceSetCredit,
}

impl ChoiceSetGrader {
    pub fn setup(
        question: &Question,
        spec: &ChoiceSetSpec,
        _ctx: &SetupContext<'_>,
    ) -> Result<Self> {
        let credit = spec
            .partial_credit
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or_default();

        let named = assign_names(&spec.choices);
        // Partial-tagged choices belong to neither set.
        let names_tagged = |tag: ChoiceCorrectness| -> BTreeSet<String> {
            named
                .iter()
                .filter(|nc| nc.choice.correct == tag)
                .map(|nc| nc.name.clone())
                .collect()
        };

        Ok(Self {
            answer_id: question.id.clone(),
            max_points: question.max_points,
            names: named.iter().map(|nc| nc.name.clone()).collect(),
            correct: names_tagged(ChoiceCorrectness::True),
            incorrect: names_tagged(ChoiceCorrectness::False),
            credit,
        })
    }

    pub fn question_id(&self) -> &str {
        &self.answer_id
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    pub fn credit(&self) -> ChoiceSetCredit {
        self.credit
    }

    /// Choice names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn answer_ids(&self) -> Vec<String> {
        vec![self.answer_id.clone()]
    }

    pub fn correct_answers(&self) -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([(self.answer_id.clone(), self.correct.iter().cloned().collect())])
    }

    pub fn grade(&self, submission: &Submission) -> CorrectMap {
        let mut cmap = CorrectMap::with_max_points(self.max_points);
        let selected: BTreeSet<String> = submission
            .get(&self.answer_id)
            .map(|v| v.as_list().into_iter().map(str::to_string).collect())
            .unwrap_or_default();

        let entry = if selected.is_empty() {
            tracing::debug!(question = %self.answer_id, "empty choice set submission");
            CorrectEntry::incorrect()
        } else {
            match self.credit {
                ChoiceSetCredit::None => self.grade_exact(&selected),
                ChoiceSetCredit::Halves => self.grade_halves(&selected),
                ChoiceSetCredit::Edc => self.grade_edc(&selected),
            }
        };
        cmap.set(&self.answer_id, entry);
        cmap
    }

    fn grade_exact(&self, selected: &BTreeSet<String>) -> CorrectEntry {
        if *selected == self.correct {
            CorrectEntry::correct()
        } else {
            CorrectEntry::incorrect()
        }
    }

    fn grade_halves(&self, selected: &BTreeSet<String>) -> CorrectEntry {
        let wrongly_selected = selected.intersection(&self.incorrect).count();
        let missed = self.correct.difference(selected).count();
        let errors = wrongly_selected + missed;
        let options = self.names.len();

        match errors {
            0 => CorrectEntry::correct().points(self.max_points),
            1 if options > 2 => CorrectEntry::partial(round2(self.max_points / 2.0)),
            2 if options > 4 => CorrectEntry::partial(round2(self.max_points / 4.0)),
            _ => CorrectEntry::incorrect(),
        }
    }

    fn grade_edc(&self, selected: &BTreeSet<String>) -> CorrectEntry {
        let total = self.correct.len() + self.incorrect.len();
        if total == 0 {
            return CorrectEntry::incorrect();
        }
        let handled = self.correct.intersection(selected).count()
            + self.incorrect.difference(selected).count();
        let credit = round2(self.max_points * handled as f64 / total as f64);

        if handled == total {
            CorrectEntry::correct().points(self.max_points)
        } else if handled > 0 {
            CorrectEntry::partial(credit)
        } else {
            CorrectEntry::incorrect().points(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Calculator;
    use crate::correctmap::Correctness;
    use crate::model::{ChoiceDef, QuestionKind, SubmissionValue};
    use crate::randomize::GroupRng;
    use crate::responses::GradingSettings;

    fn grader(pattern: &[bool], credit: Option<&str>) -> ChoiceSetGrader {
        let tags: Vec<ChoiceCorrectness> = pattern
            .iter()
            .map(|&c| {
                if c {
                    ChoiceCorrectness::True
                } else {
                    ChoiceCorrectness::False
                }
            })
            .collect();
        tagged_grader(&tags, credit)
    }

    fn tagged_grader(tags: &[ChoiceCorrectness], credit: Option<&str>) -> ChoiceSetGrader {
        let choices = tags
            .iter()
            .map(|&correct| ChoiceDef {
                name: None,
                correct,
                point_value: None,
                fixed: false,
                explanation_id: None,
                text: String::new(),
            })
            .collect();
        let spec = ChoiceSetSpec {
            choices,
            partial_credit: credit.map(String::from),
        };
        let question = Question {
            id: "q".into(),
            max_points: 1.0,
            kind: QuestionKind::ChoiceSet(spec.clone()),
        };
        let context = BTreeMap::new();
        let rng = GroupRng::new(0);
        let calc = Calculator::new();
        let settings = GradingSettings::default();
        let ctx = SetupContext {
            context: &context,
            solutions: &[],
            rng: &rng,
            evaluator: &calc,
            settings: &settings,
        };
        ChoiceSetGrader::setup(&question, &spec, &ctx).unwrap()
    }

    fn submit(names: &[&str]) -> Submission {
        Submission::from([(
            "q".to_string(),
            SubmissionValue::Multiple(names.iter().map(|s| s.to_string()).collect()),
        )])
    }

    #[test]
    fn exact_match_is_correct_in_every_mode() {
        for mode in [None, Some("halves"), Some("EDC"), Some("false")] {
            let g = grader(&[true, false, true, false, false], mode);
            let cmap = g.grade(&submit(&["choice_0", "choice_2"]));
            assert_eq!(cmap.get_correctness("q"), Some(Correctness::Correct), "{mode:?}");
            assert_eq!(cmap.get_points("q"), 1.0);
        }
    }

    #[test]
    fn empty_submission_is_incorrect_in_every_mode() {
        for mode in [None, Some("halves"), Some("edc")] {
            let g = grader(&[false, true, false], mode);
            let cmap = g.grade(&submit(&[]));
            assert_eq!(cmap.get_correctness("q"), Some(Correctness::Incorrect), "{mode:?}");
            assert_eq!(cmap.get_points("q"), 0.0);

            let missing = g.grade(&Submission::new());
            assert_eq!(missing.get_correctness("q"), Some(Correctness::Incorrect));
        }
    }

    #[test]
    fn scalar_submission_is_coerced() {
        let g = grader(&[false, true], None);
        let sub = Submission::from([("q".to_string(), SubmissionValue::from("choice_1"))]);
        assert!(g.grade(&sub).is_correct("q"));
    }

    #[test]
    fn exact_mode_rejects_extras_and_omissions() {
        let g = grader(&[true, true, false], None);
        assert!(!g.grade(&submit(&["choice_0"])).is_correct("q"));
        assert!(!g
            .grade(&submit(&["choice_0", "choice_1", "choice_2"]))
            .is_correct("q"));
    }

    #[test]
    fn halves_one_error() {
        let g = grader(&[true, false, false], Some("halves"));
        let cmap = g.grade(&submit(&["choice_0", "choice_1"]));
        assert!(cmap.is_partially_correct("q"));
        assert_eq!(cmap.get_points("q"), 0.5);

        let two_options = grader(&[true, false], Some("halves"));
        let cmap = two_options.grade(&submit(&["choice_0", "choice_1"]));
        assert_eq!(cmap.get_correctness("q"), Some(Correctness::Incorrect));
    }

    #[test]
    fn partial_tagged_choices_count_on_neither_side() {
        use ChoiceCorrectness::{False, Partial, True};
        let g = tagged_grader(&[True, Partial, False, False], Some("edc"));

        // Three decided choices; the partial one is ignored whether picked or not.
        let cmap = g.grade(&submit(&["choice_0", "choice_1"]));
        assert!(cmap.is_correct("q"));
        assert_eq!(cmap.get_points("q"), 1.0);
        let cmap = g.grade(&submit(&["choice_0", "choice_1", "choice_2"]));
        assert_eq!(cmap.get_points("q"), 0.67);
        let cmap = g.grade(&submit(&["choice_0", "choice_2"]));
        assert_eq!(cmap.get_points("q"), 0.67);

        let halves = tagged_grader(&[True, Partial, False, False], Some("halves"));
        let cmap = halves.grade(&submit(&["choice_0", "choice_1"]));
        assert!(cmap.is_correct("q"));
        let cmap = halves.grade(&submit(&["choice_1", "choice_2"]));
        assert_eq!(cmap.get_correctness("q"), Some(Correctness::Incorrect));
    }

    #[test]
    fn halves_two_errors_needs_more_than_four_options() {
        let g = grader(&[true, true, false, false, false], Some("halves"));
        let cmap = g.grade(&submit(&["choice_0", "choice_2"]));
        assert_eq!(cmap.get_points("q"), 0.25);

        let four = grader(&[true, true, false, false], Some("halves"));
        let cmap = four.grade(&submit(&["choice_0", "choice_2"]));
        assert_eq!(cmap.get_correctness("q"), Some(Correctness::Incorrect));

        let cmap = g.grade(&submit(&["choice_2", "choice_3", "choice_4"]));
        assert_eq!(cmap.get_correctness("q"), Some(Correctness::Incorrect));
    }

    #[test]
    fn edc_credit_grows_with_handled_choices() {
        let g = grader(&[true, false, true, false], Some("edc"));
        let mut last = -1.0;
        for picks in [
            vec!["choice_1", "choice_3"],
            vec!["choice_0", "choice_1", "choice_3"],
            vec!["choice_0", "choice_3"],
            vec!["choice_0", "choice_2", "choice_3"],
        ] {
            let points = g.grade(&submit(&picks)).get_points("q");
            assert!(points > last, "{picks:?}");
            last = points;
        }

        let all_wrong = g.grade(&submit(&["choice_1", "choice_3"]));
        assert_eq!(all_wrong.get_correctness("q"), Some(Correctness::Incorrect));
        assert_eq!(all_wrong.get_points("q"), 0.0);

        let one_third = grader(&[true, false, false], Some("edc"));
        let cmap = one_third.grade(&submit(&["choice_1"]));
        assert!(cmap.is_partially_correct("q"));
        assert_eq!(cmap.get_points("q"), 0.33);
    }

    #[test]
    fn unknown_credit_keyword_is_content_error() {
        let spec = ChoiceSetSpec {
            choices: vec![],
            partial_credit: Some("quarters".into()),
        };
        let question = Question {
            id: "q".into(),
            max_points: 1.0,
            kind: QuestionKind::ChoiceSet(spec.clone()),
        };
        let context = BTreeMap::new();
        let rng = GroupRng::new(0);
        let calc = Calculator::new();
        let settings = GradingSettings::default();
        let ctx = SetupContext {
            context: &context,
            solutions: &[],
            rng: &rng,
            evaluator: &calc,
            settings: &settings,
        };
        let err = ChoiceSetGrader::setup(&question, &spec, &ctx).unwrap_err();
        assert!(err.is_content_error());
    }
}
