//! Numeric answers: a target value with a tolerance, or a range.
//!
//! Partial credit keywords (comma-separated, combinable):
//! - `close`: within `partial_range` times the tolerance (or, for ranges,
//!   within bounds widened by `partial_range` spans).
//! - `list`: within tolerance of one of `partial_answers`. With `close` as
//!   well, an alternate matched only under the widened tolerance earns the
//!   partial fraction squared.

use std::collections::{BTreeMap, HashMap};

use crate::correctmap::{CorrectEntry, CorrectMap};
use crate::error::{ContentError, EvalError, InputError, Result};
use crate::model::{NumericalSpec, Question, Submission, SubmissionValue};
use crate::number::Complex;
use crate::tolerance::{compare_with_tolerance, AnswerRange, Tolerance};
use crate::traits::Evaluator;

use super::{contextualize, credit_keywords, SetupContext};

#[derive(Debug, Clone, PartialEq)]
enum Target {
    Point(Complex),
    Range(AnswerRange),
}

#[derive(Debug, Clone)]
pub struct NumericalGrader {
    answer_id: String,
    max_points: f64,
    answer: String,
    target: Target,
    tolerance: Tolerance,
    alternates: Vec<Complex>,
    close: bool,
    list: bool,
    partial_range: f64,
    fraction: f64,
}

impl NumericalGrader {
    pub fn setup(
        question: &Question,
        spec: &NumericalSpec,
        ctx: &SetupContext<'_>,
    ) -> Result<Self> {
        let answer = contextualize(spec.answer.trim(), ctx.context);

        let mut close = false;
        let mut list = false;
        for word in credit_keywords(spec.partial_credit.as_deref()) {
            match word.as_str() {
                "close" => close = true,
                "list" => list = true,
                _ => {
                    return Err(ContentError::UnknownPartialCredit {
                        value: word,
                        expected: "close, list",
                    }
                    .into())
                }
            }
        }

        let partial_range = match &spec.partial_range {
            Some(raw) => parse_partial_range(raw)?,
            None => ctx.settings.partial_range,
        };

        let tolerance = match &spec.tolerance {
            Some(raw) => contextualize(raw, ctx.context).parse::<Tolerance>()?,
            None => ctx.settings.default_tolerance,
        };

        let target = if AnswerRange::is_range_syntax(&answer) {
            Target::Range(AnswerRange::parse(&answer, |part| {
                staff_value(ctx.evaluator, part)
            })?)
        } else {
            let value = staff_value(ctx.evaluator, &answer)?;
            if value.is_nan() {
                return Err(ContentError::InvalidStaffAnswer(answer).into());
            }
            Target::Point(value)
        };

        let alternates = spec
            .partial_answers
            .iter()
            .map(|alt| staff_value(ctx.evaluator, contextualize(alt.trim(), ctx.context).as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        if list && alternates.is_empty() && matches!(target, Target::Point(_)) {
            return Err(ContentError::MissingPartialAnswers.into());
        }

        Ok(Self {
            answer_id: question.id.clone(),
            max_points: question.max_points,
            answer,
            target,
            tolerance,
            alternates,
            close,
            list,
            partial_range,
            fraction: ctx.settings.partial_credit_fraction,
        })
    }

    pub fn question_id(&self) -> &str {
        &self.answer_id
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    pub fn is_range(&self) -> bool {
        matches!(self.target, Target::Range(_))
    }

    pub fn answer_ids(&self) -> Vec<String> {
        vec![self.answer_id.clone()]
    }

    pub fn correct_answers(&self) -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([(self.answer_id.clone(), vec![self.answer.clone()])])
    }

    pub fn grade(&self, submission: &Submission, evaluator: &dyn Evaluator) -> Result<CorrectMap> {
        let text = match submission.get(&self.answer_id) {
            Some(SubmissionValue::Single(s)) => s.as_str(),
            Some(other) => return Err(InputError::NotANumber(other.to_string()).into()),
            None => return Err(InputError::MissingAnswer(self.answer_id.clone()).into()),
        };
        let value = learner_value(evaluator, text)?;

        let entry = match &self.target {
            Target::Range(range) => self.grade_range(range, value)?,
            Target::Point(reference) => self.grade_point(*reference, value),
        };

        let mut cmap = CorrectMap::with_max_points(self.max_points);
        cmap.set(&self.answer_id, entry);
        Ok(cmap)
    }

    fn partial(&self, fraction: f64) -> CorrectEntry {
        CorrectEntry::partial(fraction * self.max_points)
    }

    fn grade_range(&self, range: &AnswerRange, value: Complex) -> Result<CorrectEntry> {
        if let Some(inclusive) = range.boundary_verdict(value)? {
            return Ok(if inclusive {
                CorrectEntry::correct()
            } else {
                CorrectEntry::incorrect()
            });
        }
        if range.strictly_contains(value)? {
            return Ok(CorrectEntry::correct());
        }
        if self.close && range.expanded(self.partial_range).strictly_contains(value)? {
            tracing::debug!(question = %self.answer_id, "within expanded range");
            return Ok(self.partial(self.fraction));
        }
        Ok(CorrectEntry::incorrect())
    }

    fn grade_point(&self, reference: Complex, value: Complex) -> CorrectEntry {
        if compare_with_tolerance(value, reference, &self.tolerance, false) {
            return CorrectEntry::correct();
        }

        let expanded = self.tolerance.expanded(self.partial_range);
        if self.list {
            if self
                .alternates
                .iter()
                .any(|alt| compare_with_tolerance(value, *alt, &self.tolerance, false))
            {
                tracing::debug!(question = %self.answer_id, "matched a partial answer");
                return self.partial(self.fraction);
            }
            if self.close
                && self
                    .alternates
                    .iter()
                    .any(|alt| compare_with_tolerance(value, *alt, &expanded, false))
            {
                tracing::debug!(question = %self.answer_id, "close to a partial answer");
                return self.partial(self.fraction * self.fraction);
            }
        } else if self.close && compare_with_tolerance(value, reference, &expanded, false) {
            tracing::debug!(question = %self.answer_id, "within expanded tolerance");
            return self.partial(self.fraction);
        }
        CorrectEntry::incorrect()
    }

    /// Whether two answers are equal at this question's tolerance.
    pub fn compare_answer(&self, a: &str, b: &str, evaluator: &dyn Evaluator) -> Result<bool> {
        let a = learner_value(evaluator, a)?;
        let b = learner_value(evaluator, b)?;
        Ok(compare_with_tolerance(a, b, &self.tolerance, false))
    }

    /// Whether `answer` evaluates to a number at all.
    pub fn validate_answer(&self, answer: &str, evaluator: &dyn Evaluator) -> bool {
        learner_value(evaluator, answer).is_ok()
    }
}

/// Keep only digits and the decimal point, so `x3` and `3x` both mean 3.
fn parse_partial_range(raw: &str) -> Result<f64, ContentError> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits
        .parse()
        .map_err(|_| ContentError::InvalidPartialRange(raw.to_string()))
}

fn staff_value(evaluator: &dyn Evaluator, text: &str) -> Result<Complex, ContentError> {
    evaluator
        .evaluate(&HashMap::new(), &HashMap::new(), text)
        .map_err(|e| {
            tracing::debug!("content error: staff answer '{}' is not a valid number: {}", text, e);
            ContentError::InvalidStaffAnswer(text.to_string())
        })
}

fn learner_value(evaluator: &dyn Evaluator, text: &str) -> Result<Complex, InputError> {
    match evaluator.evaluate(&HashMap::new(), &HashMap::new(), text) {
        Ok(v) if v.is_nan() => Err(InputError::NotANumber(text.to_string())),
        Ok(v) => Ok(v),
        Err(EvalError::UndefinedVariable(names)) => {
            Err(InputError::UndefinedVariable(names.join(", ")))
        }
        Err(EvalError::Parse(_)) => Err(InputError::MalformedSyntax(text.to_string())),
        Err(EvalError::Domain(msg)) if msg.contains("factorial") => {
            Err(InputError::FactorialDomain(text.to_string()))
        }
        Err(_) => Err(InputError::NotANumber(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Calculator;
    use crate::correctmap::Correctness;
    use crate::error::GradeError;
    use crate::model::QuestionKind;
    use crate::randomize::GroupRng;
    use crate::responses::GradingSettings;

    fn spec(answer: &str) -> NumericalSpec {
        NumericalSpec {
            answer: answer.into(),
            tolerance: None,
            partial_credit: None,
            partial_answers: vec![],
            partial_range: None,
        }
    }

    fn build_with(
        spec: NumericalSpec,
        max_points: f64,
        context: BTreeMap<String, serde_json::Value>,
    ) -> Result<NumericalGrader> {
        let question = Question {
            id: "n".into(),
            max_points,
            kind: QuestionKind::Numerical(spec.clone()),
        };
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
        NumericalGrader::setup(&question, &spec, &ctx)
    }

    fn build(spec: NumericalSpec) -> NumericalGrader {
        build_with(spec, 1.0, BTreeMap::new()).unwrap()
    }

    fn grade(g: &NumericalGrader, text: &str) -> Result<CorrectMap> {
        let sub = Submission::from([("n".to_string(), SubmissionValue::from(text))]);
        g.grade(&sub, &Calculator::new())
    }

    fn verdict(g: &NumericalGrader, text: &str) -> (Correctness, f64) {
        let cmap = grade(g, text).unwrap();
        (cmap.get_correctness("n").unwrap(), cmap.get_points("n"))
    }

    #[test]
    fn point_with_absolute_tolerance() {
        let mut s = spec("5");
        s.tolerance = Some("0.01".into());
        let g = build(s);
        assert_eq!(verdict(&g, "4.999").0, Correctness::Correct);
        assert_eq!(verdict(&g, "5.2").0, Correctness::Incorrect);
        assert_eq!(verdict(&g, "10/2").0, Correctness::Correct);
    }

    #[test]
    fn expression_staff_answer_with_default_tolerance() {
        let g = build(spec("4+5/2^2"));
        assert_eq!(verdict(&g, "5.25").0, Correctness::Correct);
        assert_eq!(verdict(&g, "5.26").0, Correctness::Incorrect);
    }

    #[test]
    fn open_range_excludes_endpoints() {
        let g = build(spec("(2,4)"));
        assert!(g.is_range());
        assert_eq!(verdict(&g, "2").0, Correctness::Incorrect);
        assert_eq!(verdict(&g, "4").0, Correctness::Incorrect);
        assert_eq!(verdict(&g, "3").0, Correctness::Correct);
    }

    #[test]
    fn closed_and_mixed_ranges() {
        let g = build(spec("[2,4)"));
        assert_eq!(verdict(&g, "2").0, Correctness::Correct);
        assert_eq!(verdict(&g, "4").0, Correctness::Incorrect);
        assert_eq!(verdict(&g, "1.9").0, Correctness::Incorrect);
    }

    #[test]
    fn close_range_partial_credit() {
        let mut s = spec("(2,4)");
        s.partial_credit = Some("close".into());
        let g = build(s);
        assert_eq!(verdict(&g, "1.4"), (Correctness::PartiallyCorrect, 0.5));
        assert_eq!(verdict(&g, "7.5"), (Correctness::PartiallyCorrect, 0.5));
        assert_eq!(verdict(&g, "8.5").0, Correctness::Incorrect);
    }

    #[test]
    fn complex_value_in_range_is_input_error() {
        let g = build(spec("[0, 10]"));
        let err = grade(&g, "3+2j").unwrap_err();
        assert!(matches!(err, GradeError::Input(InputError::ComplexInRange)));
    }

    #[test]
    fn bad_range_boundaries_are_content_errors() {
        for answer in ["[1, 2j]", "[1, ]", "[1, x]"] {
            let err = build_with(spec(answer), 1.0, BTreeMap::new()).unwrap_err();
            assert!(err.is_content_error(), "{answer}");
        }
    }

    #[test]
    fn close_point_partial_credit() {
        let mut s = spec("10");
        s.tolerance = Some("1%".into());
        s.partial_credit = Some("close".into());
        let g = build_with(s, 2.0, BTreeMap::new()).unwrap();
        assert_eq!(verdict(&g, "10.05"), (Correctness::Correct, 2.0));
        assert_eq!(verdict(&g, "10.15"), (Correctness::PartiallyCorrect, 1.0));
        assert_eq!(verdict(&g, "10.3").0, Correctness::Incorrect);
    }

    #[test]
    fn list_partial_credit() {
        let mut s = spec("10");
        s.tolerance = Some("1%".into());
        s.partial_credit = Some("list".into());
        s.partial_answers = vec!["20".into(), "30".into()];
        let g = build(s);
        assert_eq!(verdict(&g, "30.1"), (Correctness::PartiallyCorrect, 0.5));
        assert_eq!(verdict(&g, "20.3").0, Correctness::Incorrect);
        assert_eq!(verdict(&g, "10.15").0, Correctness::Incorrect);
    }

    #[test]
    fn list_and_close_squares_the_fraction() {
        let mut s = spec("10");
        s.tolerance = Some("1%".into());
        s.partial_credit = Some("close, list".into());
        s.partial_answers = vec!["20".into()];
        let g = build(s);
        assert_eq!(verdict(&g, "20.1"), (Correctness::PartiallyCorrect, 0.5));
        assert_eq!(verdict(&g, "20.3"), (Correctness::PartiallyCorrect, 0.25));
        assert_eq!(verdict(&g, "10.15").0, Correctness::Incorrect);
    }

    #[test]
    fn list_without_alternates_is_content_error() {
        let mut s = spec("10");
        s.partial_credit = Some("list".into());
        let err = build_with(s, 1.0, BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            GradeError::Content(ContentError::MissingPartialAnswers)
        ));
    }

    #[test]
    fn partial_range_multiplier() {
        let mut s = spec("100");
        s.tolerance = Some("1".into());
        s.partial_credit = Some("close".into());
        s.partial_range = Some("x5".into());
        let g = build(s);
        assert_eq!(verdict(&g, "104").0, Correctness::PartiallyCorrect);

        assert_eq!(parse_partial_range("3x").unwrap(), 3.0);
        assert!(parse_partial_range("twice").is_err());
    }

    #[test]
    fn learner_errors_are_typed() {
        let g = build(spec("5"));
        let cases: [(&str, fn(&InputError) -> bool); 4] = [
            ("x+1", |e| matches!(e, InputError::UndefinedVariable(v) if v == "x")),
            ("3 +* 4", |e| matches!(e, InputError::MalformedSyntax(_))),
            ("fact(-1)", |e| matches!(e, InputError::FactorialDomain(_))),
            ("1/0", |e| matches!(e, InputError::NotANumber(_))),
        ];
        for (text, check) in cases {
            match grade(&g, text).unwrap_err() {
                GradeError::Input(e) => assert!(check(&e), "{text}: {e}"),
                other => panic!("{text}: unexpected {other}"),
            }
        }

        let missing = g.grade(&Submission::new(), &Calculator::new()).unwrap_err();
        assert!(missing.is_input_error());
    }

    #[test]
    fn deeply_nested_answers_are_malformed() {
        let g = build(spec("5"));
        let nested = format!("{}5{}", "(".repeat(10_000), ")".repeat(10_000));
        let signs = format!("{}5", "-".repeat(10_000));
        for text in [nested, signs] {
            assert!(matches!(
                grade(&g, &text),
                Err(GradeError::Input(InputError::MalformedSyntax(_)))
            ));
        }
        assert_eq!(verdict(&g, "((((5))))").0, Correctness::Correct);

        let staff = format!("1+{}5{}", "(".repeat(500), ")".repeat(500));
        assert!(build_with(spec(&staff), 1.0, BTreeMap::new())
            .unwrap_err()
            .is_content_error());
    }

    #[test]
    fn staff_and_attribute_errors() {
        assert!(build_with(spec("abc"), 1.0, BTreeMap::new())
            .unwrap_err()
            .is_content_error());

        let mut s = spec("5");
        s.tolerance = Some("lots".into());
        assert!(build_with(s, 1.0, BTreeMap::new()).unwrap_err().is_content_error());

        let mut s = spec("5");
        s.partial_credit = Some("nearby".into());
        assert!(build_with(s, 1.0, BTreeMap::new()).unwrap_err().is_content_error());
    }

    #[test]
    fn context_variables_in_answer() {
        let context = BTreeMap::from([("x".to_string(), serde_json::json!(5))]);
        let g = build_with(spec("$x*2"), 1.0, context).unwrap();
        assert_eq!(verdict(&g, "10").0, Correctness::Correct);
        assert_eq!(g.correct_answers()["n"], vec!["5*2"]);
    }

    #[test]
    fn complex_answers_compare_in_the_plane() {
        let mut s = spec("3+4j");
        s.tolerance = Some("0.1".into());
        let g = build(s);
        assert_eq!(verdict(&g, "3+4.05j").0, Correctness::Correct);
        assert_eq!(verdict(&g, "3-4j").0, Correctness::Incorrect);
    }

    #[test]
    fn compare_and_validate() {
        let calc = Calculator::new();
        let mut s = spec("1");
        s.tolerance = Some("0.01".into());
        let g = build(s);
        assert!(g.compare_answer("1/3", "0.333", &calc).unwrap());
        assert!(!g.compare_answer("1/3", "0.3", &calc).unwrap());
        assert!(g.compare_answer("10^400", "10^500", &calc).unwrap());
        assert!(g.validate_answer("2*pi", &calc));
        assert!(!g.validate_answer("2*q", &calc));
    }
}
