//! Numeric comparison with tolerances and ranges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ContentError, InputError};
use crate::number::Complex;

/// Tolerance used when a numerical question declares none.
pub const DEFAULT_TOLERANCE: &str = "0.001%";

/// Allowed deviation for a numeric answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    /// An absolute magnitude (or a fraction of the reference when compared
    /// relatively).
    Absolute(f64),
    /// A percentage of the reference magnitude.
    Percent(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Percent(0.001)
    }
}

impl FromStr for Tolerance {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || ContentError::InvalidTolerance(s.to_string());
        let (number, percent) = match text.strip_suffix('%') {
            Some(rest) => (rest.trim(), true),
            None => (text, false),
        };
        let value: f64 = number.parse().map_err(|_| invalid())?;
        if !value.is_finite() || value < 0.0 {
            return Err(invalid());
        }
        Ok(if percent {
            Tolerance::Percent(value)
        } else {
            Tolerance::Absolute(value)
        })
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tolerance::Absolute(v) => write!(f, "{v}"),
            Tolerance::Percent(v) => write!(f, "{v}%"),
        }
    }
}

impl Tolerance {
    /// The same kind of tolerance, `factor` times wider.
    pub fn expanded(&self, factor: f64) -> Tolerance {
        match self {
            Tolerance::Absolute(v) => Tolerance::Absolute(v * factor),
            Tolerance::Percent(v) => Tolerance::Percent(v * factor),
        }
    }

    /// Effective absolute tolerance around `reference`.
    pub fn magnitude(&self, reference: Complex, relative: bool) -> f64 {
        match self {
            Tolerance::Percent(pct) => reference.abs() * pct / 100.0,
            Tolerance::Absolute(v) if relative => v * reference.abs(),
            Tolerance::Absolute(v) => *v,
        }
    }
}

/// Whether `value` equals `reference` within `tolerance`.
///
/// Distances are measured in the complex plane. Infinite values only match
/// an identical infinity.
pub fn compare_with_tolerance(
    value: Complex,
    reference: Complex,
    tolerance: &Tolerance,
    relative: bool,
) -> bool {
    if value.is_infinite() || reference.is_infinite() {
        return value == reference;
    }
    (value - reference).abs() <= tolerance.magnitude(reference, relative)
}

/// One end of an [`AnswerRange`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub value: f64,
    pub inclusive: bool,
}

/// A two-sided interval answer such as `[2, 4)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerRange {
    pub low: Bound,
    pub high: Bound,
}

impl fmt::Display for AnswerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}, {}{}",
            if self.low.inclusive { '[' } else { '(' },
            self.low.value,
            self.high.value,
            if self.high.inclusive { ']' } else { ')' },
        )
    }
}

impl AnswerRange {
    pub fn new(low: Bound, high: Bound) -> Result<Self, ContentError> {
        if low.value.is_nan() || high.value.is_nan() {
            return Err(ContentError::EmptyBoundary);
        }
        if low.value > high.value {
            return Err(ContentError::InvalidRange(format!(
                "{}, {}",
                low.value, high.value
            )));
        }
        Ok(Self { low, high })
    }

    /// Whether `text` uses bracket/parenthesis range syntax.
    pub fn is_range_syntax(text: &str) -> bool {
        let text = text.trim();
        text.len() >= 2
            && (text.starts_with('[') || text.starts_with('('))
            && (text.ends_with(']') || text.ends_with(')'))
    }

    /// Parse `[a, b]`, `(a, b)` or a mix, evaluating each boundary with
    /// `evaluate`. Boundaries must be real and present.
    pub fn parse<F>(text: &str, mut evaluate: F) -> Result<Self, ContentError>
    where
        F: FnMut(&str) -> Result<Complex, ContentError>,
    {
        let trimmed = text.trim();
        if !Self::is_range_syntax(trimmed) {
            return Err(ContentError::InvalidRange(text.to_string()));
        }
        let low_inclusive = trimmed.starts_with('[');
        let high_inclusive = trimmed.ends_with(']');
        let inner = &trimmed[1..trimmed.len() - 1];
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(ContentError::InvalidRange(text.to_string()));
        }

        let mut boundary = |part: &str| -> Result<f64, ContentError> {
            if part.is_empty() {
                return Err(ContentError::EmptyBoundary);
            }
            let value = evaluate(part)?;
            if !value.is_real() {
                return Err(ContentError::ComplexBoundary(part.to_string()));
            }
            if value.re.is_nan() {
                return Err(ContentError::EmptyBoundary);
            }
            Ok(value.re)
        };

        let low = boundary(parts[0])?;
        let high = boundary(parts[1])?;
        Self::new(
            Bound {
                value: low,
                inclusive: low_inclusive,
            },
            Bound {
                value: high,
                inclusive: high_inclusive,
            },
        )
    }

    pub fn span(&self) -> f64 {
        self.high.value - self.low.value
    }

    /// If `value` sits on a boundary (to within machine epsilon, relative),
    /// return that boundary's inclusion flag. The low boundary is checked
    /// first.
    pub fn boundary_verdict(&self, value: Complex) -> Result<Option<bool>, InputError> {
        if !value.is_real() {
            return Err(InputError::ComplexInRange);
        }
        let epsilon = Tolerance::Absolute(f64::EPSILON);
        for bound in [self.low, self.high] {
            if compare_with_tolerance(value, Complex::real(bound.value), &epsilon, true) {
                return Ok(Some(bound.inclusive));
            }
        }
        Ok(None)
    }

    /// Strictly between the two boundaries.
    pub fn strictly_contains(&self, value: Complex) -> Result<bool, InputError> {
        if !value.is_real() {
            return Err(InputError::ComplexInRange);
        }
        Ok(self.low.value < value.re && value.re < self.high.value)
    }

    /// Inside the interval, honouring each boundary's inclusion flag.
    pub fn contains(&self, value: Complex) -> Result<bool, InputError> {
        if self.strictly_contains(value)? {
            return Ok(true);
        }
        let v = value.re;
        Ok((self.low.inclusive && v == self.low.value)
            || (self.high.inclusive && v == self.high.value))
    }

    /// Open interval widened on both sides by `factor` times the span.
    pub fn expanded(&self, factor: f64) -> AnswerRange {
        let margin = factor * self.span();
        AnswerRange {
            low: Bound {
                value: self.low.value - margin,
                inclusive: false,
            },
            high: Bound {
                value: self.high.value + margin,
                inclusive: false,
            },
        }
    }
}
