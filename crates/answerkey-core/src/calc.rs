//! Default arithmetic expression evaluator.
//!
//! Supports `+ - * / ^`, unary sign, parentheses, single-argument function
//! calls, named variables, scientific notation, metric suffixes (`2k`, `5m`,
//! `3%`) and an imaginary marker (`2j`, `4i`).

use std::collections::{BTreeSet, HashMap};

use crate::error::EvalError;
use crate::number::Complex;
use crate::traits::{Evaluator, MathFn};

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(Complex),
    Var(String),
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
    Call(String, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

fn binary(op: Op, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

fn metric_scale(suffix: &str) -> f64 {
    match suffix {
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "c" => 1e-2,
        "m" => 1e-3,
        "u" => 1e-6,
        "n" => 1e-9,
        "p" => 1e-12,
        _ => 1.0,
    }
}

peg::parser! {
    grammar expr_parser() for str {
        rule _() = quiet!{[' ' | '\t' | '\n' | '\r']*}

        rule ident_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

        /// a variable or function name
        rule ident() -> &'input str
            = $(['a'..='z' | 'A'..='Z' | '_'] ident_char()*)

        /// digits with an optional fraction and exponent
        rule mantissa() -> f64
            = n:$((['0'..='9']+ ("." ['0'..='9']*)? / "." ['0'..='9']+) (['e' | 'E'] ['+' | '-']? ['0'..='9']+)?)
            {? n.parse().or(Err("number")) }

        rule suffix() -> f64
            = "%" { 0.01 }
            / s:$(['k' | 'M' | 'G' | 'T' | 'c' | 'm' | 'u' | 'n' | 'p']) !ident_char() { metric_scale(s) }

        rule imaginary() = ['j' | 'i'] !ident_char()

        rule number() -> Expr
            = v:mantissa() imaginary() { Expr::Num(Complex::new(0.0, v)) }
            / v:mantissa() s:suffix()? { Expr::Num(Complex::real(v * s.unwrap_or(1.0))) }

        rule sum() -> Expr = precedence!{
            x:(@) _ "+" _ y:@ { binary(Op::Add, x, y) }
            x:(@) _ "-" _ y:@ { binary(Op::Sub, x, y) }
            --
            x:(@) _ "*" _ y:@ { binary(Op::Mul, x, y) }
            x:(@) _ "/" _ y:@ { binary(Op::Div, x, y) }
            --
            "-" _ x:@ { Expr::Neg(Box::new(x)) }
            "+" _ x:@ { x }
            --
            x:@ _ "^" _ "-" _ y:(@) { binary(Op::Pow, x, Expr::Neg(Box::new(y))) }
            x:@ _ "^" _ y:(@) { binary(Op::Pow, x, y) }
            --
            n:number() { n }
            f:ident() _ "(" _ a:sum() _ ")" { Expr::Call(f.to_string(), Box::new(a)) }
            v:ident() { Expr::Var(v.to_string()) }
            "(" _ e:sum() _ ")" { e }
        }

        pub rule expression() -> Expr
            = _ e:sum() _ { e }
    }
}

/// Longest expression text the parser accepts.
pub const MAX_EXPRESSION_LEN: usize = 1000;

/// Deepest parenthesis nesting, sign run or `^` chain the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Rejects text whose parse tree would recurse past [`MAX_NESTING`].
///
/// The parser and evaluator both recurse once per nesting level, so this
/// runs before either of them sees the text.
fn check_nesting(expression: &str) -> Result<(), EvalError> {
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(EvalError::Parse(format!(
            "expression longer than {MAX_EXPRESSION_LEN} characters"
        )));
    }

    let too_deep = || {
        EvalError::Parse(format!(
            "expression nested deeper than {MAX_NESTING} levels"
        ))
    };
    let mut depth = 0usize;
    let mut signs = 0usize;
    let mut powers = 0usize;
    for c in expression.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(too_deep());
                }
            }
            ')' => depth = depth.saturating_sub(1),
            '^' => powers += 1,
            _ => {}
        }
        match c {
            '+' | '-' => signs += 1,
            c if c.is_whitespace() => {}
            _ => signs = 0,
        }
        if signs > MAX_NESTING || powers > MAX_NESTING {
            return Err(too_deep());
        }
    }
    Ok(())
}

/// The built-in calculator used when no other evaluator is supplied.
#[derive(Debug, Clone)]
pub struct Calculator {
    constants: HashMap<String, Complex>,
    functions: HashMap<String, MathFn>,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calculator {
    pub fn new() -> Self {
        let constants = [
            ("pi", Complex::real(std::f64::consts::PI)),
            ("e", Complex::real(std::f64::consts::E)),
            ("i", Complex::I),
            ("j", Complex::I),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let functions: [(&str, MathFn); 11] = [
            ("sqrt", |z| Ok(z.sqrt())),
            ("sin", |z| Ok(z.sin())),
            ("cos", |z| Ok(z.cos())),
            ("tan", |z| Ok(z.tan())),
            ("exp", |z| Ok(z.exp())),
            ("ln", |z| Ok(z.ln())),
            ("log10", |z| Ok(z.ln() / Complex::real(std::f64::consts::LN_10))),
            ("log2", |z| Ok(z.ln() / Complex::real(std::f64::consts::LN_2))),
            ("abs", |z| Ok(Complex::real(z.abs()))),
            ("fact", factorial),
            ("factorial", factorial),
        ];
        let functions = functions
            .into_iter()
            .map(|(k, f)| (k.to_string(), f))
            .collect();

        Self {
            constants,
            functions,
        }
    }

    fn lookup_var(&self, name: &str, variables: &HashMap<String, Complex>) -> Option<Complex> {
        variables
            .get(name)
            .or_else(|| self.constants.get(name))
            .copied()
    }

    fn collect_undefined(
        &self,
        expr: &Expr,
        variables: &HashMap<String, Complex>,
        functions: &HashMap<String, MathFn>,
        out: &mut BTreeSet<String>,
    ) {
        match expr {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                if self.lookup_var(name, variables).is_none() {
                    out.insert(name.clone());
                }
            }
            Expr::Neg(inner) => self.collect_undefined(inner, variables, functions, out),
            Expr::Binary(_, lhs, rhs) => {
                self.collect_undefined(lhs, variables, functions, out);
                self.collect_undefined(rhs, variables, functions, out);
            }
            Expr::Call(name, arg) => {
                if !functions.contains_key(name) && !self.functions.contains_key(name) {
                    out.insert(name.clone());
                }
                self.collect_undefined(arg, variables, functions, out);
            }
        }
    }

    fn eval(
        &self,
        expr: &Expr,
        variables: &HashMap<String, Complex>,
        functions: &HashMap<String, MathFn>,
    ) -> Result<Complex, EvalError> {
        match expr {
            Expr::Num(v) => Ok(*v),
            Expr::Var(name) => self
                .lookup_var(name, variables)
                .ok_or_else(|| EvalError::UndefinedVariable(vec![name.clone()])),
            Expr::Neg(inner) => Ok(-self.eval(inner, variables, functions)?),
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs, variables, functions)?;
                let b = self.eval(rhs, variables, functions)?;
                match op {
                    Op::Add => Ok(a + b),
                    Op::Sub => Ok(a - b),
                    Op::Mul => Ok(a * b),
                    Op::Div => {
                        if b == Complex::ZERO {
                            return Err(EvalError::Other("division by zero".into()));
                        }
                        Ok(a / b)
                    }
                    Op::Pow => Ok(a.powc(b)),
                }
            }
            Expr::Call(name, arg) => {
                let f = functions
                    .get(name)
                    .or_else(|| self.functions.get(name))
                    .ok_or_else(|| EvalError::UndefinedVariable(vec![name.clone()]))?;
                f(self.eval(arg, variables, functions)?)
            }
        }
    }
}

impl Evaluator for Calculator {
    fn evaluate(
        &self,
        variables: &HashMap<String, Complex>,
        functions: &HashMap<String, MathFn>,
        expression: &str,
    ) -> Result<Complex, EvalError> {
        if expression.trim().is_empty() {
            return Err(EvalError::Parse("empty expression".into()));
        }
        check_nesting(expression)?;
        let expr = expr_parser::expression(expression)
            .map_err(|e| EvalError::Parse(format!("'{expression}': {e}")))?;

        let mut undefined = BTreeSet::new();
        self.collect_undefined(&expr, variables, functions, &mut undefined);
        if !undefined.is_empty() {
            return Err(EvalError::UndefinedVariable(undefined.into_iter().collect()));
        }

        self.eval(&expr, variables, functions)
    }
}

fn factorial(z: Complex) -> Result<Complex, EvalError> {
    if !z.is_real() || z.re.fract() != 0.0 {
        return Err(EvalError::Domain(
            "factorial() only accepts integral values".into(),
        ));
    }
    if z.re < 0.0 {
        return Err(EvalError::Domain(
            "factorial() not defined for negative values".into(),
        ));
    }
    let n = z.re as u64;
    if n > 170 {
        return Ok(Complex::real(f64::INFINITY));
    }
    Ok(Complex::real((1..=n).map(|k| k as f64).product()))
}
