// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! The `math()` step
//!
//! Expressions are parsed once at construction into a small AST and then
//! evaluated per traverser. Variables bind to step labels, side-effect keys
//! or map keys; the reserved variable `_` binds to the incoming value.
//! `by()` modulators apply to the variables in first-appearance order.

use std::collections::{HashMap, HashSet, VecDeque};

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char as pchar, multispace0};
use nom::combinator::{all_consuming, map, recognize};
use nom::multi::many0;
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use once_cell::sync::Lazy;

use crate::step::filter::resolve_binding;
use crate::step::{pull_start, step_common, ByMod, Requirements, Step, StepMeta, StepOut};
use crate::step::TraversalRing;
use crate::structure::value::Value;
use crate::traversal::{TraversalContext, TraversalError};
use crate::traverser::Traverser;

static FUNCTIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "abs", "acos", "asin", "atan", "cbrt", "ceil", "cos", "cosh", "exp", "floor", "log",
        "log10", "log2", "signum", "sin", "sinh", "sqrt", "tan", "tanh",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(&'static str, Box<Expr>),
}

impl Expr {
    fn eval(&self, bindings: &HashMap<String, f64>) -> f64 {
        match self {
            Expr::Number(n) => *n,
            // Unknown variables are caught at bind time, before eval runs.
            Expr::Variable(name) => bindings.get(name).copied().unwrap_or(f64::NAN),
            Expr::Neg(inner) => -inner.eval(bindings),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(bindings), rhs.eval(bindings));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Mod => a % b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(func, arg) => {
                let x = arg.eval(bindings);
                match *func {
                    "abs" => x.abs(),
                    "acos" => x.acos(),
                    "asin" => x.asin(),
                    "atan" => x.atan(),
                    "cbrt" => x.cbrt(),
                    "ceil" => x.ceil(),
                    "cos" => x.cos(),
                    "cosh" => x.cosh(),
                    "exp" => x.exp(),
                    "floor" => x.floor(),
                    "log" => x.ln(),
                    "log10" => x.log10(),
                    "log2" => x.log2(),
                    "signum" => x.signum(),
                    "sin" => x.sin(),
                    "sinh" => x.sinh(),
                    "sqrt" => x.sqrt(),
                    "tan" => x.tan(),
                    "tanh" => x.tanh(),
                    _ => f64::NAN,
                }
            }
        }
    }

    /// Variable names in first-appearance (left to right) order.
    fn variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                if !out.iter().any(|v| v == name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(inner) | Expr::Call(_, inner) => inner.variables(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.variables(out);
                rhs.variables(out);
            }
        }
    }
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn atom(input: &str) -> IResult<&str, Expr> {
    alt((
        map(ws(double), Expr::Number),
        |input| {
            let (rest, name) = ws(identifier)(input)?;
            if let Some(&func) = FUNCTIONS.get(name) {
                let (rest, arg) =
                    delimited(ws(pchar('(')), additive, ws(pchar(')')))(rest)?;
                return Ok((rest, Expr::Call(func, Box::new(arg))));
            }
            Ok((rest, Expr::Variable(name.to_string())))
        },
        delimited(ws(pchar('(')), additive, ws(pchar(')'))),
    ))(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(pchar('-')), unary), |e| Expr::Neg(Box::new(e))),
        atom,
    ))(input)
}

// Right-associative: 2^3^2 is 2^(3^2).
fn power(input: &str) -> IResult<&str, Expr> {
    let (rest, base) = unary(input)?;
    match preceded(ws(pchar('^')), power)(rest) {
        Ok((rest, exponent)) => Ok((
            rest,
            Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)),
        )),
        Err(_) => Ok((rest, base)),
    }
}

fn multiplicative(input: &str) -> IResult<&str, Expr> {
    let (mut rest, mut lhs) = power(input)?;
    loop {
        let op = alt((
            map(ws(pchar('*')), |_| BinOp::Mul),
            map(ws(pchar('/')), |_| BinOp::Div),
            map(ws(pchar('%')), |_| BinOp::Mod),
        ))(rest);
        match op {
            Ok((after, op)) => {
                let (after, rhs) = power(after)?;
                lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
                rest = after;
            }
            Err(_) => return Ok((rest, lhs)),
        }
    }
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (mut rest, mut lhs) = multiplicative(input)?;
    loop {
        let op = alt((
            map(ws(pchar('+')), |_| BinOp::Add),
            map(ws(pchar('-')), |_| BinOp::Sub),
        ))(rest);
        match op {
            Ok((after, op)) => {
                let (after, rhs) = multiplicative(after)?;
                lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
                rest = after;
            }
            Err(_) => return Ok((rest, lhs)),
        }
    }
}

fn parse_expression(input: &str) -> Result<Expr, TraversalError> {
    all_consuming(additive)(input)
        .map(|(_, expr)| expr)
        .map_err(|err| {
            TraversalError::IllegalConstruction(format!(
                "cannot parse math expression '{}': {}",
                input, err
            ))
        })
}

#[derive(Debug, Clone)]
pub struct MathStep {
    meta: StepMeta,
    starts: VecDeque<Traverser>,
    expression: String,
    ast: Expr,
    variables: Vec<String>,
    ring: TraversalRing,
}

impl MathStep {
    pub fn new(expression: &str) -> Result<Self, TraversalError> {
        let ast = parse_expression(expression)?;
        let mut variables = Vec::new();
        ast.variables(&mut variables);
        Ok(Self {
            meta: StepMeta::default(),
            starts: VecDeque::new(),
            expression: expression.to_string(),
            ast,
            variables,
            ring: TraversalRing::default(),
        })
    }

    /// Bind all variables for one traverser. `Ok(None)` means a `by()`
    /// projection was unproductive and the traverser is filtered;
    /// unresolvable variables and non-numeric bindings are fatal.
    fn bind(
        &mut self,
        ctx: &TraversalContext,
        traverser: &Traverser,
    ) -> Result<Option<HashMap<String, f64>>, TraversalError> {
        let mut bindings = HashMap::with_capacity(self.variables.len());
        for variable in &self.variables {
            let by = self.ring.next();
            let subject = if variable == "_" {
                traverser.fork()
            } else {
                match resolve_binding(ctx, traverser, variable) {
                    Some(bound) => traverser.split(bound, false),
                    None => {
                        return Err(TraversalError::VariableResolution {
                            variable: variable.clone(),
                            found: "no binding".to_string(),
                        })
                    }
                }
            };
            let Some(projected) = by.apply(ctx, &subject)? else {
                self.ring.rewind();
                return Ok(None);
            };
            let Some(number) = projected.as_f64() else {
                return Err(TraversalError::VariableResolution {
                    variable: variable.clone(),
                    found: projected.kind_name().to_string(),
                });
            };
            bindings.insert(variable.clone(), number);
        }
        self.ring.rewind();
        Ok(Some(bindings))
    }
}

impl Step for MathStep {
    step_common!("math");

    fn add_start(&mut self, traverser: Traverser) {
        self.starts.push_back(traverser);
    }

    fn pull(
        &mut self,
        ctx: &TraversalContext,
        upstream_done: bool,
    ) -> Result<StepOut, TraversalError> {
        loop {
            let traverser = pull_start!(self, upstream_done);
            let Some(bindings) = self.bind(ctx, &traverser)? else {
                continue;
            };
            let result = self.ast.eval(&bindings);
            log::debug!("math '{}' evaluated to {}", self.expression, result);
            return Ok(StepOut::Emit(
                traverser.split(Value::Float(result), ctx.path_tracking),
            ));
        }
    }

    fn reset(&mut self) {
        self.starts.clear();
        self.ring.rewind();
    }

    fn requirements(&self) -> Requirements {
        let base = if self.variables.iter().any(|v| v != "_") {
            Requirements { labeled_path: true, path: true, ..Requirements::default() }
        } else {
            Requirements::default()
        };
        base.union(self.ring.requirements())
    }

    fn modulate_by(&mut self, by: ByMod) -> Result<(), TraversalError> {
        self.ring.add(by);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str, vars: &[(&str, f64)]) -> f64 {
        let ast = parse_expression(expression).unwrap();
        let bindings = vars.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        ast.eval(&bindings)
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3", &[]), 7.0);
        assert_eq!(eval("(1 + 2) * 3", &[]), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2", &[]), 512.0);
        assert_eq!(eval("-2 ^ 2", &[]), 4.0);
        assert_eq!(eval("10 % 3", &[]), 1.0);
    }

    #[test]
    fn functions_are_not_variables() {
        let ast = parse_expression("sqrt(a) + cos(0)").unwrap();
        let mut vars = Vec::new();
        ast.variables(&mut vars);
        assert_eq!(vars, vec!["a".to_string()]);
        assert_eq!(eval("sqrt(a) + cos(0)", &[("a", 9.0)]), 4.0);
    }

    #[test]
    fn variables_in_first_appearance_order() {
        let ast = parse_expression("b + a * b - _").unwrap();
        let mut vars = Vec::new();
        ast.variables(&mut vars);
        assert_eq!(vars, vec!["b".to_string(), "a".to_string(), "_".to_string()]);
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("sqrt(").is_err());
        assert!(parse_expression("a b").is_err());
    }
}
