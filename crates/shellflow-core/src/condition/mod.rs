//! Condition evaluation for workflow branching.
//!
//! Expressions are a small JavaScript-flavoured language evaluated against a
//! single bound name, `previousOutput`:
//!
//! ```text
//! previousOutput.includes("PASS")
//! previousOutput.length > 0 && !/error/i.test(previousOutput)
//! previousOutput.trim() === "ok" || previousOutput.match(/(\d+) passed/)[1] >= 10
//! ```
//!
//! [`ConditionEvaluator::evaluate`] never fails: parse errors, runtime errors
//! and non-boolean results all come back as `false`.

pub mod parser;

use regex::{Regex, RegexBuilder};

use parser::{BinaryOp, Expr, Literal, LogicalOp, UnaryOp};

/// Name of the one variable visible to expressions.
pub const PREVIOUS_OUTPUT: &str = "previousOutput";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("evaluation error: {0}")]
    Eval(String),

    #[error("expression produced {0}, not a boolean")]
    NotBoolean(&'static str),
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Regex(Regex),
    /// Result of `String.match`: the full match followed by capture groups.
    Match(Vec<Option<String>>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "a string",
            Value::Num(_) => "a number",
            Value::Bool(_) => "a boolean",
            Value::Null => "null",
            Value::Regex(_) => "a regex",
            Value::Match(_) => "a match array",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Regex(_) | Value::Match(_) => true,
        }
    }

    fn to_number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Null => 0.0,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Match(groups) if groups.len() == 1 => {
                Value::Str(groups[0].clone().unwrap_or_default()).to_number()
            }
            Value::Regex(_) | Value::Match(_) => f64::NAN,
        }
    }

    fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Regex(re) => format!("/{}/", re.as_str()),
            Value::Match(groups) => groups
                .iter()
                .map(|g| g.clone().unwrap_or_default())
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        // Objects compare by identity; two evaluated objects are never the same one.
        _ => false,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Str(_), Value::Str(_))
        | (Value::Num(_), Value::Num(_))
        | (Value::Bool(_), Value::Bool(_)) => strict_eq(a, b),
        (Value::Bool(_), _) => loose_eq(&Value::Num(a.to_number()), b),
        (_, Value::Bool(_)) => loose_eq(a, &Value::Num(b.to_number())),
        (Value::Num(x), Value::Str(_)) => *x == b.to_number(),
        (Value::Str(_), Value::Num(y)) => a.to_number() == *y,
        (Value::Match(_), Value::Str(s)) | (Value::Str(s), Value::Match(_)) => {
            let other = if matches!(a, Value::Match(_)) { a } else { b };
            other.to_text() == *s
        }
        (Value::Match(_), Value::Num(_)) | (Value::Num(_), Value::Match(_)) => {
            a.to_number() == b.to_number()
        }
        _ => false,
    }
}

fn compare(op: BinaryOp, a: &Value, b: &Value) -> bool {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        // JavaScript orders strings by UTF-16 code units.
        let ord = x.encode_utf16().cmp(y.encode_utf16());
        return match op {
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::Le => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            BinaryOp::Ge => ord.is_ge(),
            _ => false,
        };
    }
    let (x, y) = (a.to_number(), b.to_number());
    match op {
        BinaryOp::Lt => x < y,
        BinaryOp::Le => x <= y,
        BinaryOp::Gt => x > y,
        BinaryOp::Ge => x >= y,
        _ => false,
    }
}

fn build_regex(pattern: &str, flags: &str) -> Result<Regex, ConditionError> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            // Only the first match is ever used.
            'g' | 'u' | 'y' => {}
            other => {
                return Err(ConditionError::Parse(format!(
                    "unsupported regex flag '{}'",
                    other
                )))
            }
        }
    }
    builder
        .build()
        .map_err(|e| ConditionError::Parse(format!("invalid regex /{}/: {}", pattern, e)))
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Evaluates condition expressions against a step's previous output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `expression` with `previousOutput` bound to the trimmed
    /// `previous_output`. Every failure is reported as `false`.
    pub fn evaluate(&self, expression: &str, previous_output: &str) -> bool {
        match self.try_evaluate(expression, previous_output) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(
                    "[ConditionEvaluator] `{}` treated as false: {}",
                    expression,
                    e
                );
                false
            }
        }
    }

    /// Like [`evaluate`](Self::evaluate) but reports why a result is not `true`/`false`.
    pub fn try_evaluate(
        &self,
        expression: &str,
        previous_output: &str,
    ) -> Result<bool, ConditionError> {
        let expr = parser::parse(expression)?;
        let scope = Scope {
            previous_output: previous_output.trim(),
        };
        match scope.eval(&expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(ConditionError::NotBoolean(other.type_name())),
        }
    }

    /// Syntax check only.
    pub fn check(&self, expression: &str) -> Result<(), ConditionError> {
        parser::parse(expression).map(|_| ())
    }
}

/// The isolated evaluation scope: exactly one bound name.
struct Scope<'a> {
    previous_output: &'a str,
}

impl Scope<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value, ConditionError> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Str(s) => Value::Str(s.clone()),
                Literal::Num(n) => Value::Num(*n),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
                Literal::Regex { pattern, flags } => Value::Regex(build_regex(pattern, flags)?),
            }),
            Expr::Ident(name) if name == PREVIOUS_OUTPUT => {
                Ok(Value::Str(self.previous_output.to_string()))
            }
            Expr::Ident(name) => Err(ConditionError::Eval(format!("{} is not defined", name))),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Num(-value.to_number()),
                })
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Binary { op, left, right } => {
                let a = self.eval(left)?;
                let b = self.eval(right)?;
                Ok(Value::Bool(match op {
                    BinaryOp::LooseEq => loose_eq(&a, &b),
                    BinaryOp::LooseNotEq => !loose_eq(&a, &b),
                    BinaryOp::StrictEq => strict_eq(&a, &b),
                    BinaryOp::StrictNotEq => !strict_eq(&a, &b),
                    _ => compare(*op, &a, &b),
                }))
            }
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                self.member(&object, property)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?.to_number();
                self.index(&object, index)
            }
            Expr::Call {
                object,
                method,
                args,
            } => {
                let object = self.eval(object)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(&object, method, &args)
            }
        }
    }

    fn member(&self, object: &Value, property: &str) -> Result<Value, ConditionError> {
        match (object, property) {
            (Value::Str(s), "length") => Ok(Value::Num(utf16_len(s) as f64)),
            (Value::Match(groups), "length") => Ok(Value::Num(groups.len() as f64)),
            (Value::Regex(re), "source") => Ok(Value::Str(re.as_str().to_string())),
            (Value::Null, _) => Err(ConditionError::Eval(format!(
                "cannot read property '{}' of null",
                property
            ))),
            // Unknown properties read as undefined, like the host language.
            _ => Ok(Value::Null),
        }
    }

    fn index(&self, object: &Value, index: f64) -> Result<Value, ConditionError> {
        if index.fract() != 0.0 || index < 0.0 {
            return Ok(Value::Null);
        }
        let i = index as usize;
        match object {
            Value::Match(groups) => Ok(groups
                .get(i)
                .cloned()
                .flatten()
                .map(Value::Str)
                .unwrap_or(Value::Null)),
            Value::Str(s) => Ok(s
                .chars()
                .nth(i)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::Null)),
            Value::Null => Err(ConditionError::Eval("cannot index null".into())),
            _ => Ok(Value::Null),
        }
    }

    fn call(&self, object: &Value, method: &str, args: &[Value]) -> Result<Value, ConditionError> {
        let arg_text = |i: usize| -> String {
            args.get(i)
                .map(|v| v.to_text())
                .unwrap_or_else(|| "undefined".to_string())
        };

        match object {
            Value::Str(s) => match method {
                "includes" => Ok(Value::Bool(s.contains(arg_text(0).as_str()))),
                "startsWith" => Ok(Value::Bool(s.starts_with(arg_text(0).as_str()))),
                "endsWith" => Ok(Value::Bool(s.ends_with(arg_text(0).as_str()))),
                "indexOf" => {
                    let needle = arg_text(0);
                    Ok(Value::Num(match s.find(needle.as_str()) {
                        Some(byte) => utf16_len(&s[..byte]) as f64,
                        None => -1.0,
                    }))
                }
                "trim" => Ok(Value::Str(s.trim().to_string())),
                "toLowerCase" => Ok(Value::Str(s.to_lowercase())),
                "toUpperCase" => Ok(Value::Str(s.to_uppercase())),
                "match" => {
                    let re = match args.first() {
                        Some(Value::Regex(re)) => re.clone(),
                        Some(other) => build_regex(&other.to_text(), "")?,
                        None => build_regex("", "")?,
                    };
                    Ok(match re.captures(s) {
                        Some(caps) => Value::Match(
                            caps.iter()
                                .map(|m| m.map(|m| m.as_str().to_string()))
                                .collect(),
                        ),
                        None => Value::Null,
                    })
                }
                other => Err(ConditionError::Eval(format!(
                    "string has no method '{}'",
                    other
                ))),
            },
            Value::Regex(re) => match method {
                "test" => Ok(Value::Bool(re.is_match(&arg_text(0)))),
                other => Err(ConditionError::Eval(format!(
                    "regex has no method '{}'",
                    other
                ))),
            },
            other => Err(ConditionError::Eval(format!(
                "{} has no method '{}'",
                other.type_name(),
                method
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str, prev: &str) -> bool {
        ConditionEvaluator::new().evaluate(expr, prev)
    }

    #[test]
    fn test_substring_checks() {
        assert!(eval("previousOutput.includes('PASS')", "BUILD PASSED"));
        assert!(!eval("previousOutput.includes('FAIL')", "BUILD PASSED"));
        assert!(eval("previousOutput.startsWith(\"BUILD\")", "BUILD PASSED"));
        assert!(eval("previousOutput.endsWith(`ED`)", "BUILD PASSED"));
        assert!(eval("previousOutput.indexOf('PASS') === 6", "BUILD PASSED"));
    }

    #[test]
    fn test_length_and_binding_is_trimmed() {
        assert!(!eval("previousOutput.length > 0", ""));
        assert!(!eval("previousOutput.length > 0", "  \n "));
        assert!(eval("previousOutput.length == 3", "  abc\n"));
        assert!(eval("previousOutput.length > 2 && previousOutput.length < 10", "hello"));
    }

    #[test]
    fn test_regex() {
        assert!(eval("/pass/i.test(previousOutput)", "Tests Passed"));
        assert!(!eval("/^fail/.test(previousOutput)", "ok, no failures"));
        assert!(eval("previousOutput.match(/(\\d+) passed/)[1] >= 10", "42 passed, 0 failed"));
        assert!(eval("previousOutput.match(/nope/) === null", "anything"));
        assert!(eval("!!previousOutput.match('ok')", "all ok"));
    }

    #[test]
    fn test_equality_semantics() {
        assert!(eval("previousOutput == 42", "42"));
        assert!(!eval("previousOutput === 42", "42"));
        assert!(eval("previousOutput === '42'", "42"));
        assert!(eval("previousOutput != 'x'", "y"));
        assert!(eval("null == undefined", ""));
        assert!(eval("true == 1", ""));
        assert!(!eval("null == 0", ""));
    }

    #[test]
    fn test_relational_semantics() {
        assert!(eval("previousOutput > 9", "10"));
        // both strings: lexicographic
        assert!(!eval("previousOutput > '9'", "10"));
        assert!(!eval("previousOutput > 1", "abc"));
        assert!(eval("-previousOutput < 0", "5"));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        // The right side would be an error if evaluated.
        assert!(eval("true || undefinedThing", ""));
        assert!(!eval("false && undefinedThing", ""));
        assert!(eval("!(previousOutput.length > 0) || previousOutput === 'x'", ""));
    }

    #[test]
    fn test_failures_are_false() {
        let evaluator = ConditionEvaluator::new();
        assert!(!eval("this is not valid (", "x"));
        assert!(!eval("someOtherVariable.includes('x')", "x"));
        assert!(!eval("previousOutput.explode()", "x"));
        assert!(!eval("/[unclosed/.test(previousOutput)", "x"));
        assert!(!eval("previousOutput.match(/z/).length > 0", "x"));

        assert!(matches!(
            evaluator.try_evaluate("process.exit(1)", ""),
            Err(ConditionError::Eval(_))
        ));
        assert!(matches!(
            evaluator.try_evaluate("(", ""),
            Err(ConditionError::Parse(_))
        ));
    }

    #[test]
    fn test_non_boolean_result_is_false() {
        let evaluator = ConditionEvaluator::new();
        // Truthy, but not a boolean.
        assert!(!eval("previousOutput", "non-empty"));
        assert!(!eval("previousOutput.length", "abc"));
        assert!(!eval("previousOutput && true && 'yes'", "x"));
        assert_eq!(
            evaluator.try_evaluate("previousOutput.trim()", "x"),
            Err(ConditionError::NotBoolean("a string"))
        );
        assert!(eval("previousOutput && true", "x"));
    }

    #[test]
    fn test_case_conversion() {
        assert!(eval("previousOutput.toLowerCase().includes('pass')", "PASS"));
        assert!(eval("previousOutput.toUpperCase() === 'OK'", "ok"));
        assert!(eval("previousOutput.trim().length === 2", "ok"));
    }

    #[test]
    fn test_check() {
        let evaluator = ConditionEvaluator::new();
        assert!(evaluator.check("previousOutput.length > 0").is_ok());
        assert!(evaluator.check("previousOutput.length >").is_err());
    }

    #[test]
    fn test_oversized_expression_is_false() {
        let chain = vec!["previousOutput.length > 0"; 1000].join(" && ");
        assert!(!eval(&chain, "x"));
        let trims = format!("previousOutput{}.length > 0", ".trim()".repeat(1000));
        assert!(!eval(&trims, "x"));
        assert!(matches!(
            ConditionEvaluator::new().try_evaluate(&chain, "x"),
            Err(ConditionError::Parse(_))
        ));
    }
}
