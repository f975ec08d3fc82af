//! Edge condition evaluation
//!
//! A condition is either `left <op> right` or a single operand tested for
//! truthiness. Operands are substituted against the execution variables
//! first. Comparisons are numeric when both sides parse as numbers and
//! lexical otherwise.

use std::cmp::Ordering;

use crate::types::ExecutionContext;
use crate::variables::replace_variables;

/// Supported comparison operators, longest first so `<=` wins over `<`
const OPERATORS: [(&str, Operator); 7] = [
    ("==", Operator::Eq),
    ("!=", Operator::Ne),
    ("<=", Operator::Le),
    (">=", Operator::Ge),
    ("<", Operator::Lt),
    (">", Operator::Gt),
    (" contains ", Operator::Contains),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
}

/// Evaluate a condition expression against the current variables
pub fn evaluate_condition(expression: &str, context: &ExecutionContext) -> bool {
    let resolved = replace_variables(expression, context);
    let resolved = resolved.trim();

    for (token, op) in OPERATORS {
        if let Some(idx) = resolved.find(token) {
            let left = unquote(&resolved[..idx]);
            let right = unquote(&resolved[idx + token.len()..]);
            return compare(left, op, right);
        }
    }

    is_truthy(unquote(resolved))
}

fn compare(left: &str, op: Operator, right: &str) -> bool {
    if op == Operator::Contains {
        return left.contains(right);
    }
    let ordering = match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r),
        _ => Some(left.cmp(right)),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Contains => false,
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Truthiness of a single resolved operand
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty()
        || value.eq_ignore_ascii_case("false")
        || value == "0"
        || value.eq_ignore_ascii_case("null")
        || value.eq_ignore_ascii_case("no")
        || (value.starts_with("{{") && value.ends_with("}}")))
}
