//! Entry predicates
//!
//! A small, side-effect free expression language evaluated against a
//! resolved directory entry:
//!
//! ```text
//! attr(department) == "Potions" && !(dn contains "ou=former")
//! has(employeeNumber) || username starts_with "svc-"
//! ```
//!
//! Comparisons are ASCII case-insensitive. Multi-valued operands match when
//! any value matches; `!=` holds when no value is equal. A missing attribute
//! is an empty value set.

mod lexer;
mod parser;

use ldapgate_core::types::LdapEntry;
use thiserror::Error;

pub use parser::{CompareOp, Expr, Operand};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {position}")]
pub struct PredicateError {
    pub message: String,
    pub position: usize,
}

impl PredicateError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// A registered allow rule evaluated by the policy gate
pub trait EntryPredicate: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, entry: &LdapEntry, username: &str) -> Result<bool, PredicateError>;
}

/// A parsed predicate expression
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        let tokens = lexer::tokenize(source)?;
        let root = parser::Parser::new(tokens).parse()?;

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn matches(&self, entry: &LdapEntry, username: &str) -> bool {
        eval(&self.root, entry, username)
    }
}

impl EntryPredicate for Expression {
    fn name(&self) -> &str {
        "expression"
    }

    fn evaluate(&self, entry: &LdapEntry, username: &str) -> Result<bool, PredicateError> {
        Ok(self.matches(entry, username))
    }
}

fn values(operand: &Operand, entry: &LdapEntry, username: &str) -> Vec<String> {
    match operand {
        Operand::Dn => vec![entry.dn.to_ascii_lowercase()],
        Operand::Username => vec![username.to_ascii_lowercase()],
        Operand::Attr(name) => entry
            .get_attrs(name)
            .iter()
            .map(|v| v.to_ascii_lowercase())
            .collect(),
        Operand::Literal(s) => vec![s.to_ascii_lowercase()],
    }
}

fn eval(expr: &Expr, entry: &LdapEntry, username: &str) -> bool {
    match expr {
        Expr::Bool(b) => *b,
        Expr::Not(inner) => !eval(inner, entry, username),
        Expr::And(l, r) => eval(l, entry, username) && eval(r, entry, username),
        Expr::Or(l, r) => eval(l, entry, username) || eval(r, entry, username),
        Expr::Has(attr) => entry.has_attr(attr),
        Expr::Compare { left, op, right } => {
            let lhs = values(left, entry, username);
            let rhs = values(right, entry, username);
            let any = |f: fn(&str, &str) -> bool| {
                lhs.iter().any(|l| rhs.iter().any(|r| f(l, r)))
            };

            match op {
                CompareOp::Eq => any(|l, r| l == r),
                CompareOp::Ne => !any(|l, r| l == r),
                CompareOp::Contains => any(|l, r| l.contains(r)),
                CompareOp::StartsWith => any(|l, r| l.starts_with(r)),
                CompareOp::EndsWith => any(|l, r| l.ends_with(r)),
            }
        }
    }
}
