//! Static dependency extraction
//!
//! Walks a (fragment-resolved) expression and records which parts of the
//! evaluation data it dereferences. The orchestrator uses this to re-issue
//! only the evaluations a response change can affect. Anything the walk
//! cannot see through makes the whole set [`Dependencies::Unknown`], which
//! is treated as "depends on everything".

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde_json::Value;

use super::{operator::Operator, Expression};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    Response(String),
    ThisResponse,
    CurrentUser,
    ApplicationData,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Response(code) => write!(f, "responses.{}", code),
            Dependency::ThisResponse => write!(f, "thisResponse"),
            Dependency::CurrentUser => write!(f, "currentUser"),
            Dependency::ApplicationData => write!(f, "applicationData"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependencies {
    Known(BTreeSet<Dependency>),
    Unknown,
}

impl Default for Dependencies {
    fn default() -> Self {
        Dependencies::Known(BTreeSet::new())
    }
}

impl fmt::Display for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependencies::Unknown => write!(f, "*"),
            Dependencies::Known(set) if set.is_empty() => write!(f, "-"),
            Dependencies::Known(set) => {
                let names: Vec<String> = set.iter().map(ToString::to_string).collect();
                write!(f, "{}", names.join(", "))
            }
        }
    }
}

impl Dependencies {
    pub fn of(expression: &Expression) -> Self {
        let mut deps = Dependencies::default();
        collect(expression, &mut deps);
        deps
    }

    /// No dependency on any runtime data: the value never changes.
    pub fn is_static(&self) -> bool {
        matches!(self, Dependencies::Known(set) if set.is_empty())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Dependencies::Unknown)
    }

    pub fn insert(&mut self, dependency: Dependency) {
        if let Dependencies::Known(set) = self {
            set.insert(dependency);
        }
    }

    pub fn contains(&self, dependency: &Dependency) -> bool {
        match self {
            Dependencies::Unknown => true,
            Dependencies::Known(set) => set.contains(dependency),
        }
    }

    pub fn merge(&mut self, other: Dependencies) {
        match other {
            Dependencies::Unknown => *self = Dependencies::Unknown,
            Dependencies::Known(other) => {
                if let Dependencies::Known(set) = self {
                    set.extend(other);
                }
            }
        }
    }

    /// Whether a change to the responses in `changed` can alter the value of
    /// an expression evaluated for the field `own_code`.
    pub fn affected_by(&self, changed: &HashSet<String>, own_code: &str) -> bool {
        if changed.is_empty() {
            return false;
        }
        match self {
            Dependencies::Unknown => true,
            Dependencies::Known(set) => set.iter().any(|dep| match dep {
                Dependency::Response(code) => changed.contains(code),
                Dependency::ThisResponse => changed.contains(own_code),
                Dependency::CurrentUser | Dependency::ApplicationData => false,
            }),
        }
    }

    pub fn response_codes(&self) -> Vec<&str> {
        match self {
            Dependencies::Unknown => Vec::new(),
            Dependencies::Known(set) => set
                .iter()
                .filter_map(|dep| match dep {
                    Dependency::Response(code) => Some(code.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

fn collect(expression: &Expression, deps: &mut Dependencies) {
    if deps.is_unknown() {
        return;
    }
    match expression {
        Expression::Literal(_) => {}
        // fragments must be resolved before extraction
        Expression::Fragment(_) => *deps = Dependencies::Unknown,
        Expression::Operator(node) => {
            if Operator::from_name(&node.operator) == Some(Operator::ObjectProperties) {
                let path = node.named.get("property").or_else(|| node.children.first());
                match path {
                    Some(Expression::Literal(Value::String(path))) => match classify(path) {
                        Some(dependency) => deps.insert(dependency),
                        None => *deps = Dependencies::Unknown,
                    },
                    _ => *deps = Dependencies::Unknown,
                }
            }
            for child in &node.children {
                collect(child, deps);
            }
            for value in node.named.values() {
                collect(value, deps);
            }
        }
    }
}

fn classify(path: &str) -> Option<Dependency> {
    let mut segments = path.split('.');
    match segments.next()? {
        "responses" => match segments.next()? {
            "thisResponse" => Some(Dependency::ThisResponse),
            "" => None,
            code => Some(Dependency::Response(code.to_string())),
        },
        "thisResponse" => Some(Dependency::ThisResponse),
        "currentUser" => Some(Dependency::CurrentUser),
        "applicationData" => Some(Dependency::ApplicationData),
        _ => None,
    }
}
