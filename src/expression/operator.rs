//! Operator catalogue
//!
//! Every operator node must name one of these operators, either by its
//! canonical name or by one of its aliases. Lookup is case-insensitive.

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    And,
    Or,
    Equal,
    NotEqual,
    Plus,
    Subtract,
    Multiply,
    Divide,
    GreaterThan,
    LessThan,
    Conditional,
    Regex,
    ObjectProperties,
    StringSubstitution,
    Split,
    Count,
    Get,
    Post,
    Graphql,
    Sql,
    BuildObject,
    Match,
    CustomFunctions,
    Passthru,
}

lazy_static! {
    static ref ALIASES: HashMap<String, Operator> = {
        let mut map = HashMap::new();
        for operator in Operator::iter() {
            map.insert(operator.to_string().to_lowercase(), operator);
            for alias in operator.aliases() {
                map.insert(alias.to_lowercase(), operator);
            }
        }
        map
    };
}

impl Operator {
    /// Resolves a canonical name or alias.
    pub fn from_name(name: &str) -> Option<Self> {
        ALIASES.get(&name.trim().to_lowercase()).copied()
    }

    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Operator::And => &["and", "&", "&&"],
            Operator::Or => &["or", "|", "||"],
            Operator::Equal => &["equal", "equals", "=", "==", "eq"],
            Operator::NotEqual => &["notEqual", "!=", "<>", "ne"],
            Operator::Plus => &["plus", "+", "add", "concat", "join", "merge"],
            Operator::Subtract => &["subtract", "minus", "-", "takeaway"],
            Operator::Multiply => &["multiply", "times", "*", "x"],
            Operator::Divide => &["divide", "/", "÷"],
            Operator::GreaterThan => &["greaterThan", ">", "higher", "larger", "compare"],
            Operator::LessThan => &["lessThan", "<", "lower", "smaller"],
            Operator::Conditional => &["conditional", "ifThen", "?"],
            Operator::Regex => &["regex", "patternMatch", "matchPattern"],
            Operator::ObjectProperties => &[
                "objectProperties",
                "objectProperty",
                "objProps",
                "getProperty",
                "getObjProp",
            ],
            Operator::StringSubstitution => &["stringSubstitution", "substitute", "stringSub", "replace"],
            Operator::Split => &["split", "arraySplit"],
            Operator::Count => &["count", "length", "len"],
            Operator::Get => &["get", "api"],
            Operator::Post => &["post"],
            Operator::Graphql => &["graphQL", "gql"],
            Operator::Sql => &["sql", "pgSql", "postgres"],
            Operator::BuildObject => &["buildObject", "build", "object"],
            Operator::Match => &["match", "switch"],
            Operator::CustomFunctions => &[
                "objectFunctions",
                "customFunctions",
                "function",
                "functions",
                "runFunction",
            ],
            Operator::Passthru => &["passThru", "_", "pass", "ignore", "coerce", "convert"],
        }
    }

    /// Operators that reach out to remote data sources.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Operator::Get | Operator::Post | Operator::Graphql | Operator::Sql
        )
    }
}
