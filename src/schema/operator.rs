//! Search operators and their accepted spellings.

use serde::Serialize;

/// A relational operator usable in a leaf filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = "in_")]
    In,
}

/// Every operator, in the order they are advertised to clients.
pub const SCALAR_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Ne,
    Operator::Lt,
    Operator::Le,
    Operator::Gt,
    Operator::Ge,
    Operator::Like,
    Operator::Regex,
    Operator::In,
];

/// Relations may only be tested for presence or absence.
pub const RELATION_OPERATORS: &[Operator] = &[Operator::Eq, Operator::Ne];

impl Operator {
    /// Parse an operator token, accepting the long-form aliases.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" | "__eq__" => Some(Operator::Eq),
            "!=" | "__ne__" => Some(Operator::Ne),
            "<" | "__lt__" => Some(Operator::Lt),
            "<=" | "__le__" => Some(Operator::Le),
            ">" | "__gt__" => Some(Operator::Gt),
            ">=" | "__ge__" => Some(Operator::Ge),
            "like" => Some(Operator::Like),
            "regex" | "regexp" => Some(Operator::Regex),
            "in" | "in_" => Some(Operator::In),
            _ => None,
        }
    }

    /// Canonical token used in error keys and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "like",
            Operator::Regex => "regex",
            Operator::In => "in_",
        }
    }

    /// SQL comparison token for the ordering/equality operators.
    pub fn sql_comparison(&self) -> Option<&'static str> {
        match self {
            Operator::Eq => Some("="),
            Operator::Ne => Some("<>"),
            Operator::Lt => Some("<"),
            Operator::Le => Some("<="),
            Operator::Gt => Some(">"),
            Operator::Ge => Some(">="),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_to_same_operator() {
        assert_eq!(Operator::parse("="), Operator::parse("__eq__"));
        assert_eq!(Operator::parse("regexp"), Some(Operator::Regex));
        assert_eq!(Operator::parse("in"), Some(Operator::In));
        assert_eq!(Operator::parse("in_"), Some(Operator::In));
    }

    #[test]
    fn test_unknown_operator() {
        assert_eq!(Operator::parse("contains"), None);
        assert_eq!(Operator::parse(""), None);
    }

    #[test]
    fn test_only_comparisons_have_sql_tokens() {
        assert_eq!(Operator::Ne.sql_comparison(), Some("<>"));
        assert_eq!(Operator::Like.sql_comparison(), None);
        assert_eq!(Operator::In.sql_comparison(), None);
    }
}
