//! Parse tree of the JSON filter language.
//!
//! ```text
//! ["and", [e1, e2, ...]]
//! ["or",  [e1, e2, ...]]
//! ["not", e]
//! [model, attribute, operator, value]
//! [model, relation, attribute, operator, value]
//! ```
//!
//! `not` reads only its first argument. Extra arguments are ignored, and a
//! list of expressions in argument position stands for its first element, so
//! `["not", [A, B, C]]` and `["not", A, B, C]` both mean `not A`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Leaf(Leaf),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub model: String,
    pub attribute: String,
    /// Attribute of the related model for two-hop leaves.
    pub sub_attribute: Option<String>,
    pub operator: String,
    pub value: Value,
}

/// The submitted structure is not a filter expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Malformed;

impl FilterExpr {
    pub fn parse(value: &Value) -> Result<Self, Malformed> {
        let items = value.as_array().ok_or(Malformed)?;
        let head = items.first().and_then(Value::as_str).ok_or(Malformed)?;

        match head {
            "and" | "or" => {
                if items.len() != 2 {
                    return Err(Malformed);
                }
                let operands = items[1].as_array().ok_or(Malformed)?;
                if operands.is_empty() {
                    return Err(Malformed);
                }
                let parsed = operands
                    .iter()
                    .map(FilterExpr::parse)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if head == "and" {
                    FilterExpr::And(parsed)
                } else {
                    FilterExpr::Or(parsed)
                })
            }
            "not" => {
                let argument = items.get(1).ok_or(Malformed)?;
                let operand = match argument {
                    Value::Array(list) if matches!(list.first(), Some(Value::Array(_))) => &list[0],
                    other => other,
                };
                Ok(FilterExpr::Not(Box::new(FilterExpr::parse(operand)?)))
            }
            _ => Leaf::parse(items).map(FilterExpr::Leaf),
        }
    }
}

impl Leaf {
    fn parse(items: &[Value]) -> Result<Self, Malformed> {
        let text = |index: usize| -> Result<String, Malformed> {
            items
                .get(index)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(Malformed)
        };

        match items.len() {
            4 => Ok(Leaf {
                model: text(0)?,
                attribute: text(1)?,
                sub_attribute: None,
                operator: text(2)?,
                value: items[3].clone(),
            }),
            5 => Ok(Leaf {
                model: text(0)?,
                attribute: text(1)?,
                sub_attribute: Some(text(2)?),
                operator: text(3)?,
                value: items[4].clone(),
            }),
            _ => Err(Malformed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(model: &str, attribute: &str, operator: &str, value: Value) -> FilterExpr {
        FilterExpr::Leaf(Leaf {
            model: model.into(),
            attribute: attribute.into(),
            sub_attribute: None,
            operator: operator.into(),
            value,
        })
    }

    #[test]
    fn test_parse_leaf() {
        let parsed = FilterExpr::parse(&json!(["Form", "transcription", "like", "%a%"])).unwrap();
        assert_eq!(parsed, leaf("Form", "transcription", "like", json!("%a%")));
    }

    #[test]
    fn test_parse_two_hop_leaf() {
        let parsed = FilterExpr::parse(&json!(["Form", "enterer", "first_name", "=", "Ann"])).unwrap();
        match parsed {
            FilterExpr::Leaf(leaf) => {
                assert_eq!(leaf.sub_attribute.as_deref(), Some("first_name"));
                assert_eq!(leaf.operator, "=");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_combinators() {
        let parsed = FilterExpr::parse(&json!([
            "and",
            [
                ["Form", "transcription", "like", "%cat%"],
                ["not", ["Tag", "name", "=", "archive"]]
            ]
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            FilterExpr::And(vec![
                leaf("Form", "transcription", "like", json!("%cat%")),
                FilterExpr::Not(Box::new(leaf("Tag", "name", "=", json!("archive")))),
            ])
        );
    }

    #[test]
    fn test_not_reads_first_operand_only() {
        let a = json!(["Form", "id", "=", 1]);
        let b = json!(["Form", "id", "=", 2]);
        let c = json!(["Form", "id", "=", 3]);
        let expected = FilterExpr::parse(&json!(["not", a.clone()])).unwrap();

        let listed = FilterExpr::parse(&json!(["not", [a.clone(), b.clone(), c.clone()]])).unwrap();
        let trailing = FilterExpr::parse(&json!(["not", a, b, c])).unwrap();
        assert_eq!(listed, expected);
        assert_eq!(trailing, expected);
    }

    #[test]
    fn test_malformed_shapes() {
        let cases = [
            json!([]),
            json!("Form"),
            json!(["and"]),
            json!(["and", []]),
            json!(["and", ["Form", "id", "=", 1], ["Form", "id", "=", 2]]),
            json!(["or", "Form"]),
            json!(["not"]),
            json!(["Form", "id", "="]),
            json!(["Form", "id", "=", 1, 2, 3]),
            json!(["Form", 5, "=", 1]),
            json!([["Form"], "id", "=", 1]),
            json!({"model": "Form"}),
        ];
        for case in cases {
            assert_eq!(FilterExpr::parse(&case), Err(Malformed), "{}", case);
        }
    }
}
