//! Validated predicates and their SQL rendering.
//!
//! Values are always bound, never interpolated. Column names, table names and
//! JSON paths come from the static registry.

use sqlx::{QueryBuilder, Sqlite};

use crate::schema::{Column, FieldDescriptor, FieldKind, Link};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// `=`, `<>`, `<`, `<=`, `>` or `>=` against a bound value.
    Binary(&'static str, SqlValue),
    Like(String),
    Regex(String),
    In(Vec<SqlValue>),
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare {
        column: Column,
        comparison: Comparison,
    },
    /// Some row reachable through `relation` exists (and satisfies `inner`).
    Related {
        relation: &'static FieldDescriptor,
        inner: Option<Box<Predicate>>,
    },
}

impl Predicate {
    pub fn compare(column: Column, comparison: Comparison) -> Self {
        Predicate::Compare { column, comparison }
    }

    pub fn related(relation: &'static FieldDescriptor, inner: Option<Predicate>) -> Self {
        Predicate::Related {
            relation,
            inner: inner.map(Box::new),
        }
    }

    /// Append this predicate to `builder`, evaluated against the row aliased
    /// as `alias`.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Sqlite>, alias: &str) {
        let mut aliases = 0;
        self.push(builder, alias, &mut aliases);
    }

    fn push(&self, builder: &mut QueryBuilder<'_, Sqlite>, alias: &str, aliases: &mut usize) {
        match self {
            Predicate::And(parts) | Predicate::Or(parts) => {
                let joiner = if matches!(self, Predicate::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                builder.push("(");
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        builder.push(joiner);
                    }
                    part.push(builder, alias, aliases);
                }
                builder.push(")");
            }
            Predicate::Not(inner) => {
                builder.push("NOT (");
                inner.push(builder, alias, aliases);
                builder.push(")");
            }
            Predicate::Compare { column, comparison } => {
                push_comparison(builder, &column.sql(alias), comparison);
            }
            Predicate::Related { relation, inner } => {
                *aliases += 1;
                let target_alias = format!("r{}", aliases);
                let link_alias = format!("l{}", aliases);

                builder.push("EXISTS (SELECT 1 FROM ");
                match relation.kind {
                    FieldKind::ToOne { target, fk } => {
                        builder.push(format!(
                            "{table} AS {t} WHERE {t}.id = {outer}.{fk}",
                            table = target.table(),
                            t = target_alias,
                            outer = alias,
                            fk = fk,
                        ));
                    }
                    FieldKind::ToMany {
                        target,
                        link:
                            Link::Table {
                                table,
                                local,
                                foreign,
                            },
                    } => {
                        builder.push(format!(
                            "{link} AS {l} JOIN {table} AS {t} ON {t}.id = {l}.{foreign} \
                             WHERE {l}.{local} = {outer}.id",
                            link = table,
                            l = link_alias,
                            table = target.table(),
                            t = target_alias,
                            foreign = foreign,
                            local = local,
                            outer = alias,
                        ));
                    }
                    FieldKind::ToMany {
                        target,
                        link: Link::Child(fk),
                    } => {
                        builder.push(format!(
                            "{table} AS {t} WHERE {t}.{fk} = {outer}.id",
                            table = target.table(),
                            t = target_alias,
                            fk = fk,
                            outer = alias,
                        ));
                    }
                    FieldKind::Scalar { .. } => {
                        // Registry relations are never scalars; match nothing.
                        builder.push("(SELECT 1) AS none WHERE 0");
                    }
                }
                if let Some(inner) = inner {
                    builder.push(" AND ");
                    inner.push(builder, &target_alias, aliases);
                }
                builder.push(")");
            }
        }
    }
}

fn push_comparison(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, comparison: &Comparison) {
    match comparison {
        Comparison::IsNull => {
            builder.push(format!("{} IS NULL", column));
        }
        Comparison::IsNotNull => {
            builder.push(format!("{} IS NOT NULL", column));
        }
        Comparison::Binary(op, value) => {
            builder.push(format!("{} {} ", column, op));
            push_value(builder, value);
        }
        Comparison::Like(pattern) => {
            builder.push(format!("{} LIKE ", column));
            builder.push_bind(pattern.clone());
        }
        Comparison::Regex(pattern) => {
            builder.push(format!("{} REGEXP ", column));
            builder.push_bind(pattern.clone());
        }
        Comparison::In(values) if values.is_empty() => {
            builder.push("0");
        }
        Comparison::In(values) => {
            builder.push(format!("{} IN (", column));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, value);
            }
            builder.push(")");
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &SqlValue) {
    match value {
        SqlValue::Text(text) => {
            builder.push_bind(text.clone());
        }
        SqlValue::Integer(int) => {
            builder.push_bind(*int);
        }
        SqlValue::Real(real) => {
            builder.push_bind(*real);
        }
        SqlValue::Null => {
            builder.push_bind(None::<String>);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelName;

    fn render(predicate: &Predicate) -> String {
        let mut builder = QueryBuilder::<Sqlite>::new("");
        predicate.push_sql(&mut builder, "root");
        builder.sql().to_string()
    }

    #[test]
    fn test_render_comparison_binds_value() {
        let predicate = Predicate::compare(
            Column::Plain("transcription"),
            Comparison::Like("%cat%".into()),
        );
        assert_eq!(render(&predicate), "root.transcription LIKE ?");
    }

    #[test]
    fn test_render_null_checks() {
        let predicate = Predicate::compare(Column::Plain("date_elicited"), Comparison::IsNull);
        assert_eq!(render(&predicate), "root.date_elicited IS NULL");
    }

    #[test]
    fn test_render_link_table_exists() {
        let tags = ModelName::Form.field("tags").unwrap();
        let predicate = Predicate::Not(Box::new(Predicate::related(
            tags,
            Some(Predicate::compare(
                Column::Plain("name"),
                Comparison::Binary("=", SqlValue::Text("archive".into())),
            )),
        )));
        assert_eq!(
            render(&predicate),
            "NOT (EXISTS (SELECT 1 FROM form_tags AS l1 JOIN tags AS r1 ON r1.id = l1.tag_id \
             WHERE l1.form_id = root.id AND r1.name = ?))"
        );
    }

    #[test]
    fn test_render_nested_aliases_are_distinct() {
        let forms = ModelName::Collection.field("forms").unwrap();
        let enterer = ModelName::Form.field("enterer").unwrap();
        let predicate = Predicate::related(
            forms,
            Some(Predicate::related(
                enterer,
                Some(Predicate::compare(
                    Column::Plain("id"),
                    Comparison::Binary("=", SqlValue::Integer(2)),
                )),
            )),
        );
        let sql = render(&predicate);
        assert!(sql.contains("r1.id = l1.form_id"));
        assert!(sql.contains("FROM users AS r2 WHERE r2.id = r1.enterer_id AND r2.id = ?"));
    }

    #[test]
    fn test_render_in_lists() {
        let empty = Predicate::compare(Column::Plain("id"), Comparison::In(vec![]));
        assert_eq!(render(&empty), "0");

        let some = Predicate::compare(
            Column::Plain("id"),
            Comparison::In(vec![SqlValue::Integer(1), SqlValue::Integer(2)]),
        );
        assert_eq!(render(&some), "root.id IN (?, ?)");
    }

    #[test]
    fn test_render_child_link() {
        let translations = ModelName::Form.field("translations").unwrap();
        let predicate = Predicate::related(translations, None);
        assert_eq!(
            render(&predicate),
            "EXISTS (SELECT 1 FROM translations AS r1 WHERE r1.form_id = root.id)"
        );
    }
}
