//! Query translation: template in, parameterized SELECT out.
//!
//! Values never reach the SQL text. Every predicate value becomes a positional
//! `$n` placeholder with the value appended to the parameter list, the same
//! push/push_bind discipline as `sqlx::QueryBuilder`. Identifiers (table and
//! field names) are double-quoted, so `teamID` reaches Postgres with its case
//! intact, just as it appears in the cache key. [`QueryTemplate::validate`] has
//! already restricted them to plain identifiers, which never contain a quote.
//!
//! Predicate values are strings, so the column side of each comparison is cast
//! to text. That keeps `yearID = '1927'` meaningful on an integer column
//! without a type catalogue.

use std::fmt::Write as _;

use crate::domain::{QueryTemplate, TemplateError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedQuery {
    pub sql: String,
    pub params: Vec<String>,
}

#[derive(Debug, Default)]
struct SqlBuilder {
    sql: String,
    params: Vec<String>,
}

impl SqlBuilder {
    fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    fn push_bind(&mut self, value: &str) -> &mut Self {
        self.params.push(value.to_string());
        // Writing to a String cannot fail.
        let _ = write!(self.sql, "${}", self.params.len());
        self
    }

    fn finish(self) -> TranslatedQuery {
        TranslatedQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

pub fn translate(template: &QueryTemplate) -> Result<TranslatedQuery, TemplateError> {
    template.validate()?;

    let mut qb = SqlBuilder::default();
    qb.push("SELECT ");
    match &template.fields {
        Some(fields) => qb.push(&quote_list(fields.iter().map(String::as_str))),
        None => qb.push("*"),
    };
    qb.push(" FROM ").push(&quote(&template.table));

    for (index, (field, value)) in template.sorted_predicate().into_iter().enumerate() {
        qb.push(if index == 0 { " WHERE " } else { " AND " });
        qb.push("CAST(").push(&quote(field)).push(" AS TEXT) = ");
        qb.push_bind(value);
    }

    if let Some(order_by) = &template.order_by {
        let direction = order_by.direction.as_sql();
        let terms: Vec<String> = order_by
            .fields
            .iter()
            .map(|field| format!("{} {direction}", quote(field)))
            .collect();
        qb.push(" ORDER BY ").push(&terms.join(", "));
    }

    if let Some(limit) = template.limit {
        qb.push(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = template.offset {
        qb.push(&format!(" OFFSET {offset}"));
    }

    Ok(qb.finish())
}

/// Double-quote each dot-separated part: `stats.batting` → `"stats"."batting"`.
fn quote(identifier: &str) -> String {
    identifier
        .split('.')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_list<'a>(identifiers: impl Iterator<Item = &'a str>) -> String {
    identifiers.map(quote).collect::<Vec<_>>().join(", ")
}
