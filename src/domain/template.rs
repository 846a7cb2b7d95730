//! Query templates: the canonical request shape for template retrieval.
//!
//! A template names a table, a set of equality predicates, an optional
//! projection, pagination and ordering. Construction goes through
//! [`QueryTemplate::builder`] or [`QueryTemplate::try_from`] on a wire
//! [`TemplateDocument`]; either way [`QueryTemplate::validate`] is the single
//! place the invariants live, and both the cache-key encoder and the query
//! translator call it before doing anything else.

use std::collections::HashMap;

use rowcache_types::{OrderBy, SortDirection, TemplateDocument};
use serde_json::Value;
use thiserror::Error;

/// Parameter names the cache key uses for projection, pagination and ordering.
/// A predicate field with one of these names would collide in the key.
pub const RESERVED_KEY_NAMES: [&str; 4] = ["field", "limit", "offset", "order_by"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("table name is empty")]
    EmptyTable,
    #[error("`{name}` is not a valid {kind} identifier")]
    InvalidIdentifier { kind: &'static str, name: String },
    #[error("predicate value for `{field}` must be a string, found {found}")]
    NonStringValue { field: String, found: &'static str },
    #[error("predicate field `{field}` collides with a reserved cache key parameter")]
    ReservedField { field: String },
    #[error("projection must name at least one field")]
    EmptyProjection,
    #[error("order by must name at least one field")]
    EmptyOrderBy,
    #[error("{param} {value} exceeds the largest value Postgres accepts ({max})", max = i64::MAX)]
    OutOfRange { param: &'static str, value: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    pub table: String,
    pub predicate: HashMap<String, String>,
    pub fields: Option<Vec<String>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Option<OrderBy>,
}

impl QueryTemplate {
    pub fn builder(table: impl Into<String>) -> QueryTemplateBuilder {
        QueryTemplateBuilder {
            template: QueryTemplate {
                table: table.into(),
                predicate: HashMap::new(),
                fields: None,
                limit: None,
                offset: None,
                order_by: None,
            },
        }
    }

    /// Check every invariant the encoder and translator rely on.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.table.trim().is_empty() {
            return Err(TemplateError::EmptyTable);
        }
        if !is_table_identifier(&self.table) {
            return Err(TemplateError::InvalidIdentifier {
                kind: "table",
                name: self.table.clone(),
            });
        }

        for field in self.predicate.keys() {
            check_field(field)?;
            if RESERVED_KEY_NAMES.contains(&field.as_str()) {
                return Err(TemplateError::ReservedField {
                    field: field.clone(),
                });
            }
        }

        if let Some(fields) = &self.fields {
            if fields.is_empty() {
                return Err(TemplateError::EmptyProjection);
            }
            fields.iter().try_for_each(|field| check_field(field))?;
        }

        if let Some(order_by) = &self.order_by {
            if order_by.fields.is_empty() {
                return Err(TemplateError::EmptyOrderBy);
            }
            order_by.fields.iter().try_for_each(|field| check_field(field))?;
        }

        check_bigint("limit", self.limit)?;
        check_bigint("offset", self.offset)?;

        Ok(())
    }

    /// Predicate pairs in lexicographic field order.
    pub fn sorted_predicate(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .predicate
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_str()))
            .collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

impl TryFrom<TemplateDocument> for QueryTemplate {
    type Error = TemplateError;

    fn try_from(doc: TemplateDocument) -> Result<Self, Self::Error> {
        let mut predicate = HashMap::new();
        for (field, value) in doc.predicate.unwrap_or_default() {
            match value {
                Value::String(text) => {
                    predicate.insert(field, text);
                }
                other => {
                    return Err(TemplateError::NonStringValue {
                        field,
                        found: json_kind(&other),
                    });
                }
            }
        }

        let template = QueryTemplate {
            table: doc.table,
            predicate,
            fields: doc.fields,
            limit: doc.limit,
            offset: doc.offset,
            order_by: doc.order_by,
        };
        template.validate()?;
        Ok(template)
    }
}

#[derive(Debug, Clone)]
pub struct QueryTemplateBuilder {
    template: QueryTemplate,
}

impl QueryTemplateBuilder {
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.template.predicate.insert(field.into(), value.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.template.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.template.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.template.offset = Some(offset);
        self
    }

    pub fn order_by<I, S>(mut self, fields: I, direction: SortDirection) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.template.order_by = Some(OrderBy::new(fields, direction));
        self
    }

    /// Finish without validation; the encoder and translator validate on use.
    pub fn build(self) -> QueryTemplate {
        self.template
    }
}

/// LIMIT and OFFSET are BIGINT in Postgres.
fn check_bigint(param: &'static str, value: Option<u64>) -> Result<(), TemplateError> {
    match value {
        Some(value) if i64::try_from(value).is_err() => {
            Err(TemplateError::OutOfRange { param, value })
        }
        _ => Ok(()),
    }
}

fn check_field(name: &str) -> Result<(), TemplateError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(TemplateError::InvalidIdentifier {
            kind: "field",
            name: name.to_string(),
        })
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An identifier with at most one `schema.` qualifier.
fn is_table_identifier(name: &str) -> bool {
    match name.split_once('.') {
        Some((schema, table)) => is_identifier(schema) && is_identifier(table),
        None => is_identifier(name),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn limit_and_offset_must_fit_a_bigint() {
        let largest = i64::MAX as u64;
        let fits = QueryTemplate::builder("teams")
            .limit(largest)
            .offset(largest)
            .build();
        assert!(fits.validate().is_ok());

        let err = QueryTemplate::builder("teams")
            .limit(largest + 1)
            .build()
            .validate()
            .expect_err("limit overflows");
        assert_eq!(
            err,
            TemplateError::OutOfRange {
                param: "limit",
                value: largest + 1,
            }
        );

        assert!(matches!(
            QueryTemplate::builder("teams").offset(u64::MAX).build().validate(),
            Err(TemplateError::OutOfRange { param: "offset", .. })
        ));
    }

    #[test]
    fn builder_template_validates() {
        let template = QueryTemplate::builder("players")
            .filter("team_id", "NYA")
            .fields(["nameFirst", "nameLast"])
            .order_by(["nameLast"], SortDirection::Desc)
            .limit(10)
            .build();
        assert_eq!(template.validate(), Ok(()));
    }

    #[test]
    fn empty_table_is_rejected() {
        let template = QueryTemplate::builder("  ").build();
        assert_eq!(template.validate(), Err(TemplateError::EmptyTable));
    }

    #[test]
    fn schema_qualified_table_is_accepted() {
        let template = QueryTemplate::builder("lahman2017.batting").build();
        assert!(template.validate().is_ok());

        let template = QueryTemplate::builder("a.b.c").build();
        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidIdentifier { kind: "table", .. })
        ));
    }

    #[test]
    fn field_names_must_be_identifiers() {
        let template = QueryTemplate::builder("players")
            .filter("team_id; DROP TABLE players", "NYA")
            .build();
        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidIdentifier { kind: "field", .. })
        ));

        let template = QueryTemplate::builder("players")
            .fields(["1st"])
            .build();
        assert!(template.validate().is_err());
    }

    #[test]
    fn reserved_predicate_fields_are_rejected() {
        let template = QueryTemplate::builder("players")
            .filter("limit", "10")
            .build();
        assert_eq!(
            template.validate(),
            Err(TemplateError::ReservedField {
                field: "limit".to_string()
            })
        );
    }

    #[test]
    fn empty_projection_and_ordering_are_rejected() {
        let template = QueryTemplate::builder("players")
            .fields(Vec::<String>::new())
            .build();
        assert_eq!(template.validate(), Err(TemplateError::EmptyProjection));

        let template = QueryTemplate::builder("players")
            .order_by(Vec::<String>::new(), SortDirection::Asc)
            .build();
        assert_eq!(template.validate(), Err(TemplateError::EmptyOrderBy));
    }

    #[test]
    fn document_with_non_string_value_fails() {
        let doc: TemplateDocument = serde_json::from_value(json!({
            "table": "batting",
            "predicate": { "playerID": "willite01", "yearID": 1941 }
        }))
        .expect("document parses");

        let err = QueryTemplate::try_from(doc).expect_err("numbers are not accepted");
        assert_eq!(
            err,
            TemplateError::NonStringValue {
                field: "yearID".to_string(),
                found: "a number",
            }
        );
    }

    #[test]
    fn document_without_predicate_means_no_filter() {
        let doc: TemplateDocument =
            serde_json::from_value(json!({ "table": "teams", "limit": 5 })).expect("parses");
        let template = QueryTemplate::try_from(doc).expect("valid template");
        assert!(template.predicate.is_empty());
        assert_eq!(template.limit, Some(5));
    }

    #[test]
    fn sorted_predicate_orders_by_field() {
        let template = QueryTemplate::builder("batting")
            .filter("yearID", "2004")
            .filter("teamID", "BOS")
            .filter("lgID", "AL")
            .build();
        let fields: Vec<&str> = template
            .sorted_predicate()
            .into_iter()
            .map(|(field, _)| field)
            .collect();
        assert_eq!(fields, ["lgID", "teamID", "yearID"]);
    }
}
