//! Cache key definitions.
//!
//! A [`CacheKey`] is `table + "/" + query`, where the query part is the
//! form-url-encoded list of predicate pairs plus the projection, pagination and
//! ordering parameters, sorted by parameter name. Sorting makes the key a pure
//! function of the template's meaning: two templates that differ only in the
//! insertion order of their predicate map encode identically.

use std::borrow::Cow;
use std::fmt;

use url::form_urlencoded;

use crate::domain::{OrderBy, QueryTemplate, TemplateError};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys read back from the cache service are taken as-is.
impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode a template into its canonical cache key.
pub fn encode(template: &QueryTemplate) -> Result<CacheKey, TemplateError> {
    template.validate()?;

    let mut params: Vec<(&str, Cow<'_, str>)> = template
        .sorted_predicate()
        .into_iter()
        .map(|(field, value)| (field, Cow::Borrowed(value)))
        .collect();

    if let Some(fields) = &template.fields {
        params.push(("field", Cow::Owned(fields.join(","))));
    }
    if let Some(limit) = template.limit {
        params.push(("limit", Cow::Owned(limit.to_string())));
    }
    if let Some(offset) = template.offset {
        params.push(("offset", Cow::Owned(offset.to_string())));
    }
    if let Some(order_by) = &template.order_by {
        params.push(("order_by", Cow::Owned(canonical_order_by(order_by))));
    }

    // Reserved names never appear as predicate fields, so names are unique here.
    params.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(name, value)| (*name, value.as_ref())))
        .finish();

    Ok(CacheKey(format!("{}/{}", template.table, query)))
}

/// `a,b DESC`. Field order is kept: `ORDER BY a, b` and `ORDER BY b, a` are
/// different queries and must not share a key.
fn canonical_order_by(order_by: &OrderBy) -> String {
    format!("{} {}", order_by.fields.join(","), order_by.direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SortDirection;

    #[test]
    fn players_scenario_key() {
        let template = QueryTemplate::builder("players")
            .filter("team_id", "NYA")
            .limit(10)
            .build();
        let key = encode(&template).expect("valid template");
        assert_eq!(key.as_str(), "players/limit=10&team_id=NYA");
    }

    #[test]
    fn predicate_insertion_order_does_not_matter() {
        let forward = QueryTemplate::builder("batting")
            .filter("playerID", "ruthba01")
            .filter("teamID", "NYA")
            .filter("yearID", "1927")
            .build();
        let backward = QueryTemplate::builder("batting")
            .filter("yearID", "1927")
            .filter("teamID", "NYA")
            .filter("playerID", "ruthba01")
            .build();

        assert_eq!(encode(&forward), encode(&backward));
        assert_eq!(
            encode(&forward).expect("valid").as_str(),
            "batting/playerID=ruthba01&teamID=NYA&yearID=1927"
        );
    }

    #[test]
    fn absent_and_zero_encode_differently() {
        let base = QueryTemplate::builder("teams").filter("lgID", "AL");
        let absent = encode(&base.clone().build()).expect("valid");
        let zero_limit = encode(&base.clone().limit(0).build()).expect("valid");
        let zero_offset = encode(&base.offset(0).build()).expect("valid");

        assert_eq!(absent.as_str(), "teams/lgID=AL");
        assert_eq!(zero_limit.as_str(), "teams/lgID=AL&limit=0");
        assert_eq!(zero_offset.as_str(), "teams/lgID=AL&offset=0");
        assert_ne!(zero_limit, zero_offset);
    }

    #[test]
    fn projection_and_ordering_are_percent_encoded() {
        let template = QueryTemplate::builder("people")
            .filter("nameLast", "de la Cruz")
            .fields(["nameFirst", "nameLast"])
            .order_by(["nameLast", "nameFirst"], SortDirection::Desc)
            .offset(20)
            .build();
        let key = encode(&template).expect("valid");
        assert_eq!(
            key.as_str(),
            "people/field=nameFirst%2CnameLast&nameLast=de+la+Cruz&offset=20\
             &order_by=nameLast%2CnameFirst+DESC"
        );
    }

    #[test]
    fn order_by_field_order_is_significant() {
        let ab = QueryTemplate::builder("people")
            .order_by(["a", "b"], SortDirection::Asc)
            .build();
        let ba = QueryTemplate::builder("people")
            .order_by(["b", "a"], SortDirection::Asc)
            .build();
        assert_ne!(encode(&ab), encode(&ba));
    }

    #[test]
    fn special_characters_in_values_cannot_forge_parameters() {
        let template = QueryTemplate::builder("people")
            .filter("nameLast", "x&limit=1")
            .build();
        let key = encode(&template).expect("valid");
        assert_eq!(key.as_str(), "people/nameLast=x%26limit%3D1");
    }

    #[test]
    fn empty_predicate_yields_bare_table_prefix() {
        let key = encode(&QueryTemplate::builder("teams").build()).expect("valid");
        assert_eq!(key.as_str(), "teams/");
    }

    #[test]
    fn invalid_template_fails_before_encoding() {
        let template = QueryTemplate::builder("").filter("a", "b").build();
        assert_eq!(encode(&template), Err(TemplateError::EmptyTable));
    }
}
