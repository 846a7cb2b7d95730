//! Domain layer types and invariants.

pub mod template;

pub use rowcache_types::{OrderBy, ResultSet, Row, SortDirection};
pub use template::{QueryTemplate, QueryTemplateBuilder, TemplateError};
