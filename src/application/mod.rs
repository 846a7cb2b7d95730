//! Application services: query translation, execution contract, the
//! cache-aside coordinator and cache maintenance.

pub mod error;
pub mod executor;
pub mod maintenance;
pub mod query;
pub mod retrieve;

pub use error::{AppError, ErrorReport, RetrieveError};
pub use executor::{ExecError, QueryExecutor};
pub use maintenance::CacheMaintenance;
pub use query::{TranslatedQuery, translate};
pub use retrieve::{CacheAsideCoordinator, Retrieval, RetrieveSettings};
