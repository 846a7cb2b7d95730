//! Cache-aside retrieval of relational rows by query template.
//!
//! A [`domain::QueryTemplate`] is encoded into a canonical [`cache::CacheKey`]
//! and translated into a parameterized SELECT. The
//! [`application::CacheAsideCoordinator`] serves it from the cache when it can
//! and otherwise queries Postgres and writes the rows back.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
