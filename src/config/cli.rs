use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use rowcache_types::{SortDirection, TemplateDocument};
use thiserror::Error;

use crate::domain::{QueryTemplate, TemplateError};

/// Command-line arguments for the rowcache binary.
#[derive(Debug, Parser)]
#[command(
    name = "rowcache",
    version,
    about = "Cache-aside row retrieval over Postgres and Redis"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ROWCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Retrieve rows for a template, consulting the cache first.
    Retrieve(Box<RetrieveArgs>),
    /// Print the cache key and SQL a template translates to, without any I/O.
    Explain(ExplainArgs),
    /// List every key held by the cache.
    Keys(MaintenanceArgs),
    /// Delete every key held by the cache.
    Flush(MaintenanceArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RetrieveArgs {
    #[command(flatten)]
    pub overrides: ConnectionOverrides,

    #[command(flatten)]
    pub template: TemplateArgs,

    /// Skip the cache read for this request.
    #[arg(long = "no-cache", action = clap::ArgAction::SetTrue)]
    pub no_cache: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ExplainArgs {
    #[command(flatten)]
    pub template: TemplateArgs,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MaintenanceArgs {
    #[command(flatten)]
    pub overrides: ConnectionOverrides,
}

/// A query template given inline or as a JSON document.
#[derive(Debug, Args, Default, Clone)]
pub struct TemplateArgs {
    /// Table to read from.
    #[arg(
        long,
        value_name = "TABLE",
        required_unless_present = "template_json",
        conflicts_with = "template_json"
    )]
    pub table: Option<String>,

    /// Equality predicate, repeatable.
    #[arg(long = "where", value_name = "FIELD=VALUE", value_parser = parse_predicate)]
    pub predicates: Vec<(String, String)>,

    /// Comma-separated projection.
    #[arg(long, value_name = "FIELDS", value_delimiter = ',')]
    pub fields: Option<Vec<String>>,

    #[arg(long, value_name = "COUNT")]
    pub limit: Option<u64>,

    #[arg(long, value_name = "COUNT")]
    pub offset: Option<u64>,

    /// Comma-separated sort fields.
    #[arg(long = "order-by", value_name = "FIELDS", value_delimiter = ',')]
    pub order_by: Option<Vec<String>>,

    /// Sort direction applied to every `--order-by` field.
    #[arg(long, value_name = "asc|desc", default_value_t = SortDirection::Asc)]
    pub direction: SortDirection,

    /// Read the whole template from a JSON file instead.
    #[arg(long = "template-json", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub template_json: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum TemplateArgsError {
    #[error("failed to read template file `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("template file `{path}` is not a template document: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] TemplateError),
}

impl TemplateArgs {
    /// Build and validate the template these arguments describe.
    pub fn to_template(&self) -> Result<QueryTemplate, TemplateArgsError> {
        if let Some(path) = self.template_json.as_ref() {
            let raw = std::fs::read_to_string(path).map_err(|source| TemplateArgsError::Read {
                path: path.clone(),
                source,
            })?;
            let document: TemplateDocument =
                serde_json::from_str(&raw).map_err(|source| TemplateArgsError::Parse {
                    path: path.clone(),
                    source,
                })?;
            return Ok(QueryTemplate::try_from(document)?);
        }

        let mut builder = QueryTemplate::builder(self.table.clone().unwrap_or_default());
        for (field, value) in &self.predicates {
            builder = builder.filter(field.clone(), value.clone());
        }
        if let Some(fields) = self.fields.as_ref() {
            builder = builder.fields(fields.iter().cloned());
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        if let Some(order_by) = self.order_by.as_ref() {
            builder = builder.order_by(order_by.iter().cloned(), self.direction);
        }

        let template = builder.build();
        template.validate()?;
        Ok(template)
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct ConnectionOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the cache connection URL.
    #[arg(long = "cache-url", value_name = "URL")]
    pub cache_url: Option<String>,

    /// Override the cache policy (disabled|read_only|read_write_through).
    #[arg(long = "cache-policy", value_name = "POLICY")]
    pub cache_policy: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

fn parse_predicate(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got `{raw}`"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in `{raw}`"));
    }
    Ok((field.to_string(), value.to_string()))
}
