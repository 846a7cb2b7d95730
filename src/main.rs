use std::process;

use rowcache::{
    application::{AppError, ErrorReport, translate},
    cache,
    config::{self, Command, TemplateArgs},
    domain::QueryTemplate,
    infra::{bootstrap, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = ErrorReport::from_error("rowcache", error);
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?report.messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?report.messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::validation(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        Command::Explain(args) => run_explain(&args.template),
        Command::Retrieve(args) => {
            let template = resolve_template(&args.template)?;
            let coordinator = bootstrap::coordinator(&settings)?;
            let retrieval = coordinator.retrieve(&template, !args.no_cache).await?;
            print_json(&retrieval.into_report())
        }
        Command::Keys(_) => {
            let maintenance = bootstrap::maintenance(&settings)?;
            let keys: Vec<String> = maintenance
                .list_keys()
                .await?
                .into_iter()
                .map(cache::CacheKey::into_string)
                .collect();
            print_json(&keys)
        }
        Command::Flush(_) => {
            let maintenance = bootstrap::maintenance(&settings)?;
            let removed = maintenance.flush().await?;
            println!("{removed}");
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct Explanation {
    key: String,
    sql: String,
    params: Vec<String>,
}

fn run_explain(args: &TemplateArgs) -> Result<(), AppError> {
    let template = resolve_template(args)?;
    let key = cache::encode(&template).map_err(|err| AppError::validation(err.to_string()))?;
    let query = translate(&template).map_err(|err| AppError::validation(err.to_string()))?;
    print_json(&Explanation {
        key: key.into_string(),
        sql: query.sql,
        params: query.params,
    })
}

fn resolve_template(args: &TemplateArgs) -> Result<QueryTemplate, AppError> {
    args.to_template()
        .map_err(|err| AppError::validation(err.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
