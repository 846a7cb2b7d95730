use std::io::Write as _;

use super::*;
use crate::domain::{SortDirection, TemplateError};

#[test]
fn defaults_resolve_without_any_source() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.database.url.is_none());
    assert_eq!(settings.database.max_connections.get(), 8);
    assert_eq!(settings.database.query_timeout, Duration::from_secs(10));
    assert_eq!(settings.cache.url, DEFAULT_CACHE_URL);
    assert_eq!(settings.cache.backend, CacheBackend::Redis);
    assert_eq!(settings.cache.policy, CachePolicy::ReadWriteThrough);
    assert_eq!(settings.cache.timeout, Duration::from_secs(1));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.cache.policy = Some("read_only".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = ConnectionOverrides {
        cache_policy: Some("disabled".to_string()),
        log_level: Some("debug".to_string()),
        database_url: Some("postgres://override/db".to_string()),
        ..Default::default()
    };

    raw.apply_connection_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.policy, CachePolicy::Disabled);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(
        settings.database.url.as_deref(),
        Some("postgres://override/db")
    );
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ConnectionOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_connection_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn blank_database_url_is_treated_as_unset() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn zero_timeouts_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.timeout_ms = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero timeout");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.timeout_ms",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.database.max_connections = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn unknown_policy_and_backend_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.policy = Some("sometimes".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.policy",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.backend",
            ..
        })
    ));
}

#[test]
fn retrieve_settings_follow_cache_and_database_sections() {
    let mut raw = RawSettings::default();
    raw.cache.policy = Some("read-only".to_string());
    raw.cache.timeout_ms = Some(250);
    raw.database.query_timeout_ms = Some(2_000);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let retrieve = settings.retrieve_settings();
    assert_eq!(retrieve.policy, CachePolicy::ReadOnly);
    assert_eq!(retrieve.cache_timeout, Duration::from_millis(250));
    assert_eq!(retrieve.query_timeout, Duration::from_secs(2));
}

#[test]
fn parse_retrieve_arguments() {
    let args = CliArgs::parse_from([
        "rowcache",
        "retrieve",
        "--table",
        "players",
        "--where",
        "team_id=NYA",
        "--where",
        "name=de la Cruz",
        "--fields",
        "name,hr",
        "--order-by",
        "hr,name",
        "--direction",
        "desc",
        "--limit",
        "10",
        "--no-cache",
        "--cache-url",
        "redis://cache:6379",
    ]);

    match args.command {
        Command::Retrieve(retrieve) => {
            assert!(retrieve.no_cache);
            assert_eq!(
                retrieve.overrides.cache_url.as_deref(),
                Some("redis://cache:6379")
            );

            let template = retrieve.template.to_template().expect("valid template");
            assert_eq!(template.table, "players");
            assert_eq!(
                template.predicate.get("name").map(String::as_str),
                Some("de la Cruz")
            );
            assert_eq!(
                template.fields,
                Some(vec!["name".to_string(), "hr".to_string()])
            );
            assert_eq!(template.limit, Some(10));
            assert_eq!(template.offset, None);
            let order_by = template.order_by.expect("order by");
            assert_eq!(order_by.fields, ["hr", "name"]);
            assert_eq!(order_by.direction, SortDirection::Desc);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn predicate_without_separator_is_a_parse_error() {
    let result = CliArgs::try_parse_from([
        "rowcache",
        "explain",
        "--table",
        "players",
        "--where",
        "team_id",
    ]);
    assert!(result.is_err());
}

#[test]
fn table_or_template_file_is_required() {
    assert!(CliArgs::try_parse_from(["rowcache", "explain"]).is_err());
    assert!(
        CliArgs::try_parse_from([
            "rowcache",
            "explain",
            "--table",
            "players",
            "--template-json",
            "/tmp/template.json",
        ])
        .is_err()
    );
}

#[test]
fn template_file_is_read_and_validated() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"{{"table":"batting","predicate":{{"yearID":"1927"}},"limit":5}}"#
    )
    .expect("write template");

    let args = TemplateArgs {
        template_json: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let template = args.to_template().expect("valid template");
    assert_eq!(template.table, "batting");
    assert_eq!(template.limit, Some(5));

    let mut bad = tempfile::NamedTempFile::new().expect("temp file");
    write!(bad, r#"{{"table":"batting","predicate":{{"yearID":1927}}}}"#).expect("write");
    let args = TemplateArgs {
        template_json: Some(bad.path().to_path_buf()),
        ..Default::default()
    };
    assert!(matches!(
        args.to_template(),
        Err(TemplateArgsError::Invalid(TemplateError::NonStringValue { .. }))
    ));
}

#[test]
fn parse_flush_overrides() {
    let args = CliArgs::parse_from([
        "rowcache",
        "flush",
        "--cache-policy",
        "read_only",
        "--log-json",
        "yes",
    ]);

    match args.command {
        Command::Flush(flush) => {
            assert_eq!(flush.overrides.cache_policy.as_deref(), Some("read_only"));
            assert_eq!(flush.overrides.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}
