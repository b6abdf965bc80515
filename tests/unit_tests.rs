use drift::config::Config;
use drift::{SourceAdapter, SourceOpts};
use drift_core::SourceKind;
use drift_source::Connection;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_source_opts_without_config_file() {
    let opts = SourceOpts {
        connection: "postgresql://localhost/app".to_string(),
        config: None,
    };
    let config = opts.load_config().unwrap();
    assert_eq!(config.postgres.schema, "public");
    assert_eq!(config.session.window, 256);
}

#[test]
fn test_config_file_sections() {
    let config = Config::from_toml(
        r#"
        [postgres]
        schema = "sales"
        tables = ["orders"]
        slot_name = "sales_slot"
        poll_interval = "250ms"
        drop_slot_on_stop = true

        [mongodb]
        database = "app"
        poll_interval = 2

        [mysql]
        tables = ["users", "orders"]

        [session]
        window = 16
        "#,
    )
    .unwrap();

    assert_eq!(config.postgres.schema, "sales");
    assert_eq!(config.postgres.tables, vec!["orders"]);
    assert_eq!(config.postgres.poll_interval, Duration::from_millis(250));
    assert!(config.postgres.drop_slot_on_stop);
    // untouched keys keep their defaults
    assert_eq!(config.postgres.batch_size, 1000);
    assert_eq!(config.mongodb.database.as_deref(), Some("app"));
    assert_eq!(config.mongodb.poll_interval, Duration::from_secs(2));
    assert_eq!(config.mysql.tables.len(), 2);
    assert_eq!(config.session.window, 16);
}

#[test]
fn test_config_rejects_unknown_keys_and_zero_window() {
    assert!(Config::from_toml("[postgres]\nslot = \"x\"\n").is_err());
    assert!(Config::from_toml("[session]\nwindow = 0\n").is_err());
    assert!(Config::from_toml("[postgres]\npoll_interval = \"soon\"\n").is_err());
}

#[test]
fn test_config_file_is_loaded_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[mongodb]\ncollections = [\"events\"]").unwrap();

    let opts = SourceOpts {
        connection: "mongodb://localhost/app".to_string(),
        config: Some(file.path().to_path_buf()),
    };
    let config = opts.load_config().unwrap();
    assert_eq!(config.mongodb.collections, vec!["events"]);
}

#[test]
fn test_registry_is_closed_over_known_schemes() {
    let config = Config::default();
    for (raw, kind) in [
        ("postgres://localhost/app", SourceKind::Postgres),
        ("MySQL://localhost/app", SourceKind::Mysql),
        ("mongodb://localhost/app", SourceKind::Mongodb),
    ] {
        let connection = Connection::parse(raw).unwrap();
        assert_eq!(SourceAdapter::for_connection(&connection, &config).kind(), kind);
    }

    let err = Connection::parse("redis://localhost").unwrap_err();
    assert!(err.to_string().contains("redis"));
}
