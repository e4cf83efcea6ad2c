//! Database sink integration tests
//!
//! Uses the SQLite procedure against a database file in a temporary
//! directory, with a manual file sink as the fallback.

use std::fs;
use std::path::PathBuf;

use batchlog_core::config::{DatabaseSinkConfig, FileSinkConfig};
use batchlog_core::logging::{
    ConnectedSink, ConnectionInfo, DatabaseSink, FileSink, LogLevel, LogSink, SqliteLogProcedure,
};
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

const PROCEDURE: &str = "WriteLog";

struct Fixture {
    _temp: TempDir,
    db_path: PathBuf,
    fallback: FileSink,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("logs.db");
        let fallback = FileSink::manual(
            FileSinkConfig::new(temp.path().join("Fallback")).with_archiving(false, false),
        )
        .unwrap();
        Self {
            _temp: temp,
            db_path,
            fallback,
        }
    }

    fn connection(&self, procedure: &str) -> ConnectionInfo {
        ConnectionInfo::new(self.db_path.to_string_lossy(), procedure, "nightly")
    }

    fn sink(&self, config: DatabaseSinkConfig) -> DatabaseSink {
        DatabaseSink::manual(config, SqliteLogProcedure::new(), Some(self.fallback.clone()))
    }

    fn fallback_lines(&self) -> Vec<String> {
        match fs::read_to_string(self.fallback.current_log_path()) {
            Ok(content) => content.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}

// ============================================================================
// Delivery Tests
// ============================================================================

#[test]
fn test_messages_are_stored() {
    let fixture = Fixture::new();
    SqliteLogProcedure::create_procedure_table(&fixture.db_path, PROCEDURE).unwrap();
    let sink = fixture
        .sink(DatabaseSinkConfig {
            echo_to_file: false,
            ..DatabaseSinkConfig::default()
        })
        .with_connection_info(fixture.connection(PROCEDURE));

    sink.info("Import started");
    sink.error("Row 7 rejected");
    assert!(sink.flush_pending_messages());

    assert_eq!(sink.stored_count(), 2);
    assert_eq!(
        SqliteLogProcedure::count_rows(&fixture.db_path, PROCEDURE).unwrap(),
        2
    );

    let conn = Connection::open(&fixture.db_path).unwrap();
    let (log_type, message, posted_by): (String, String, String) = conn
        .query_row(
            "SELECT log_type, message, posted_by FROM WriteLog ORDER BY id DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(log_type, "ERROR");
    assert_eq!(message, "Row 7 rejected");
    assert_eq!(posted_by, "nightly");

    assert!(fixture.fallback_lines().is_empty());
}

#[test]
fn test_stored_messages_echo_to_file() {
    let fixture = Fixture::new();
    SqliteLogProcedure::create_procedure_table(&fixture.db_path, PROCEDURE).unwrap();
    let sink = fixture
        .sink(DatabaseSinkConfig::default())
        .with_connection_info(fixture.connection(PROCEDURE));

    sink.warn("Disk at 90%");
    assert!(sink.flush_pending_messages());

    let lines = fixture.fallback_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("Disk at 90%, WARN"));
}

#[test]
fn test_threshold_filters_before_database() {
    let fixture = Fixture::new();
    SqliteLogProcedure::create_procedure_table(&fixture.db_path, PROCEDURE).unwrap();
    let sink = fixture
        .sink(DatabaseSinkConfig {
            threshold: LogLevel::Error,
            ..DatabaseSinkConfig::default()
        })
        .with_connection_info(fixture.connection(PROCEDURE));

    sink.info("dropped");
    sink.fatal("kept");
    assert!(sink.flush_pending_messages());

    assert_eq!(
        SqliteLogProcedure::count_rows(&fixture.db_path, PROCEDURE).unwrap(),
        1
    );
}

// ============================================================================
// Fallback Tests
// ============================================================================

#[test]
fn test_missing_procedure_escalates_to_file() {
    let fixture = Fixture::new();
    let sink = fixture
        .sink(DatabaseSinkConfig::default())
        .with_connection_info(fixture.connection("NoSuchProcedure"));

    sink.info("Nightly import finished");
    assert!(sink.flush_pending_messages());

    assert_eq!(sink.stored_count(), 0);
    assert_eq!(sink.diverted_count(), 1);
    let lines = fixture.fallback_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("NoSuchProcedure not found"));
    assert!(lines[0].contains("Nightly import finished"));
    assert!(lines[0].ends_with(", ERROR"));
}

#[test]
fn test_without_connection_messages_go_to_file() {
    let fixture = Fixture::new();
    let sink = fixture.sink(DatabaseSinkConfig::default());

    sink.info("No database configured");
    assert!(sink.flush_pending_messages());

    let lines = fixture.fallback_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("No database configured, INFO"));
}

#[test]
fn test_remove_connection_switches_to_file() {
    let fixture = Fixture::new();
    SqliteLogProcedure::create_procedure_table(&fixture.db_path, PROCEDURE).unwrap();
    let sink = fixture
        .sink(DatabaseSinkConfig {
            echo_to_file: false,
            ..DatabaseSinkConfig::default()
        })
        .with_connection_info(fixture.connection(PROCEDURE));

    sink.info("to the database");
    assert!(sink.flush_pending_messages());
    sink.remove_connection_info();
    sink.info("to the file");
    assert!(sink.flush_pending_messages());

    assert_eq!(
        SqliteLogProcedure::count_rows(&fixture.db_path, PROCEDURE).unwrap(),
        1
    );
    let lines = fixture.fallback_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("to the file"));
}

#[test]
fn test_timer_delivers_and_shutdown_drains() {
    let fixture = Fixture::new();
    SqliteLogProcedure::create_procedure_table(&fixture.db_path, PROCEDURE).unwrap();
    let sink = DatabaseSink::new(
        DatabaseSinkConfig {
            drain_interval_ms: 20,
            ..DatabaseSinkConfig::default()
        },
        SqliteLogProcedure::new(),
        Some(fixture.fallback.clone()),
    )
    .unwrap()
    .with_connection_info(fixture.connection(PROCEDURE));

    for i in 0..25 {
        sink.info(&format!("row {}", i));
    }
    assert!(sink.shutdown());

    assert_eq!(sink.pending_count(), 0);
    assert_eq!(
        SqliteLogProcedure::count_rows(&fixture.db_path, PROCEDURE).unwrap(),
        25
    );
}

#[test]
fn test_invalid_procedure_name_rejected() {
    let fixture = Fixture::new();
    assert!(SqliteLogProcedure::create_procedure_table(&fixture.db_path, "bad name;").is_err());
}
