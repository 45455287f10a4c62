use policysync_engine::LoggingConfig;
use policysync_engine::observability::{apply_logging_level, init_tracing};

// Runs as a single test: the global subscriber can be installed once per
// process.
#[test]
fn tracing_installs_once_and_reloads_level() {
    assert!(!apply_logging_level("debug"));

    init_tracing(&LoggingConfig::default());
    assert!(tracing::dispatcher::has_been_set());
    assert!(apply_logging_level("debug"));

    init_tracing(&LoggingConfig {
        level: "trace".into(),
    });
    assert!(apply_logging_level("warn"));
    tracing::warn!("subscriber still active after second init");
}
