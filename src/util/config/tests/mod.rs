//! 配置单元测试

use std::io::Write;

use crate::runtime::value::Value;
use crate::util::config::{ConfigError, ContextValue, MonitorKind, RuntimeConfig};
use crate::util::logger::LogLevel;

#[test]
fn test_defaults_from_empty_document() {
    let config = RuntimeConfig::from_toml_str("").unwrap();
    assert_eq!(config, RuntimeConfig::default());
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.monitor, MonitorKind::None);
}

#[test]
fn test_parse_full_document() {
    let config = RuntimeConfig::from_toml_str(
        r#"
log_level = "debug"
monitor = "tracing"

[context]
api = "http://localhost"
retries = 3
ratio = 0.5
verbose = true
"#,
    )
    .unwrap();

    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.monitor, MonitorKind::Tracing);
    assert_eq!(config.context.get("retries"), Some(&ContextValue::Int(3)));

    let values = config.context_values();
    assert_eq!(
        values,
        vec![
            ("api".to_string(), Value::from("http://localhost")),
            ("ratio".to_string(), Value::Float(0.5)),
            ("retries".to_string(), Value::Int(3)),
            ("verbose".to_string(), Value::Bool(true)),
        ]
    );
}

#[test]
fn test_parse_error() {
    let err = RuntimeConfig::from_toml_str("monitor = \"prometheus\"").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "log_level = \"warn\"").unwrap();
    let config = RuntimeConfig::load(file.path()).unwrap();
    assert_eq!(config.log_level, LogLevel::Warn);
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sagaflow.toml");
    let mut config = RuntimeConfig::default();
    config.monitor = MonitorKind::Tracing;
    config
        .context
        .insert("user".to_string(), ContextValue::Str("ada".to_string()));
    config.save(&path).unwrap();

    assert_eq!(RuntimeConfig::load(&path).unwrap(), config);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(matches!(
        RuntimeConfig::load(&path),
        Err(ConfigError::IoError(_))
    ));
    assert_eq!(
        RuntimeConfig::load_or_default(&path).unwrap(),
        RuntimeConfig::default()
    );
}
