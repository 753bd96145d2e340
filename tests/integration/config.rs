//! Configuration integration tests

use sagaflow::effects::{all, get_context};
use sagaflow::util::config::{MonitorKind, RuntimeConfig};
use sagaflow::{once, Runtime, Value, Yielded};

#[test]
fn test_runtime_from_config_seeds_root_context() {
    let config = RuntimeConfig::from_toml_str(
        r#"
        log_level = "debug"
        monitor = "tracing"

        [context]
        api_url = "http://localhost"
        retries = 3
        verbose = true
        "#,
    )
    .expect("valid config");
    assert_eq!(config.monitor, MonitorKind::Tracing);

    let runtime = Runtime::from_config(&config);
    let task = runtime.run(once(
        "reader",
        Yielded::Effect(all(vec![
            Yielded::Effect(get_context("api_url")),
            Yielded::Effect(get_context("retries")),
            Yielded::Effect(get_context("verbose")),
            Yielded::Effect(get_context("missing")),
        ])),
    ));

    assert_eq!(
        task.result(),
        Some(Value::List(vec![
            Value::from("http://localhost"),
            Value::Int(3),
            Value::Bool(true),
            Value::Unit,
        ]))
    );
}

#[test]
fn test_unknown_monitor_is_rejected() {
    assert!(RuntimeConfig::from_toml_str("monitor = \"prometheus\"").is_err());
}
