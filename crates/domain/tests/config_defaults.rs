//! Config defaults and validation behave the same whether the file is
//! empty, partial, or fully specified.

use nd_domain::config::{Config, ConfigSeverity};

#[test]
fn empty_toml_yields_full_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.lookup.timeout_ms, 2000);
    assert_eq!(config.lookup.rate_per_sec, 5);
    assert_eq!(config.sessions.decay_hours, 12);
    assert_eq!(config.sessions.preference_decay_days, 90);
    assert_eq!(config.retrieval.embed_concurrency, 2);
    assert!((config.monitor.max_ram_percent - 85.0).abs() < f64::EPSILON);
    assert!((config.monitor.max_vram_percent - 92.0).abs() < f64::EPSILON);
    assert!(config.policy.research_agents.is_empty());
}

#[test]
fn partial_section_keeps_other_defaults() {
    let config: Config = toml::from_str(
        r#"
        [server]
        port = 9999

        [monitor]
        swap_critical_mb = 4000
        "#,
    )
    .unwrap();
    assert_eq!(config.server.port, 9999);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.monitor.swap_critical_mb, 4000);
    assert_eq!(config.monitor.swap_moderate_mb, 1500);
}

#[test]
fn default_config_validates_clean() {
    let config = Config::default();
    let issues = config.validate();
    assert!(
        issues
            .iter()
            .all(|i| i.severity != ConfigSeverity::Error),
        "default config must not carry validation errors"
    );
}

#[test]
fn inverted_swap_thresholds_rejected() {
    let config: Config = toml::from_str(
        r#"
        [monitor]
        swap_moderate_mb = 3000
        swap_critical_mb = 2000
        "#,
    )
    .unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("swap_moderate_mb")));
}

#[test]
fn zero_rate_limit_rejected() {
    let config: Config = toml::from_str(
        r#"
        [lookup]
        rate_per_sec = 0
        "#,
    )
    .unwrap();
    assert!(config
        .validate()
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error));
}
