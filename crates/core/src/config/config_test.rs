use std::io::Write;

use super::*;

#[test]
fn test_default_config_is_valid() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.scheduler.auto_schedule_enabled);
    assert_eq!(config.scheduler.default_autothrottle_max_concurrency, 4.0);
    assert_eq!(config.scheduler.weekly_spider_marker, "sellers.");
    assert_eq!(config.agent.servers, vec!["http://localhost:6800".to_string()]);
}

#[test]
fn test_from_toml_fills_missing_sections_with_defaults() {
    let toml_str = r#"
        [scheduler]
        max_load_allowed = 10.0
        max_spiders_start_at_once = 2

        [agent]
        servers = ["http://node-1:6800", "http://node-2:6800"]
    "#;

    let config = AppConfig::from_toml(toml_str).unwrap();
    assert_eq!(config.scheduler.max_load_allowed, 10.0);
    assert_eq!(config.scheduler.max_spiders_start_at_once, 2);
    assert_eq!(config.scheduler.min_load_ratio_multiplier, 0.5);
    assert_eq!(config.agent.servers.len(), 2);
    assert_eq!(config.database.url, "sqlite://keeper.db?mode=rwc");
}

#[test]
fn test_toml_round_trip() {
    let config = AppConfig::default();
    let toml_str = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&toml_str).unwrap();
    assert_eq!(
        parsed.scheduler.max_load_ratio_multiplier,
        config.scheduler.max_load_ratio_multiplier
    );
    assert_eq!(parsed.agent.servers, config.agent.servers);
}

#[test]
fn test_validation_rejects_inverted_ratio_bounds() {
    let mut config = AppConfig::default();
    config.scheduler.min_load_ratio_multiplier = 12.0;
    config.scheduler.max_load_ratio_multiplier = 10.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_non_finite_numbers() {
    let mut config = AppConfig::default();
    config.scheduler.min_load_ratio_multiplier = f64::NAN;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.scheduler.max_load_ratio_multiplier = f64::NAN;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.scheduler.max_load_allowed = f64::INFINITY;
    assert!(config.validate().is_err());

    let toml_str = r#"
        [scheduler]
        max_load_ratio_multiplier = nan
    "#;
    assert!(AppConfig::from_toml(toml_str).is_err());
}

#[test]
fn test_validation_rejects_empty_servers() {
    let mut config = AppConfig::default();
    config.agent.servers.clear();
    assert!(config.validate().is_err());

    config.agent.servers = vec!["localhost:6800".to_string()];
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_zero_interval() {
    let mut config = AppConfig::default();
    config.scheduler.dispatch_interval_seconds = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_unknown_log_format() {
    let mut config = AppConfig::default();
    config.observability.log_format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[scheduler]
auto_schedule_enabled = false
weekly_spider_marker = "weekly."

[resource]
min_free_memory_mb = 2048
"#
    )
    .unwrap();

    let config = AppConfig::load(Some(file.path().to_str().unwrap())).unwrap();
    assert!(!config.scheduler.auto_schedule_enabled);
    assert_eq!(config.scheduler.weekly_spider_marker, "weekly.");
    assert_eq!(config.resource.min_free_memory_mb, 2048);
    assert_eq!(config.scheduler.max_spiders_start_at_once, 5);
}

#[test]
fn test_load_missing_file_fails() {
    assert!(AppConfig::load(Some("/nonexistent/keeper.toml")).is_err());
}
