//! 配置管理
//!
//! 配置按以下顺序合并，后者覆盖前者：
//!
//! 1. 内置默认值（[`AppConfig::default`]）
//! 2. TOML 配置文件（显式指定路径，或 [`DEFAULT_CONFIG_PATHS`] 中第一个存在的文件）
//! 3. 环境变量，前缀 `KEEPER_`，嵌套字段用 `__` 分隔，
//!    例如 `KEEPER_SCHEDULER__MAX_LOAD_ALLOWED=12.5`、`KEEPER_AGENT__SERVERS=http://a:6800,http://b:6800`
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use keeper_core::config::AppConfig;
//!
//! let config = AppConfig::load(Some("config/keeper.toml")).unwrap();
//! println!("最大负载: {}", config.scheduler.max_load_allowed);
//! ```

pub mod models;

pub use models::app_config::DEFAULT_CONFIG_PATHS;
pub use models::*;

#[cfg(test)]
mod config_test;
