//! 可观测性模块
//!
//! - 指标采集 (MetricsCollector)，只负责记录，不安装导出器
//! - 领域事件的结构化日志 (StructuredLogger)

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
