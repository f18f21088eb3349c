//! # Keeper Testing Utils
//!
//! 工作区内共享的测试工具：
//!
//! - **MockStore**: 同时实现四个仓储接口的内存存储
//! - **MockExecutionAgent / MockTriggerRegistry / MockMemoryGauge**: 外部协作方的测试替身
//! - **Builders**: 任务实例与执行记录的构建器
//!
//! ```toml
//! [dev-dependencies]
//! keeper-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
