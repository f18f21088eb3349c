//! # 数据模型
//!
//! 定义爬虫调度系统的核心数据结构：项目、爬虫、任务实例、任务执行记录。
//!
//! ## 核心模型
//!
//! ### Project - 项目
//! 爬虫与任务的分组单元，执行代理通过项目名称识别项目。
//!
//! ### SpiderInstance - 爬虫
//! 项目中一个可被执行代理运行的爬虫，由状态同步从代理的爬虫清单中发现。
//! 关联的 [`SpiderSetup`] 记录控制是否允许自动调度。
//!
//! ### JobInstance - 任务实例
//! 一次启动请求的定义。周期任务实例是模板，一次性任务实例是已物化的运行请求。
//!
//! ### JobExecution - 任务执行记录
//! 一次实际运行的记录，状态由执行代理上报并经状态同步写入。
//!
//! ## 状态流转
//!
//! ```text
//! PENDING → RUNNING → FINISHED
//!    ↓         ↓
//!    └──→ CANCELED ←┘
//! ```
//!
//! 终态记录（FINISHED / CANCELED）不会再被改写。

pub mod job_execution;
pub mod job_instance;
pub mod project;
pub mod spider;

pub use job_execution::*;
pub use job_instance::*;
pub use project::*;
pub use spider::*;
