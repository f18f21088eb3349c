//! 爬虫自适应调度核心
//!
//! - 周期任务对账 (PeriodicJobReconciler)
//! - 负载统计 (LoadAccountant) 与并发控制值估算 (ThrottleEstimator)
//! - 启动资格判断 (EligibilityEvaluator)
//! - 负载感知调度 (LoadAwareDispatcher) 与启动 (SpiderLauncher)
//! - 状态同步 (StatusSynchronizer)
//! - 进程内定时触发器 (CronTriggerRegistry)

pub mod cron_utils;
pub mod eligibility;
pub mod launcher;
pub mod load;
pub mod reconciler;
pub mod scheduler;
pub mod status_sync;
pub mod throttle;
pub mod trigger_id;
pub mod trigger_registry;

pub use eligibility::{Eligibility, EligibilityEvaluator, EligibilitySettings, GuardKind};
pub use launcher::{LaunchResult, SpiderLauncher};
pub use load::LoadAccountant;
pub use reconciler::{PeriodicJobReconciler, ReconcileReport};
pub use scheduler::{DispatchReport, DispatchSettings, LoadAwareDispatcher};
pub use status_sync::{StatusSynchronizer, SyncReport};
pub use throttle::{ThrottleEstimator, ThrottleSettings};
pub use trigger_registry::CronTriggerRegistry;
