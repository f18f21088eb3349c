//! 调度指标采集
//!
//! 通过 `metrics` 门面记录，进程中未安装 recorder 时所有调用都是空操作。

use metrics::{counter, gauge, histogram, Counter, Histogram};
use tracing::debug;

pub struct MetricsCollector {
    jobs_launched_total: Counter,
    triggers_registered_total: Counter,
    triggers_removed_total: Counter,
    triggers_failed_total: Counter,
    dispatch_cycle_duration: Histogram,
    reconcile_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            jobs_launched_total: counter!("keeper_jobs_launched_total"),
            triggers_registered_total: counter!("keeper_triggers_registered_total"),
            triggers_removed_total: counter!("keeper_triggers_removed_total"),
            triggers_failed_total: counter!("keeper_triggers_failed_total"),
            dispatch_cycle_duration: histogram!("keeper_dispatch_cycle_duration_seconds"),
            reconcile_duration: histogram!("keeper_reconcile_duration_seconds"),
        }
    }

    pub fn record_job_launched(&self, project: &str) {
        self.jobs_launched_total.increment(1);
        counter!("keeper_project_jobs_launched_total", "project" => project.to_string())
            .increment(1);
    }

    /// 按拒绝的守卫分类记录
    pub fn record_launch_rejected(&self, guard: &str) {
        counter!("keeper_launch_rejections_total", "guard" => guard.to_string()).increment(1);
    }

    /// 按失败阶段（persist / agent / evaluate）分类记录
    pub fn record_launch_failure(&self, stage: &str) {
        counter!("keeper_launch_failures_total", "stage" => stage.to_string()).increment(1);
        debug!(stage = stage, "launch failure recorded");
    }

    pub fn record_reconcile(&self, added: usize, removed: usize, failed: usize, seconds: f64) {
        self.triggers_registered_total.increment(added as u64);
        self.triggers_removed_total.increment(removed as u64);
        self.triggers_failed_total.increment(failed as u64);
        self.reconcile_duration.record(seconds);
    }

    pub fn record_dispatch_cycle(&self, seconds: f64) {
        self.dispatch_cycle_duration.record(seconds);
    }

    pub fn update_project_load(&self, project: &str, load: f64) {
        gauge!("keeper_project_load", "project" => project.to_string()).set(load);
    }

    pub fn record_status_updates(&self, updated: usize) {
        counter!("keeper_execution_status_updates_total").increment(updated as u64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
