//! 调度领域事件的结构化日志

use tracing::{debug, error, info};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_job_launched(
        project: &str,
        spider_name: &str,
        job_instance_id: i64,
        service_job_execution_id: &str,
        throttle: f64,
    ) {
        info!(
            event = "job_launched",
            project = project,
            spider.name = spider_name,
            job_instance.id = job_instance_id,
            job.service_id = service_job_execution_id,
            throttle = throttle,
            "Spider launched"
        );
    }

    pub fn log_launch_rejected(project_id: i64, spider_name: &str, guard: &str) {
        debug!(
            event = "launch_rejected",
            project.id = project_id,
            spider.name = spider_name,
            guard = guard,
            "Spider not eligible"
        );
    }

    pub fn log_trigger_registered(trigger_id: &str, job_instance_id: i64, cron: &str) {
        info!(
            event = "trigger_registered",
            trigger.id = trigger_id,
            job_instance.id = job_instance_id,
            cron = cron,
            "Periodic trigger registered"
        );
    }

    pub fn log_trigger_removed(trigger_id: &str) {
        info!(
            event = "trigger_removed",
            trigger.id = trigger_id,
            "Periodic trigger removed"
        );
    }

    pub fn log_dispatch_summary(
        projects: usize,
        launched: usize,
        skipped: usize,
        failed: usize,
        duration_ms: u64,
    ) {
        info!(
            event = "dispatch_cycle",
            projects = projects,
            launched = launched,
            skipped = skipped,
            failed = failed,
            duration_ms = duration_ms,
            "Dispatch cycle completed"
        );
    }

    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error = %error,
            "System error occurred"
        );
    }
}
