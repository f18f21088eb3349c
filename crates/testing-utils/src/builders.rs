//! 测试数据构建器

use chrono::{DateTime, Duration, Utc};
use keeper_core::models::{
    AgentJobSnapshot, CronFields, JobExecution, JobInstance, SpiderStatus,
};

/// 周期任务模板构建器
pub struct JobInstanceBuilder {
    instance: JobInstance,
}

impl JobInstanceBuilder {
    pub fn new() -> Self {
        Self {
            instance: JobInstance::periodic(1, "test_spider", CronFields::default()),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.instance.id = id;
        self
    }

    pub fn with_project(mut self, project_id: i64) -> Self {
        self.instance.project_id = project_id;
        self
    }

    pub fn with_spider(mut self, spider_name: &str) -> Self {
        self.instance.spider_name = spider_name.to_string();
        self
    }

    pub fn with_cron(mut self, cron: CronFields) -> Self {
        self.instance.cron = cron;
        self
    }

    pub fn with_enabled(mut self, enabled: i32) -> Self {
        self.instance.enabled = enabled;
        self
    }

    pub fn with_modified(mut self, date_modified: DateTime<Utc>) -> Self {
        self.instance.date_modified = date_modified;
        self
    }

    pub fn with_throttle(mut self, throttle: f64) -> Self {
        self.instance.apply_throttle(throttle);
        self
    }

    pub fn one_time(mut self) -> Self {
        let template = self.instance;
        let mut instance = JobInstance::one_time(template.project_id, template.spider_name);
        instance.id = template.id;
        self.instance = instance;
        self
    }

    pub fn build(self) -> JobInstance {
        self.instance
    }
}

impl Default for JobInstanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 执行记录构建器
pub struct JobExecutionBuilder {
    execution: JobExecution,
}

impl JobExecutionBuilder {
    pub fn new(job_instance: &JobInstance) -> Self {
        Self {
            execution: JobExecution::pending(
                job_instance,
                format!("svc-{}", job_instance.id),
                None,
            ),
        }
    }

    pub fn with_service_id(mut self, service_id: &str) -> Self {
        self.execution.service_job_execution_id = service_id.to_string();
        self
    }

    pub fn running(mut self, started_at: DateTime<Utc>) -> Self {
        self.execution.running_status = SpiderStatus::Running;
        self.execution.start_time = Some(started_at);
        self
    }

    /// 已结束的执行，运行时长以分钟计
    pub fn finished(mut self, started_at: DateTime<Utc>, minutes: i64) -> Self {
        self.execution.running_status = SpiderStatus::Finished;
        self.execution.start_time = Some(started_at);
        self.execution.end_time = Some(started_at + Duration::minutes(minutes));
        self
    }

    pub fn with_requests_count(mut self, requests_count: i64) -> Self {
        self.execution.requests_count = Some(requests_count);
        self
    }

    pub fn with_create_time(mut self, create_time: DateTime<Utc>) -> Self {
        self.execution.create_time = create_time;
        self
    }

    pub fn build(self) -> JobExecution {
        self.execution
    }
}

/// 执行代理状态快照构建器
pub struct SnapshotBuilder {
    snapshot: AgentJobSnapshot,
}

impl SnapshotBuilder {
    pub fn new(service_id: &str, spider_name: &str, status: SpiderStatus) -> Self {
        Self {
            snapshot: AgentJobSnapshot {
                service_job_execution_id: service_id.to_string(),
                spider_name: spider_name.to_string(),
                status,
                start_time: None,
                end_time: None,
                requests_count: None,
                running_on: None,
            },
        }
    }

    pub fn started_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.snapshot.start_time = Some(start_time);
        self
    }

    pub fn ended_at(mut self, end_time: DateTime<Utc>) -> Self {
        self.snapshot.end_time = Some(end_time);
        self
    }

    pub fn with_requests_count(mut self, requests_count: i64) -> Self {
        self.snapshot.requests_count = Some(requests_count);
        self
    }

    pub fn build(self) -> AgentJobSnapshot {
        self.snapshot
    }
}
