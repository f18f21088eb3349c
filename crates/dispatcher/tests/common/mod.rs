#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use keeper_core::config::models::SchedulerConfig;
use keeper_core::models::{JobExecution, Project, SpiderInstance, SpiderStatus};
use keeper_dispatcher::{
    EligibilityEvaluator, LoadAccountant, LoadAwareDispatcher, PeriodicJobReconciler,
    SpiderLauncher, StatusSynchronizer, ThrottleEstimator,
};
use keeper_infrastructure::MetricsCollector;
use keeper_testing_utils::{MockExecutionAgent, MockMemoryGauge, MockStore, MockTriggerRegistry};

/// 组装调度组件的测试环境，所有组件共享同一份内存存储
pub struct Harness {
    pub store: MockStore,
    pub agent: Arc<MockExecutionAgent>,
    pub memory: Arc<MockMemoryGauge>,
    pub registry: Arc<MockTriggerRegistry>,
    pub config: SchedulerConfig,
    pub metrics: Arc<MetricsCollector>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            store: MockStore::new(),
            agent: Arc::new(MockExecutionAgent::new()),
            memory: Arc::new(MockMemoryGauge::default()),
            registry: Arc::new(MockTriggerRegistry::new()),
            config,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    fn shared_store(&self) -> Arc<MockStore> {
        Arc::new(self.store.clone())
    }

    pub fn throttle(&self) -> Arc<ThrottleEstimator> {
        Arc::new(ThrottleEstimator::new(
            self.shared_store(),
            self.shared_store(),
            (&self.config).into(),
        ))
    }

    pub fn evaluator(&self) -> EligibilityEvaluator {
        EligibilityEvaluator::new(
            self.shared_store(),
            self.shared_store(),
            self.memory.clone(),
            (&self.config).into(),
        )
    }

    pub fn launcher(&self) -> Arc<SpiderLauncher> {
        Arc::new(SpiderLauncher::new(
            self.shared_store(),
            self.shared_store(),
            self.shared_store(),
            self.shared_store(),
            self.agent.clone(),
            self.throttle(),
            self.metrics.clone(),
        ))
    }

    pub fn dispatcher(&self) -> LoadAwareDispatcher {
        LoadAwareDispatcher::new(
            self.shared_store(),
            self.shared_store(),
            LoadAccountant::new(self.shared_store()),
            self.throttle(),
            self.evaluator(),
            self.launcher(),
            (&self.config).into(),
            self.metrics.clone(),
        )
    }

    pub fn reconciler(&self) -> PeriodicJobReconciler {
        PeriodicJobReconciler::new(
            self.shared_store(),
            self.registry.clone(),
            self.launcher(),
            self.metrics.clone(),
        )
    }

    pub fn synchronizer(&self) -> StatusSynchronizer {
        StatusSynchronizer::new(
            self.shared_store(),
            self.shared_store(),
            self.shared_store(),
            self.agent.clone(),
            self.metrics.clone(),
        )
    }

    pub fn project_with_spiders(&self, name: &str, spiders: &[&str]) -> (Project, Vec<SpiderInstance>) {
        let project = self.store.add_project(name);
        let spiders = spiders
            .iter()
            .map(|spider| self.store.add_spider(project.id, spider))
            .collect();
        (project, spiders)
    }

    /// 已结束的执行记录
    pub fn finished_run(
        &self,
        spider: &SpiderInstance,
        started_at: DateTime<Utc>,
        minutes: i64,
        throttle: Option<f64>,
    ) -> JobExecution {
        self.store
            .record_run(spider.project_id, &spider.spider_name, throttle, |e| {
                e.running_status = SpiderStatus::Finished;
                e.create_time = started_at;
                e.start_time = Some(started_at);
                e.end_time = Some(started_at + Duration::minutes(minutes));
                e.requests_count = Some(100);
            })
    }

    /// 运行中的执行记录
    pub fn running_run(
        &self,
        spider: &SpiderInstance,
        started_at: DateTime<Utc>,
        throttle: Option<f64>,
    ) -> JobExecution {
        self.store
            .record_run(spider.project_id, &spider.spider_name, throttle, |e| {
                e.running_status = SpiderStatus::Running;
                e.create_time = started_at;
                e.start_time = Some(started_at);
            })
    }

    /// 已提交但尚未开始的执行记录
    pub fn pending_run(&self, spider: &SpiderInstance, created_at: DateTime<Utc>) -> JobExecution {
        self.store
            .record_run(spider.project_id, &spider.spider_name, Some(4.0), |e| {
                e.create_time = created_at;
            })
    }
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}
