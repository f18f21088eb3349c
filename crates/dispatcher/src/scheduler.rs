use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use keeper_core::{
    config::models::SchedulerConfig,
    models::{Project, SpiderLastRun},
    traits::{ProjectRepository, SpiderRepository},
    KeeperError, KeeperResult,
};
use keeper_infrastructure::{MetricsCollector, StructuredLogger};
use tracing::{debug, error, info, info_span, Instrument};

use crate::eligibility::{Eligibility, EligibilityEvaluator};
use crate::launcher::SpiderLauncher;
use crate::load::LoadAccountant;
use crate::throttle::ThrottleEstimator;

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub auto_schedule_enabled: bool,
    pub max_spiders_start_at_once: usize,
    pub default_concurrency: f64,
    pub max_load_allowed: f64,
}

impl From<&SchedulerConfig> for DispatchSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            auto_schedule_enabled: config.auto_schedule_enabled,
            max_spiders_start_at_once: config.max_spiders_start_at_once,
            default_concurrency: config.default_autothrottle_max_concurrency,
            max_load_allowed: config.max_load_allowed,
        }
    }
}

/// 一轮调度的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub projects: usize,
    /// 本轮新建的一次性任务实例ID
    pub launched: Vec<i64>,
    pub skipped: usize,
    pub failed: usize,
}

enum SpiderOutcome {
    Launched { job_instance_id: i64, avg_load: f64 },
    Skipped,
}

/// 负载感知的调度器
///
/// 按项目遍历爬虫（最久未运行的优先），在启动数量和负载上限内启动符合条件的爬虫。
/// 本轮内的负载累计使用各爬虫的历史平均负载，是对真实负载的近似。
pub struct LoadAwareDispatcher {
    project_repo: Arc<dyn ProjectRepository>,
    spider_repo: Arc<dyn SpiderRepository>,
    load_accountant: LoadAccountant,
    throttle: Arc<ThrottleEstimator>,
    evaluator: EligibilityEvaluator,
    launcher: Arc<SpiderLauncher>,
    settings: DispatchSettings,
    metrics: Arc<MetricsCollector>,
}

impl LoadAwareDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        spider_repo: Arc<dyn SpiderRepository>,
        load_accountant: LoadAccountant,
        throttle: Arc<ThrottleEstimator>,
        evaluator: EligibilityEvaluator,
        launcher: Arc<SpiderLauncher>,
        settings: DispatchSettings,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            project_repo,
            spider_repo,
            load_accountant,
            throttle,
            evaluator,
            launcher,
            settings,
            metrics,
        }
    }

    pub async fn dispatch_cycle(&self) -> KeeperResult<DispatchReport> {
        self.dispatch_cycle_at(Local::now()).await
    }

    pub async fn dispatch_cycle_at(&self, now: DateTime<Local>) -> KeeperResult<DispatchReport> {
        let mut report = DispatchReport::default();
        if !self.settings.auto_schedule_enabled {
            debug!("自动调度已关闭，跳过本轮调度");
            return Ok(report);
        }

        let started = Instant::now();
        let projects = self.project_repo.list_all().await?;

        for project in &projects {
            report.projects += 1;
            let span = info_span!("dispatch_project", project.id = project.id, project.name = %project.name);
            if let Err(e) = self
                .dispatch_project(project, now, &mut report)
                .instrument(span)
                .await
            {
                report.failed += 1;
                StructuredLogger::log_system_error("dispatcher", "dispatch_project", &e);
            }
        }

        let elapsed = started.elapsed();
        self.metrics.record_dispatch_cycle(elapsed.as_secs_f64());
        StructuredLogger::log_dispatch_summary(
            report.projects,
            report.launched.len(),
            report.skipped,
            report.failed,
            elapsed.as_millis() as u64,
        );
        Ok(report)
    }

    async fn dispatch_project(
        &self,
        project: &Project,
        now: DateTime<Local>,
        report: &mut DispatchReport,
    ) -> KeeperResult<()> {
        let spiders = self.spider_repo.list_by_last_run(project.id).await?;
        let mut current_load = self.load_accountant.current_load(project.id).await?;
        let mut started = 0;

        for entry in &spiders {
            if started >= self.settings.max_spiders_start_at_once {
                debug!("项目 {} 本轮启动数已达上限 {}", project.name, started);
                break;
            }

            match self.dispatch_spider(project, entry, current_load, now).await {
                Ok(SpiderOutcome::Launched {
                    job_instance_id,
                    avg_load,
                }) => {
                    started += 1;
                    current_load += avg_load;
                    report.launched.push(job_instance_id);
                }
                Ok(SpiderOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!("调度爬虫 {} 失败: {}", entry.spider_name, e);
                }
            }

            if current_load >= self.settings.max_load_allowed {
                debug!(
                    "项目 {} 负载 {:.1} 已达上限 {:.1}",
                    project.name, current_load, self.settings.max_load_allowed
                );
                break;
            }
        }

        self.metrics.update_project_load(&project.name, current_load);
        if started > 0 {
            info!(
                "项目 {} 本轮启动 {} 个爬虫，负载估计 {:.1}",
                project.name, started, current_load
            );
        }
        Ok(())
    }

    async fn dispatch_spider(
        &self,
        project: &Project,
        entry: &SpiderLastRun,
        current_load: f64,
        now: DateTime<Local>,
    ) -> KeeperResult<SpiderOutcome> {
        let spider = self
            .spider_repo
            .get_by_id(entry.spider_id)
            .await?
            .ok_or(KeeperError::SpiderNotFound {
                id: entry.spider_id,
            })?;

        let mut avg_load = self.throttle.average_load(&spider).await?;
        if avg_load <= 0.0 {
            avg_load = self.settings.default_concurrency;
        }

        match self
            .evaluator
            .evaluate(&spider, avg_load, current_load, now)
            .await?
        {
            Eligibility::Rejected(guard) => {
                self.metrics.record_launch_rejected(guard.as_str());
                StructuredLogger::log_launch_rejected(project.id, &spider.spider_name, guard.as_str());
                Ok(SpiderOutcome::Skipped)
            }
            Eligibility::Eligible => {
                let result = self.launcher.run_spider(project, &spider).await?;
                Ok(SpiderOutcome::Launched {
                    job_instance_id: result.job_instance.id,
                    avg_load,
                })
            }
        }
    }
}
