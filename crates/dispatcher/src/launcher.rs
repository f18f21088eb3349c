use std::sync::Arc;

use async_trait::async_trait;
use keeper_core::{
    models::{JobExecution, JobInstance, Project, SpiderInstance},
    traits::{
        ExecutionAgent, JobExecutionRepository, JobInstanceRepository, ProjectRepository,
        SpiderRepository, TriggerHandler,
    },
    KeeperError, KeeperResult,
};
use keeper_infrastructure::{MetricsCollector, StructuredLogger};
use tracing::{error, info, instrument, warn};

use crate::throttle::ThrottleEstimator;

/// 一次启动的结果
///
/// 任务实例总是已经持久化；执行代理拒绝启动时没有执行记录。
#[derive(Debug, Clone)]
pub struct LaunchResult {
    pub job_instance: JobInstance,
    pub execution: Option<JobExecution>,
}

impl LaunchResult {
    pub fn started(&self) -> bool {
        self.execution.is_some()
    }
}

pub struct SpiderLauncher {
    project_repo: Arc<dyn ProjectRepository>,
    spider_repo: Arc<dyn SpiderRepository>,
    job_instance_repo: Arc<dyn JobInstanceRepository>,
    execution_repo: Arc<dyn JobExecutionRepository>,
    agent: Arc<dyn ExecutionAgent>,
    throttle: Arc<ThrottleEstimator>,
    metrics: Arc<MetricsCollector>,
}

impl SpiderLauncher {
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        spider_repo: Arc<dyn SpiderRepository>,
        job_instance_repo: Arc<dyn JobInstanceRepository>,
        execution_repo: Arc<dyn JobExecutionRepository>,
        agent: Arc<dyn ExecutionAgent>,
        throttle: Arc<ThrottleEstimator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            project_repo,
            spider_repo,
            job_instance_repo,
            execution_repo,
            agent,
            throttle,
            metrics,
        }
    }

    /// 物化一次性任务实例并请求执行代理启动
    ///
    /// 任务实例先在事务中持久化，持久化失败时直接返回错误，不会调用执行代理。
    #[instrument(skip(self, project, spider), fields(project = %project.name, spider = %spider.spider_name))]
    pub async fn run_spider(
        &self,
        project: &Project,
        spider: &SpiderInstance,
    ) -> KeeperResult<LaunchResult> {
        let throttle = self.throttle.recommended_throttle(spider).await?;

        let mut job_instance = JobInstance::one_time(project.id, spider.spider_name.clone());
        job_instance.apply_throttle(throttle);

        let job_instance = match self.job_instance_repo.create(&job_instance).await {
            Ok(created) => created,
            Err(e) => {
                self.metrics.record_launch_failure("persist");
                error!("保存爬虫 {} 的任务实例失败: {}", spider.spider_name, e);
                return Err(e);
            }
        };

        let execution = self.start_and_record(project, &job_instance).await?;
        Ok(LaunchResult {
            job_instance,
            execution,
        })
    }

    /// 按名称启动项目中的爬虫
    pub async fn run_spider_by_name(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<LaunchResult> {
        let project = self.load_project(project_id).await?;
        let spider = self
            .spider_repo
            .find_by_name(project_id, spider_name)
            .await?
            .ok_or_else(|| KeeperError::SpiderNameNotFound {
                project_id,
                name: spider_name.to_string(),
            })?;

        self.run_spider(&project, &spider).await
    }

    /// 周期任务触发：按模板启动一次，不创建新的任务实例
    #[instrument(skip(self))]
    pub async fn run_spider_job(&self, job_instance_id: i64) -> KeeperResult<Option<JobExecution>> {
        let job_instance = self
            .job_instance_repo
            .get_by_id(job_instance_id)
            .await?
            .ok_or(KeeperError::JobInstanceNotFound { id: job_instance_id })?;

        let project = self.load_project(job_instance.project_id).await?;
        self.start_and_record(&project, &job_instance).await
    }

    /// 请求执行代理启动并记录 PENDING 执行
    ///
    /// 执行代理失败只记录日志，返回 `Ok(None)`；已启动任务的执行记录写入失败时返回错误。
    async fn start_and_record(
        &self,
        project: &Project,
        job_instance: &JobInstance,
    ) -> KeeperResult<Option<JobExecution>> {
        let launch = match self.agent.start_spider(project, job_instance).await {
            Ok(launch) => launch,
            Err(e) => {
                self.metrics.record_launch_failure("agent");
                warn!(
                    "执行代理启动爬虫 {} 失败，任务实例 {} 保留: {}",
                    job_instance.spider_name, job_instance.id, e
                );
                return Ok(None);
            }
        };

        let execution = JobExecution::pending(
            job_instance,
            launch.service_job_execution_id.clone(),
            launch.running_on,
        );
        let execution = match self.execution_repo.create(&execution).await {
            Ok(created) => created,
            Err(e) => {
                self.metrics.record_launch_failure("record");
                error!(
                    "爬虫 {} 已启动（{}），但执行记录保存失败: {}",
                    job_instance.spider_name, launch.service_job_execution_id, e
                );
                return Err(e);
            }
        };

        self.metrics.record_job_launched(&project.name);
        StructuredLogger::log_job_launched(
            &project.name,
            &job_instance.spider_name,
            job_instance.id,
            &execution.service_job_execution_id,
            job_instance.throttle_concurrency.unwrap_or_default(),
        );
        Ok(Some(execution))
    }

    async fn load_project(&self, project_id: i64) -> KeeperResult<Project> {
        self.project_repo
            .get_by_id(project_id)
            .await?
            .ok_or(KeeperError::ProjectNotFound { id: project_id })
    }
}

#[async_trait]
impl TriggerHandler for SpiderLauncher {
    async fn run_job(&self, job_instance_id: i64) {
        match self.run_spider_job(job_instance_id).await {
            Ok(Some(execution)) => info!(
                "周期任务 {} 已启动，执行代理任务ID: {}",
                job_instance_id, execution.service_job_execution_id
            ),
            Ok(None) => warn!("周期任务 {} 未能启动", job_instance_id),
            Err(e) => StructuredLogger::log_system_error("trigger", "run_spider_job", &e),
        }
    }
}
