use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use keeper_core::config::AppConfig;
use keeper_core::traits::{
    ExecutionAgent, JobExecutionRepository, JobInstanceRepository, MemoryGauge, ProjectRepository,
    SpiderRepository, TriggerRegistry,
};
use keeper_dispatcher::{
    CronTriggerRegistry, EligibilityEvaluator, LoadAccountant, LoadAwareDispatcher,
    PeriodicJobReconciler, SpiderLauncher, StatusSynchronizer, ThrottleEstimator,
};
use keeper_infrastructure::database::sqlite::{
    SqliteJobExecutionRepository, SqliteJobInstanceRepository, SqliteProjectRepository,
    SqliteSpiderRepository,
};
use keeper_infrastructure::{DatabaseManager, MeminfoGauge, MetricsCollector, ScrapydAgent};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// 单次运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOnce {
    Dispatch,
    Reconcile,
    Sync,
}

impl std::str::FromStr for RunOnce {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dispatch" => Ok(RunOnce::Dispatch),
            "reconcile" => Ok(RunOnce::Reconcile),
            "sync" => Ok(RunOnce::Sync),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {s}")),
        }
    }
}

/// 组件依赖的存储与外部协作者
pub struct Collaborators {
    pub project_repo: Arc<dyn ProjectRepository>,
    pub spider_repo: Arc<dyn SpiderRepository>,
    pub job_instance_repo: Arc<dyn JobInstanceRepository>,
    pub execution_repo: Arc<dyn JobExecutionRepository>,
    pub agent: Arc<dyn ExecutionAgent>,
    pub memory_gauge: Arc<dyn MemoryGauge>,
    pub registry: Arc<dyn TriggerRegistry>,
}

/// 组装完成的调度组件
pub struct Components {
    pub launcher: Arc<SpiderLauncher>,
    pub reconciler: Arc<PeriodicJobReconciler>,
    pub dispatcher: Arc<LoadAwareDispatcher>,
    pub synchronizer: Arc<StatusSynchronizer>,
}

impl Components {
    pub fn build(
        config: &AppConfig,
        collaborators: Collaborators,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let Collaborators {
            project_repo,
            spider_repo,
            job_instance_repo,
            execution_repo,
            agent,
            memory_gauge,
            registry,
        } = collaborators;

        let throttle = Arc::new(ThrottleEstimator::new(
            spider_repo.clone(),
            execution_repo.clone(),
            (&config.scheduler).into(),
        ));

        let launcher = Arc::new(SpiderLauncher::new(
            project_repo.clone(),
            spider_repo.clone(),
            job_instance_repo.clone(),
            execution_repo.clone(),
            agent.clone(),
            throttle.clone(),
            metrics.clone(),
        ));

        let reconciler = Arc::new(PeriodicJobReconciler::new(
            job_instance_repo,
            registry,
            launcher.clone(),
            metrics.clone(),
        ));

        let evaluator = EligibilityEvaluator::new(
            spider_repo.clone(),
            execution_repo.clone(),
            memory_gauge,
            (&config.scheduler).into(),
        );

        let dispatcher = Arc::new(LoadAwareDispatcher::new(
            project_repo.clone(),
            spider_repo.clone(),
            LoadAccountant::new(execution_repo.clone()),
            throttle,
            evaluator,
            launcher.clone(),
            (&config.scheduler).into(),
            metrics.clone(),
        ));

        let synchronizer = Arc::new(StatusSynchronizer::new(
            project_repo,
            spider_repo,
            execution_repo,
            agent,
            metrics,
        ));

        Self {
            launcher,
            reconciler,
            dispatcher,
            synchronizer,
        }
    }

    /// 执行一轮指定的后台任务
    pub async fn run_once(&self, mode: RunOnce) -> Result<()> {
        match mode {
            RunOnce::Dispatch => {
                let report = self.dispatcher.dispatch_cycle().await?;
                info!(
                    "调度完成: 项目 {} 个，启动 {} 个，跳过 {} 个，失败 {} 个",
                    report.projects,
                    report.launched.len(),
                    report.skipped,
                    report.failed
                );
            }
            RunOnce::Reconcile => {
                let report = self.reconciler.reconcile().await?;
                info!(
                    "对账完成: 新增 {} 个，移除 {} 个，失败 {} 个",
                    report.added.len(),
                    report.removed.len(),
                    report.failed.len()
                );
            }
            RunOnce::Sync => {
                let spiders = self.synchronizer.sync_spiders().await?;
                let jobs = self.synchronizer.sync_job_status().await?;
                info!(
                    "同步完成: 新增爬虫 {} 个，更新执行记录 {} 条，未知任务 {} 个",
                    spiders.spiders_added, jobs.updated, jobs.unknown
                );
            }
        }
        Ok(())
    }
}

/// 应用实例
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    registry: Arc<CronTriggerRegistry>,
    components: Components,
}

impl Application {
    /// 连接数据库、建表并组装所有组件
    pub async fn new(config: AppConfig) -> Result<Self> {
        let database = DatabaseManager::new(&config.database)
            .await
            .context("初始化数据库失败")?;
        database.migrate().await.context("创建数据库表失败")?;

        let pool = database.pool().clone();
        let agent = ScrapydAgent::new(&config.agent).context("创建执行代理客户端失败")?;
        let registry = Arc::new(CronTriggerRegistry::new());

        let collaborators = Collaborators {
            project_repo: Arc::new(SqliteProjectRepository::new(pool.clone())),
            spider_repo: Arc::new(SqliteSpiderRepository::new(pool.clone())),
            job_instance_repo: Arc::new(SqliteJobInstanceRepository::new(pool.clone())),
            execution_repo: Arc::new(SqliteJobExecutionRepository::new(pool)),
            agent: Arc::new(agent),
            memory_gauge: Arc::new(MeminfoGauge::new(&config.resource)),
            registry: registry.clone(),
        };

        let components =
            Components::build(&config, collaborators, Arc::new(MetricsCollector::new()));

        info!(
            "应用初始化完成，执行代理 {} 个",
            config.agent.servers.len()
        );

        Ok(Self {
            config,
            database,
            registry,
            components,
        })
    }

    pub async fn run_once(&self, mode: RunOnce) -> Result<()> {
        let result = self.components.run_once(mode).await;
        self.database.close().await;
        result
    }

    /// 启动四个后台循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let scheduler = &self.config.scheduler;
        let mut handles = Vec::new();

        {
            let reconciler = Arc::clone(&self.components.reconciler);
            handles.push(tokio::spawn(run_periodic(
                "周期任务对账",
                Duration::from_secs(scheduler.reconcile_interval_seconds),
                shutdown_rx.resubscribe(),
                move || {
                    let reconciler = Arc::clone(&reconciler);
                    async move { reconciler.reconcile().await.map(|_| ()) }
                },
            )));
        }

        {
            let dispatcher = Arc::clone(&self.components.dispatcher);
            handles.push(tokio::spawn(run_periodic(
                "自动调度",
                Duration::from_secs(scheduler.dispatch_interval_seconds),
                shutdown_rx.resubscribe(),
                move || {
                    let dispatcher = Arc::clone(&dispatcher);
                    async move { dispatcher.dispatch_cycle().await.map(|_| ()) }
                },
            )));
        }

        {
            let synchronizer = Arc::clone(&self.components.synchronizer);
            handles.push(tokio::spawn(run_periodic(
                "任务状态同步",
                Duration::from_secs(scheduler.sync_job_status_interval_seconds),
                shutdown_rx.resubscribe(),
                move || {
                    let synchronizer = Arc::clone(&synchronizer);
                    async move { synchronizer.sync_job_status().await.map(|_| ()) }
                },
            )));
        }

        {
            let synchronizer = Arc::clone(&self.components.synchronizer);
            handles.push(tokio::spawn(run_periodic(
                "爬虫清单同步",
                Duration::from_secs(scheduler.sync_spiders_interval_seconds),
                shutdown_rx.resubscribe(),
                move || {
                    let synchronizer = Arc::clone(&synchronizer);
                    async move { synchronizer.sync_spiders().await.map(|_| ()) }
                },
            )));
        }

        let _ = shutdown_rx.recv().await;
        info!("后台任务收到关闭信号");

        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台任务退出异常: {e}");
            }
        }

        self.registry.shutdown();
        self.database.close().await;

        info!("所有后台任务已停止");
        Ok(())
    }
}

/// 按固定间隔执行任务，错过的间隔直接跳过
///
/// 单轮失败只记录日志，下一轮照常执行。
pub async fn run_periodic<F, Fut, E>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("启动后台任务 {name}，间隔 {}秒", period.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                match task().await {
                    Ok(()) => debug!("{name} 完成，耗时 {:?}", started.elapsed()),
                    Err(e) => error!("{name} 执行失败: {e}"),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("后台任务 {name} 已停止");
                break;
            }
        }
    }
}
