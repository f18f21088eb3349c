//! 爬虫启动资格判断
//!
//! 资格判断由一组有序、相互独立的守卫组成，按顺序短路执行：
//!
//! 1. 运行周期：今天（周任务为7天内）已经运行过的爬虫不再启动
//! 2. 待执行：已有 PENDING 执行记录
//! 3. 运行中：已有 RUNNING 执行记录
//! 4. 人工开关：调度设置关闭了自动调度
//! 5. 负载：当前负载加上该爬虫的平均负载超过上限
//! 6. 资源：空闲内存不足
//!
//! 守卫只读取共享上下文，不修改任何状态。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone};
use keeper_core::{
    config::models::SchedulerConfig,
    models::{SpiderInstance, SpiderSetup, SpiderStatus},
    traits::{JobExecutionRepository, MemoryGauge, SpiderRepository},
    KeeperError, KeeperResult,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct EligibilitySettings {
    pub max_load_allowed: f64,
    pub weekly_spider_marker: String,
}

impl From<&SchedulerConfig> for EligibilitySettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            max_load_allowed: config.max_load_allowed,
            weekly_spider_marker: config.weekly_spider_marker.clone(),
        }
    }
}

/// 守卫共享的只读上下文
pub struct EligibilityContext<'a> {
    pub spider: &'a SpiderInstance,
    pub avg_load: f64,
    pub current_load: f64,
    pub now: DateTime<Local>,
    pub settings: &'a EligibilitySettings,
    pub spider_repo: &'a dyn SpiderRepository,
    pub execution_repo: &'a dyn JobExecutionRepository,
    pub memory_gauge: &'a dyn MemoryGauge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardKind {
    Cadence,
    Pending,
    Running,
    ManualOverride,
    Load,
    Resource,
}

impl GuardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Cadence => "cadence",
            GuardKind::Pending => "pending",
            GuardKind::Running => "running",
            GuardKind::ManualOverride => "manual_override",
            GuardKind::Load => "load",
            GuardKind::Resource => "resource",
        }
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Rejected(GuardKind),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

#[async_trait]
pub trait EligibilityGuard: Send + Sync {
    fn kind(&self) -> GuardKind;

    async fn allows(&self, ctx: &EligibilityContext<'_>) -> KeeperResult<bool>;
}

/// 运行周期的参考时间：本地当天零点，周任务再往前推7天
pub fn cadence_reference_time<Tz: TimeZone>(now: &DateTime<Tz>, weekly: bool) -> DateTime<Tz> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    let reference = now
        .timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| now.clone() - Duration::hours(24));

    if weekly {
        reference - Duration::days(7)
    } else {
        reference
    }
}

pub struct CadenceGuard;

#[async_trait]
impl EligibilityGuard for CadenceGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Cadence
    }

    async fn allows(&self, ctx: &EligibilityContext<'_>) -> KeeperResult<bool> {
        let last_run = ctx
            .execution_repo
            .get_last_for_spider(ctx.spider.project_id, &ctx.spider.spider_name)
            .await?;

        let Some(last_run) = last_run else {
            return Ok(true);
        };

        let weekly = ctx.spider.is_weekly(&ctx.settings.weekly_spider_marker);
        let reference = cadence_reference_time(&ctx.now, weekly);
        Ok(last_run.last_activity_time() <= reference)
    }
}

pub struct PendingGuard;

#[async_trait]
impl EligibilityGuard for PendingGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Pending
    }

    async fn allows(&self, ctx: &EligibilityContext<'_>) -> KeeperResult<bool> {
        let pending = ctx
            .execution_repo
            .list_by_spider_and_status(
                ctx.spider.project_id,
                &ctx.spider.spider_name,
                SpiderStatus::Pending,
            )
            .await?;
        Ok(pending.is_empty())
    }
}

pub struct RunningGuard;

#[async_trait]
impl EligibilityGuard for RunningGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Running
    }

    async fn allows(&self, ctx: &EligibilityContext<'_>) -> KeeperResult<bool> {
        let running = ctx
            .execution_repo
            .list_by_spider_and_status(
                ctx.spider.project_id,
                &ctx.spider.spider_name,
                SpiderStatus::Running,
            )
            .await?;
        Ok(running.is_empty())
    }
}

pub struct ManualOverrideGuard;

#[async_trait]
impl EligibilityGuard for ManualOverrideGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::ManualOverride
    }

    async fn allows(&self, ctx: &EligibilityContext<'_>) -> KeeperResult<bool> {
        let setup = ctx.spider_repo.get_setup(ctx.spider.id).await?;
        Ok(SpiderSetup::allows_auto_schedule(setup.as_ref()))
    }
}

pub struct LoadGuard;

#[async_trait]
impl EligibilityGuard for LoadGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Load
    }

    async fn allows(&self, ctx: &EligibilityContext<'_>) -> KeeperResult<bool> {
        Ok(ctx.current_load + ctx.avg_load <= ctx.settings.max_load_allowed)
    }
}

pub struct ResourceGuard;

#[async_trait]
impl EligibilityGuard for ResourceGuard {
    fn kind(&self) -> GuardKind {
        GuardKind::Resource
    }

    async fn allows(&self, ctx: &EligibilityContext<'_>) -> KeeperResult<bool> {
        ctx.memory_gauge.has_enough_free_memory().await
    }
}

pub fn default_guards() -> Vec<Box<dyn EligibilityGuard>> {
    vec![
        Box::new(CadenceGuard),
        Box::new(PendingGuard),
        Box::new(RunningGuard),
        Box::new(ManualOverrideGuard),
        Box::new(LoadGuard),
        Box::new(ResourceGuard),
    ]
}

pub struct EligibilityEvaluator {
    spider_repo: Arc<dyn SpiderRepository>,
    execution_repo: Arc<dyn JobExecutionRepository>,
    memory_gauge: Arc<dyn MemoryGauge>,
    settings: EligibilitySettings,
    guards: Vec<Box<dyn EligibilityGuard>>,
}

impl EligibilityEvaluator {
    pub fn new(
        spider_repo: Arc<dyn SpiderRepository>,
        execution_repo: Arc<dyn JobExecutionRepository>,
        memory_gauge: Arc<dyn MemoryGauge>,
        settings: EligibilitySettings,
    ) -> Self {
        Self {
            spider_repo,
            execution_repo,
            memory_gauge,
            settings,
            guards: default_guards(),
        }
    }

    /// 依次执行守卫，返回第一个拒绝的守卫
    pub async fn evaluate(
        &self,
        spider: &SpiderInstance,
        avg_load: f64,
        current_load: f64,
        now: DateTime<Local>,
    ) -> KeeperResult<Eligibility> {
        let ctx = EligibilityContext {
            spider,
            avg_load,
            current_load,
            now,
            settings: &self.settings,
            spider_repo: self.spider_repo.as_ref(),
            execution_repo: self.execution_repo.as_ref(),
            memory_gauge: self.memory_gauge.as_ref(),
        };

        for guard in &self.guards {
            if !guard.allows(&ctx).await? {
                debug!(
                    "爬虫 {} 未通过 {} 检查",
                    spider.spider_name,
                    guard.kind()
                );
                return Ok(Eligibility::Rejected(guard.kind()));
            }
        }
        Ok(Eligibility::Eligible)
    }

    pub async fn should_run(
        &self,
        spider_id: i64,
        avg_load: f64,
        current_load: f64,
    ) -> KeeperResult<bool> {
        let spider = self
            .spider_repo
            .get_by_id(spider_id)
            .await?
            .ok_or(KeeperError::SpiderNotFound { id: spider_id })?;

        let eligibility = self
            .evaluate(&spider, avg_load, current_load, Local::now())
            .await?;
        Ok(eligibility.is_eligible())
    }
}
