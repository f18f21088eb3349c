//! 并发控制值估算
//!
//! 运行时间越长的爬虫，分配到的并发控制值越高：以一天为基准，
//! 平均运行时长与一天的比例决定对默认值的缩放幅度。

use std::sync::Arc;

use keeper_core::{
    config::models::SchedulerConfig,
    models::{JobExecution, SpiderInstance},
    traits::{JobExecutionRepository, SpiderRepository},
    KeeperError, KeeperResult,
};
use tracing::debug;

/// 参与估算的最近执行记录数
pub const HISTORY_WINDOW: usize = 10;

const MINUTES_PER_DAY: f64 = 1440.0;

/// 估算结果的下限，保证启动的任务总有正的并发控制值
const MIN_THROTTLE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleSettings {
    pub default_concurrency: f64,
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl From<&SchedulerConfig> for ThrottleSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            default_concurrency: config.default_autothrottle_max_concurrency,
            min_ratio: config.min_load_ratio_multiplier,
            max_ratio: config.max_load_ratio_multiplier,
        }
    }
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn latest(history: &[JobExecution]) -> &[JobExecution] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

/// 由按开始时间升序排列的已完成执行记录估算下一次的并发控制值
pub fn estimate_throttle(history: &[JobExecution], settings: &ThrottleSettings) -> f64 {
    let durations: Vec<f64> = latest(history)
        .iter()
        .filter_map(JobExecution::duration_minutes)
        .map(|minutes| minutes.max(0.0))
        .collect();

    if durations.is_empty() {
        return settings.default_concurrency;
    }

    let average_minutes = durations.iter().sum::<f64>() / durations.len() as f64;
    if average_minutes <= 0.0 {
        return settings.default_concurrency;
    }

    let ratio = (MINUTES_PER_DAY / average_minutes).clamp(settings.min_ratio, settings.max_ratio);
    round_to_tenth(settings.default_concurrency / ratio).max(MIN_THROTTLE)
}

/// 历史平均负载：最近的有效执行所用并发控制值的平均数，没有可用数据时返回 0
///
/// 只有报告了请求数且请求数大于 0 的执行才算有效运行。
pub fn average_load(history: &[JobExecution]) -> f64 {
    let productive: Vec<&JobExecution> = history
        .iter()
        .filter(|execution| matches!(execution.requests_count, Some(n) if n > 0))
        .collect();
    let recent = &productive[productive.len().saturating_sub(HISTORY_WINDOW)..];

    let values: Vec<f64> = recent
        .iter()
        .filter_map(|execution| execution.throttle_concurrency)
        .collect();

    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub struct ThrottleEstimator {
    spider_repo: Arc<dyn SpiderRepository>,
    execution_repo: Arc<dyn JobExecutionRepository>,
    settings: ThrottleSettings,
}

impl ThrottleEstimator {
    pub fn new(
        spider_repo: Arc<dyn SpiderRepository>,
        execution_repo: Arc<dyn JobExecutionRepository>,
        settings: ThrottleSettings,
    ) -> Self {
        Self {
            spider_repo,
            execution_repo,
            settings,
        }
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    pub async fn recommended_throttle(&self, spider: &SpiderInstance) -> KeeperResult<f64> {
        let history = self
            .execution_repo
            .list_finished_for_spider(spider.project_id, &spider.spider_name)
            .await?;

        let throttle = estimate_throttle(&history, &self.settings);
        debug!(
            "爬虫 {} 基于 {} 条历史记录的并发控制值: {}",
            spider.spider_name,
            latest(&history).len(),
            throttle
        );
        Ok(throttle)
    }

    pub async fn recommended_throttle_by_id(&self, spider_id: i64) -> KeeperResult<f64> {
        let spider = self.load_spider(spider_id).await?;
        self.recommended_throttle(&spider).await
    }

    pub async fn average_load(&self, spider: &SpiderInstance) -> KeeperResult<f64> {
        let history = self
            .execution_repo
            .list_finished_for_spider(spider.project_id, &spider.spider_name)
            .await?;
        Ok(average_load(&history))
    }

    async fn load_spider(&self, spider_id: i64) -> KeeperResult<SpiderInstance> {
        self.spider_repo
            .get_by_id(spider_id)
            .await?
            .ok_or(KeeperError::SpiderNotFound { id: spider_id })
    }
}
