use serde::{Deserialize, Serialize};

/// 自动调度相关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 自动调度总开关
    pub auto_schedule_enabled: bool,
    /// 每个项目每轮最多启动的爬虫数
    pub max_spiders_start_at_once: usize,
    /// 默认并发控制值，同时作为无历史时的负载估计
    pub default_autothrottle_max_concurrency: f64,
    /// 每个项目允许的最大负载
    pub max_load_allowed: f64,
    pub min_load_ratio_multiplier: f64,
    pub max_load_ratio_multiplier: f64,
    /// 名称包含该标记的爬虫每周只运行一次
    pub weekly_spider_marker: String,
    pub dispatch_interval_seconds: u64,
    pub reconcile_interval_seconds: u64,
    pub sync_job_status_interval_seconds: u64,
    pub sync_spiders_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_schedule_enabled: true,
            max_spiders_start_at_once: 5,
            default_autothrottle_max_concurrency: 4.0,
            max_load_allowed: 20.0,
            min_load_ratio_multiplier: 0.5,
            max_load_ratio_multiplier: 10.0,
            weekly_spider_marker: "sellers.".to_string(),
            dispatch_interval_seconds: 60,
            reconcile_interval_seconds: 10,
            sync_job_status_interval_seconds: 5,
            sync_spiders_interval_seconds: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_spiders_start_at_once == 0 {
            return Err(anyhow::anyhow!("每轮最大启动爬虫数必须大于0"));
        }

        let numbers = [
            ("默认并发控制值", self.default_autothrottle_max_concurrency),
            ("最大负载", self.max_load_allowed),
            ("负载比例下限", self.min_load_ratio_multiplier),
            ("负载比例上限", self.max_load_ratio_multiplier),
        ];
        for (name, value) in numbers {
            if !value.is_finite() {
                return Err(anyhow::anyhow!("{name}必须是有限数值: {value}"));
            }
        }

        if self.default_autothrottle_max_concurrency <= 0.0 {
            return Err(anyhow::anyhow!("默认并发控制值必须大于0"));
        }

        if self.max_load_allowed <= 0.0 {
            return Err(anyhow::anyhow!("最大负载必须大于0"));
        }

        if self.min_load_ratio_multiplier <= 0.0 {
            return Err(anyhow::anyhow!("负载比例下限必须大于0"));
        }

        if self.min_load_ratio_multiplier > self.max_load_ratio_multiplier {
            return Err(anyhow::anyhow!(
                "负载比例下限 {} 不能大于上限 {}",
                self.min_load_ratio_multiplier,
                self.max_load_ratio_multiplier
            ));
        }

        let intervals = [
            ("调度间隔", self.dispatch_interval_seconds),
            ("对账间隔", self.reconcile_interval_seconds),
            ("任务状态同步间隔", self.sync_job_status_interval_seconds),
            ("爬虫同步间隔", self.sync_spiders_interval_seconds),
        ];
        for (name, seconds) in intervals {
            if seconds == 0 {
                return Err(anyhow::anyhow!("{name}必须大于0"));
            }
        }

        Ok(())
    }
}
