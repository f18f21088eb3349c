use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpiderInstance {
    pub id: i64,
    pub project_id: i64,
    pub spider_name: String,
    pub date_created: DateTime<Utc>,
}

impl SpiderInstance {
    pub fn new(project_id: i64, spider_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            project_id,
            spider_name: spider_name.into(),
            date_created: Utc::now(),
        }
    }

    /// 名称中包含周任务标记的爬虫每周只运行一次
    pub fn is_weekly(&self, weekly_marker: &str) -> bool {
        !weekly_marker.is_empty() && self.spider_name.contains(weekly_marker)
    }
}

/// 爬虫的人工调度设置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpiderSetup {
    pub spider_instance_id: i64,
    pub auto_schedule: bool,
}

impl SpiderSetup {
    pub fn new(spider_instance_id: i64) -> Self {
        Self {
            spider_instance_id,
            auto_schedule: true,
        }
    }

    /// 没有设置记录时视为允许自动调度
    pub fn allows_auto_schedule(setup: Option<&SpiderSetup>) -> bool {
        setup.map(|s| s.auto_schedule).unwrap_or(true)
    }
}

/// 按最近一次执行时间排序的爬虫列表项
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpiderLastRun {
    pub spider_id: i64,
    pub spider_name: String,
    /// 从未运行过的爬虫为 None
    pub last_start_time: Option<DateTime<Utc>>,
}
