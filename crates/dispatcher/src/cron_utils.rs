use chrono::{DateTime, TimeZone};
use cron::Schedule;
use std::str::FromStr;

use keeper_core::models::CronFields;
use keeper_core::traits::TriggerOptions;
use keeper_core::{KeeperError, KeeperResult};

/// CRON表达式解析和调度工具
pub struct CronScheduler {
    schedule: Schedule,
}

/// 一次唤醒后需要执行的触发时间
#[derive(Debug, Clone)]
pub struct DueFires<Tz: TimeZone> {
    pub fires: Vec<DateTime<Tz>>,
    /// 超出宽限期被丢弃的触发次数
    pub misfired: usize,
    /// 因合并而省略的触发次数
    pub coalesced: usize,
}

impl CronScheduler {
    /// 创建新的CRON调度器，表达式包含秒字段
    pub fn new(cron_expr: &str) -> KeeperResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| KeeperError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 由任务模板的CRON字段创建，秒固定为0
    pub fn from_fields(fields: &CronFields) -> KeeperResult<Self> {
        Self::new(&fields.to_cron_expression())
    }

    /// 获取下一次执行时间
    pub fn next_execution_time<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times<Tz: TimeZone>(&self, from: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        self.schedule.after(from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> KeeperResult<()> {
        Self::new(cron_expr).map(|_| ())
    }

    /// 计算 `(last_checked, now]` 区间内到期的触发
    ///
    /// 早于 `now - misfire_grace` 的触发被丢弃；开启合并时只保留最后一次。
    pub fn due_fire_times<Tz: TimeZone>(
        &self,
        last_checked: &DateTime<Tz>,
        now: &DateTime<Tz>,
        options: &TriggerOptions,
    ) -> DueFires<Tz> {
        let grace = chrono::Duration::from_std(options.misfire_grace)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let oldest_allowed = now.clone() - grace;

        let mut misfired = 0;
        let mut fires = Vec::new();
        for fire_time in self.schedule.after(last_checked) {
            if &fire_time > now {
                break;
            }
            if fire_time < oldest_allowed {
                misfired += 1;
            } else {
                fires.push(fire_time);
            }
        }

        let mut coalesced = 0;
        if options.coalesce && fires.len() > 1 {
            coalesced = fires.len() - 1;
            fires.drain(..coalesced);
        }

        DueFires {
            fires,
            misfired,
            coalesced,
        }
    }
}
