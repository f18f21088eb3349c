use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::models::CronFields;
use crate::KeeperResult;

/// 定时触发器的执行选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOptions {
    /// 错过触发时间后仍允许补执行的宽限期
    pub misfire_grace: Duration,
    /// 同一触发器允许同时运行的最大实例数
    pub max_instances: usize,
    /// 多次错过的触发合并为一次补执行
    pub coalesce: bool,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            misfire_grace: Duration::from_secs(60 * 60),
            max_instances: 999,
            coalesce: true,
        }
    }
}

/// 注册到定时器的周期任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    pub id: String,
    pub job_instance_id: i64,
    pub cron: CronFields,
    pub options: TriggerOptions,
}

/// 触发器到期时调用的处理器
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn run_job(&self, job_instance_id: i64);
}

/// 定时触发器注册表
///
/// 注册表是进程级共享状态，这里只暴露对账需要的最小接口。
#[async_trait]
pub trait TriggerRegistry: Send + Sync {
    async fn list_registered_ids(&self) -> KeeperResult<Vec<String>>;

    /// 注册触发器；CRON字段无效时返回 `KeeperError::InvalidCron`
    async fn register(
        &self,
        spec: TriggerSpec,
        handler: Arc<dyn TriggerHandler>,
    ) -> KeeperResult<()>;

    async fn deregister(&self, id: &str) -> KeeperResult<()>;
}
