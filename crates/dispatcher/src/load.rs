use std::sync::Arc;

use keeper_core::{traits::JobExecutionRepository, KeeperResult};
use tracing::debug;

/// 项目当前负载：所有运行中执行记录的并发控制值之和
pub struct LoadAccountant {
    execution_repo: Arc<dyn JobExecutionRepository>,
}

impl LoadAccountant {
    pub fn new(execution_repo: Arc<dyn JobExecutionRepository>) -> Self {
        Self { execution_repo }
    }

    pub async fn current_load(&self, project_id: i64) -> KeeperResult<f64> {
        let running = self.execution_repo.list_running(project_id).await?;
        let load: f64 = running
            .iter()
            .filter_map(|execution| execution.throttle_concurrency)
            .sum();

        debug!(
            "项目 {} 当前负载 {:.1}（{} 个运行中任务）",
            project_id,
            load,
            running.len()
        );
        Ok(load)
    }
}
