use crate::KeeperResult;
use async_trait::async_trait;

/// 集群空闲内存检查
#[async_trait]
pub trait MemoryGauge: Send + Sync {
    async fn has_enough_free_memory(&self) -> KeeperResult<bool>;
}
