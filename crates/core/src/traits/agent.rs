use crate::models::{AgentJobSnapshot, AgentLaunch, JobInstance, Project};
use crate::KeeperResult;
use async_trait::async_trait;

/// 执行代理接口
///
/// 执行代理负责在远端节点上真正启动爬虫并报告其状态，调用超时由实现自行处理。
#[async_trait]
pub trait ExecutionAgent: Send + Sync {
    /// 请求启动任务实例，返回代理侧的任务ID
    async fn start_spider(
        &self,
        project: &Project,
        job_instance: &JobInstance,
    ) -> KeeperResult<AgentLaunch>;

    /// 项目中可运行的爬虫名称列表
    async fn get_spider_list(&self, project: &Project) -> KeeperResult<Vec<String>>;

    /// 项目中所有任务的当前状态快照
    async fn get_job_status(&self, project: &Project) -> KeeperResult<Vec<AgentJobSnapshot>>;
}
