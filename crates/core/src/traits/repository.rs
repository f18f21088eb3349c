//! 数据仓储层接口定义
//!
//! 此模块定义了调度核心读写的持久化抽象接口：
//! - 项目仓储接口 (ProjectRepository)
//! - 爬虫仓储接口 (SpiderRepository)
//! - 任务实例仓储接口 (JobInstanceRepository)
//! - 任务执行记录仓储接口 (JobExecutionRepository)
//!
//! ## 写入边界
//!
//! 只有两条路径会写入存储，二者写入的字段互不重叠：
//! - 启动路径：新增 `JobInstance` 与 `JobExecution` 记录
//! - 状态同步：更新已有 `JobExecution` 的状态字段，新增爬虫记录
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use keeper_core::traits::JobExecutionRepository;
//!
//! async fn current_load(repo: &dyn JobExecutionRepository, project_id: i64) -> KeeperResult<f64> {
//!     let running = repo.list_running(project_id).await?;
//!     Ok(running.iter().filter_map(|e| e.throttle_concurrency).sum())
//! }
//! ```

use crate::models::{
    JobExecution, JobInstance, Project, SpiderInstance, SpiderLastRun, SpiderSetup, SpiderStatus,
};
use crate::KeeperResult;
use async_trait::async_trait;

/// 项目仓储接口
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> KeeperResult<Project>;

    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<Project>>;

    async fn list_all(&self) -> KeeperResult<Vec<Project>>;
}

/// 爬虫仓储接口
#[async_trait]
pub trait SpiderRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<SpiderInstance>>;

    async fn find_by_name(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Option<SpiderInstance>>;

    async fn list_by_project(&self, project_id: i64) -> KeeperResult<Vec<SpiderInstance>>;

    /// 按最近一次执行的开始时间升序列出项目中的爬虫
    ///
    /// 从未运行过的爬虫排在最前面；无论最近一次执行是否已结束都会列出，
    /// 运行中的爬虫不会被遗漏。
    async fn list_by_last_run(&self, project_id: i64) -> KeeperResult<Vec<SpiderLastRun>>;

    /// 追加新发现的爬虫并为其创建默认调度设置，已存在的名称被忽略
    ///
    /// 返回本次新增的爬虫。
    async fn add_spiders(
        &self,
        project_id: i64,
        spider_names: &[String],
    ) -> KeeperResult<Vec<SpiderInstance>>;

    async fn get_setup(&self, spider_instance_id: i64) -> KeeperResult<Option<SpiderSetup>>;

    async fn save_setup(&self, setup: &SpiderSetup) -> KeeperResult<()>;
}

/// 任务实例仓储接口
#[async_trait]
pub trait JobInstanceRepository: Send + Sync {
    /// 在事务中持久化任务实例，失败时回滚并返回错误
    async fn create(&self, job_instance: &JobInstance) -> KeeperResult<JobInstance>;

    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<JobInstance>>;

    /// 所有 `run_type = periodic` 且 `enabled = 0` 的模板
    async fn list_active_periodic(&self) -> KeeperResult<Vec<JobInstance>>;
}

/// 任务执行记录仓储接口
#[async_trait]
pub trait JobExecutionRepository: Send + Sync {
    async fn create(&self, execution: &JobExecution) -> KeeperResult<JobExecution>;

    /// 项目中所有 RUNNING 状态的执行记录
    async fn list_running(&self, project_id: i64) -> KeeperResult<Vec<JobExecution>>;

    /// 项目中指定爬虫、指定状态的执行记录
    async fn list_by_spider_and_status(
        &self,
        project_id: i64,
        spider_name: &str,
        status: SpiderStatus,
    ) -> KeeperResult<Vec<JobExecution>>;

    /// 爬虫已成功结束且具有完整起止时间的执行记录，按开始时间升序
    async fn list_finished_for_spider(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Vec<JobExecution>>;

    /// 爬虫最近一次执行记录
    async fn get_last_for_spider(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Option<JobExecution>>;

    async fn find_by_service_id(
        &self,
        project_id: i64,
        service_job_execution_id: &str,
    ) -> KeeperResult<Option<JobExecution>>;

    /// 仅更新状态相关字段：状态、起止时间、请求数、运行节点
    async fn update_status(&self, execution: &JobExecution) -> KeeperResult<()>;
}
