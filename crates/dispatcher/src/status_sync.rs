use std::sync::Arc;

use keeper_core::{
    models::Project,
    traits::{ExecutionAgent, JobExecutionRepository, ProjectRepository, SpiderRepository},
    KeeperResult,
};
use keeper_infrastructure::MetricsCollector;
use tracing::{debug, info, warn};

/// 一次同步的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub projects: usize,
    /// 状态发生变化的执行记录数
    pub updated: usize,
    /// 执行代理上报了、本地没有记录的任务数
    pub unknown: usize,
    pub spiders_added: usize,
    pub failed_projects: usize,
}

/// 从执行代理拉取爬虫清单与任务状态，刷新本地记录
///
/// 只追加爬虫、只前移执行状态；从不启动任务，也从不删除记录。
pub struct StatusSynchronizer {
    project_repo: Arc<dyn ProjectRepository>,
    spider_repo: Arc<dyn SpiderRepository>,
    execution_repo: Arc<dyn JobExecutionRepository>,
    agent: Arc<dyn ExecutionAgent>,
    metrics: Arc<MetricsCollector>,
}

impl StatusSynchronizer {
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        spider_repo: Arc<dyn SpiderRepository>,
        execution_repo: Arc<dyn JobExecutionRepository>,
        agent: Arc<dyn ExecutionAgent>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            project_repo,
            spider_repo,
            execution_repo,
            agent,
            metrics,
        }
    }

    pub async fn sync_job_status(&self) -> KeeperResult<SyncReport> {
        let mut report = SyncReport::default();

        for project in self.project_repo.list_all().await? {
            report.projects += 1;
            if let Err(e) = self.sync_project_jobs(&project, &mut report).await {
                report.failed_projects += 1;
                warn!("同步项目 {} 的任务状态失败: {}", project.name, e);
            }
        }

        self.metrics.record_status_updates(report.updated);
        if report.updated > 0 {
            info!("更新了 {} 条执行记录的状态", report.updated);
        }
        Ok(report)
    }

    pub async fn sync_spiders(&self) -> KeeperResult<SyncReport> {
        let mut report = SyncReport::default();

        for project in self.project_repo.list_all().await? {
            report.projects += 1;
            let names = match self.agent.get_spider_list(&project).await {
                Ok(names) => names,
                Err(e) => {
                    report.failed_projects += 1;
                    warn!("获取项目 {} 的爬虫列表失败: {}", project.name, e);
                    continue;
                }
            };

            match self.spider_repo.add_spiders(project.id, &names).await {
                Ok(added) => report.spiders_added += added.len(),
                Err(e) => {
                    report.failed_projects += 1;
                    warn!("保存项目 {} 的爬虫失败: {}", project.name, e);
                }
            }
        }

        Ok(report)
    }

    async fn sync_project_jobs(&self, project: &Project, report: &mut SyncReport) -> KeeperResult<()> {
        let snapshots = self.agent.get_job_status(project).await?;

        for snapshot in &snapshots {
            let existing = self
                .execution_repo
                .find_by_service_id(project.id, &snapshot.service_job_execution_id)
                .await?;

            let Some(mut execution) = existing else {
                report.unknown += 1;
                continue;
            };

            if execution.apply_snapshot(snapshot) {
                self.execution_repo.update_status(&execution).await?;
                report.updated += 1;
                debug!(
                    "执行记录 {} ({}) -> {}",
                    execution.id,
                    execution.spider_name,
                    execution.running_status.as_str()
                );
            }
        }
        Ok(())
    }
}
