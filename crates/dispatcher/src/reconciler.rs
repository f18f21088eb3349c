use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use keeper_core::{
    models::JobInstance,
    traits::{JobInstanceRepository, TriggerHandler, TriggerOptions, TriggerRegistry, TriggerSpec},
    KeeperResult,
};
use keeper_infrastructure::{MetricsCollector, StructuredLogger};
use tracing::{debug, info, warn};

use crate::trigger_id::{is_spider_job_trigger, trigger_id};

/// 一次对账的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failed.is_empty()
    }
}

/// 让定时触发器与持久化的周期任务模板保持一致
///
/// 触发器ID由模板ID和修改时间决定，模板被编辑后旧ID失效：
/// 只需要注册缺失的ID、移除多余的ID，不存在原地更新。
pub struct PeriodicJobReconciler {
    job_instance_repo: Arc<dyn JobInstanceRepository>,
    registry: Arc<dyn TriggerRegistry>,
    handler: Arc<dyn TriggerHandler>,
    options: TriggerOptions,
    metrics: Arc<MetricsCollector>,
}

impl PeriodicJobReconciler {
    pub fn new(
        job_instance_repo: Arc<dyn JobInstanceRepository>,
        registry: Arc<dyn TriggerRegistry>,
        handler: Arc<dyn TriggerHandler>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            job_instance_repo,
            registry,
            handler,
            options: TriggerOptions::default(),
            metrics,
        }
    }

    pub fn with_options(mut self, options: TriggerOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn reconcile(&self) -> KeeperResult<ReconcileReport> {
        let started = Instant::now();
        let registered: HashSet<String> =
            self.registry.list_registered_ids().await?.into_iter().collect();

        let targets: BTreeMap<String, JobInstance> = self
            .job_instance_repo
            .list_active_periodic()
            .await?
            .into_iter()
            .filter(JobInstance::is_active_periodic)
            .map(|job| (trigger_id(&job), job))
            .collect();

        let mut report = ReconcileReport::default();

        for (id, job) in &targets {
            if registered.contains(id) {
                continue;
            }

            let spec = TriggerSpec {
                id: id.clone(),
                job_instance_id: job.id,
                cron: job.cron.clone(),
                options: self.options,
            };
            match self.registry.register(spec, self.handler.clone()).await {
                Ok(()) => {
                    StructuredLogger::log_trigger_registered(
                        id,
                        job.id,
                        &job.cron.to_cron_expression(),
                    );
                    report.added.push(id.clone());
                }
                Err(e) => {
                    warn!("注册周期任务 {} ({}) 失败: {}", job.id, job.spider_name, e);
                    report.failed.push(id.clone());
                }
            }
        }

        let mut stale: Vec<&String> = registered
            .iter()
            .filter(|id| is_spider_job_trigger(id) && !targets.contains_key(*id))
            .collect();
        stale.sort();

        for id in stale {
            match self.registry.deregister(id).await {
                Ok(()) => {
                    StructuredLogger::log_trigger_removed(id);
                    report.removed.push(id.clone());
                }
                Err(e) => {
                    warn!("移除触发器 {} 失败: {}", id, e);
                    report.failed.push(id.clone());
                }
            }
        }

        self.metrics.record_reconcile(
            report.added.len(),
            report.removed.len(),
            report.failed.len(),
            started.elapsed().as_secs_f64(),
        );

        if report.is_noop() {
            debug!("周期任务触发器无变化，共 {} 个", targets.len());
        } else {
            info!(
                "周期任务对账完成: 新增 {}，移除 {}，失败 {}",
                report.added.len(),
                report.removed.len(),
                report.failed.len()
            );
        }
        Ok(report)
    }
}
