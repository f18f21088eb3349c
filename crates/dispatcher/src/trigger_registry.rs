use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;
use keeper_core::{
    traits::{TriggerHandler, TriggerRegistry, TriggerSpec},
    KeeperError, KeeperResult,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cron_utils::CronScheduler;

/// 进程内的定时触发器注册表
///
/// 每个触发器一个 tokio 任务，按本地时区计算触发时间。
#[derive(Default)]
pub struct CronTriggerRegistry {
    triggers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl CronTriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 停止所有触发器
    pub fn shutdown(&self) {
        let mut triggers = self.lock();
        for (id, handle) in triggers.drain() {
            debug!("停止触发器 {}", id);
            handle.abort();
        }
        info!("定时触发器已全部停止");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.triggers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TriggerRegistry for CronTriggerRegistry {
    async fn list_registered_ids(&self) -> KeeperResult<Vec<String>> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn register(
        &self,
        spec: TriggerSpec,
        handler: Arc<dyn TriggerHandler>,
    ) -> KeeperResult<()> {
        let schedule = CronScheduler::from_fields(&spec.cron)?;

        let mut triggers = self.lock();
        if triggers.contains_key(&spec.id) {
            return Err(KeeperError::Trigger(format!("触发器已存在: {}", spec.id)));
        }

        let id = spec.id.clone();
        let handle = tokio::spawn(run_trigger(spec, schedule, handler));
        triggers.insert(id, handle);
        Ok(())
    }

    async fn deregister(&self, id: &str) -> KeeperResult<()> {
        match self.lock().remove(id) {
            Some(handle) => handle.abort(),
            None => debug!("触发器 {} 不存在，无需移除", id),
        }
        Ok(())
    }
}

async fn run_trigger(spec: TriggerSpec, schedule: CronScheduler, handler: Arc<dyn TriggerHandler>) {
    let instances = Arc::new(Semaphore::new(spec.options.max_instances));
    let mut last_checked = Local::now();

    loop {
        let Some(next) = schedule.next_execution_time(&last_checked) else {
            warn!("触发器 {} 没有后续触发时间，停止", spec.id);
            return;
        };

        let wait = (next - Local::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let now = Local::now();
        let due = schedule.due_fire_times(&last_checked, &now, &spec.options);
        last_checked = now;

        if due.misfired > 0 {
            warn!(
                "触发器 {} 错过 {} 次触发，超出宽限期已丢弃",
                spec.id, due.misfired
            );
        }
        if due.coalesced > 0 {
            debug!("触发器 {} 合并了 {} 次错过的触发", spec.id, due.coalesced);
        }

        for fire_time in due.fires {
            let permit = match instances.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(
                        "触发器 {} 运行中的实例已达上限 {}，跳过 {} 的触发",
                        spec.id, spec.options.max_instances, fire_time
                    );
                    continue;
                }
            };

            let handler = handler.clone();
            let job_instance_id = spec.job_instance_id;
            tokio::spawn(async move {
                handler.run_job(job_instance_id).await;
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::models::CronFields;
    use keeper_core::traits::TriggerOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl TriggerHandler for CountingHandler {
        async fn run_job(&self, _job_instance_id: i64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spec(id: &str, cron: CronFields) -> TriggerSpec {
        TriggerSpec {
            id: id.to_string(),
            job_instance_id: 1,
            cron,
            options: TriggerOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_register_and_deregister() {
        let registry = CronTriggerRegistry::new();
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));

        registry
            .register(spec("spider_job_1:100", CronFields::default()), handler.clone())
            .await
            .unwrap();
        registry
            .register(spec("spider_job_2:100", CronFields::new("*/5", "*", "*", "mon-fri", "*")), handler.clone())
            .await
            .unwrap();

        assert_eq!(
            registry.list_registered_ids().await.unwrap(),
            vec!["spider_job_1:100".to_string(), "spider_job_2:100".to_string()]
        );

        registry.deregister("spider_job_1:100").await.unwrap();
        registry.deregister("spider_job_missing:1").await.unwrap();
        assert_eq!(registry.len(), 1);

        registry.shutdown();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_registrations_fail() {
        let registry = CronTriggerRegistry::new();
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));

        registry
            .register(spec("spider_job_1:100", CronFields::default()), handler.clone())
            .await
            .unwrap();
        let duplicate = registry
            .register(spec("spider_job_1:100", CronFields::default()), handler.clone())
            .await;
        assert!(matches!(duplicate, Err(KeeperError::Trigger(_))));

        let invalid = registry
            .register(spec("spider_job_3:100", CronFields::new("61", "*", "*", "*", "*")), handler)
            .await;
        assert!(matches!(invalid, Err(KeeperError::InvalidCron { .. })));
        assert_eq!(registry.len(), 1);

        registry.shutdown();
    }
}
