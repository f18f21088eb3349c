//! 仓储与外部协作方的内存实现
//!
//! 四个仓储接口共用一份状态，这样按最近执行时间排序、按爬虫名称关联执行记录等
//! 跨表查询才能和 SQLite 实现保持一致。

use async_trait::async_trait;
use keeper_core::models::{
    AgentJobSnapshot, AgentLaunch, JobExecution, JobInstance, Project, SpiderInstance,
    SpiderLastRun, SpiderSetup, SpiderStatus,
};
use keeper_core::traits::{
    ExecutionAgent, JobExecutionRepository, JobInstanceRepository, MemoryGauge,
    ProjectRepository, SpiderRepository, TriggerHandler, TriggerRegistry, TriggerSpec,
};
use keeper_core::{KeeperError, KeeperResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct StoreState {
    projects: BTreeMap<i64, Project>,
    spiders: BTreeMap<i64, SpiderInstance>,
    setups: HashMap<i64, SpiderSetup>,
    job_instances: BTreeMap<i64, JobInstance>,
    executions: BTreeMap<i64, JobExecution>,
    next_id: i64,
    fail_job_instance_create: bool,
    failing_history: HashSet<String>,
}

impl StoreState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// 带出所属任务实例的只读字段
    fn joined(&self, execution: &JobExecution) -> JobExecution {
        let mut joined = execution.clone();
        if let Some(instance) = self.job_instances.get(&execution.job_instance_id) {
            joined.spider_name = instance.spider_name.clone();
            joined.throttle_concurrency = instance.throttle_concurrency;
        }
        joined
    }

    fn executions_for(&self, project_id: i64, spider_name: &str) -> Vec<JobExecution> {
        self.executions
            .values()
            .map(|e| self.joined(e))
            .filter(|e| e.project_id == project_id && e.spider_name == spider_name)
            .collect()
    }
}

/// 内存存储，实现全部仓储接口
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&self, name: &str) -> Project {
        let mut state = self.state.lock().unwrap();
        let mut project = Project::new(name);
        project.id = state.allocate_id();
        state.projects.insert(project.id, project.clone());
        project
    }

    /// 添加爬虫并创建默认调度设置
    pub fn add_spider(&self, project_id: i64, name: &str) -> SpiderInstance {
        let mut state = self.state.lock().unwrap();
        let mut spider = SpiderInstance::new(project_id, name);
        spider.id = state.allocate_id();
        state.spiders.insert(spider.id, spider.clone());
        state.setups.insert(spider.id, SpiderSetup::new(spider.id));
        spider
    }

    /// 添加没有调度设置记录的爬虫
    pub fn add_spider_without_setup(&self, project_id: i64, name: &str) -> SpiderInstance {
        let spider = self.add_spider(project_id, name);
        self.state.lock().unwrap().setups.remove(&spider.id);
        spider
    }

    pub fn set_auto_schedule(&self, spider_id: i64, auto_schedule: bool) {
        self.state.lock().unwrap().setups.insert(
            spider_id,
            SpiderSetup {
                spider_instance_id: spider_id,
                auto_schedule,
            },
        );
    }

    /// 直接写入任务实例，id 为 0 时自动分配
    pub fn insert_job_instance(&self, instance: JobInstance) -> JobInstance {
        let mut state = self.state.lock().unwrap();
        let mut instance = instance;
        if instance.id == 0 {
            instance.id = state.allocate_id();
        }
        state.job_instances.insert(instance.id, instance.clone());
        instance
    }

    /// 直接写入执行记录，id 为 0 时自动分配
    pub fn insert_execution(&self, execution: JobExecution) -> JobExecution {
        let mut state = self.state.lock().unwrap();
        let mut execution = execution;
        if execution.id == 0 {
            execution.id = state.allocate_id();
        }
        state.executions.insert(execution.id, execution.clone());
        state.joined(&execution)
    }

    /// 为爬虫写入一条指定状态的执行记录，同时创建所属的一次性任务实例
    pub fn record_run(
        &self,
        project_id: i64,
        spider_name: &str,
        throttle: Option<f64>,
        configure: impl FnOnce(&mut JobExecution),
    ) -> JobExecution {
        let mut instance = JobInstance::one_time(project_id, spider_name);
        if let Some(throttle) = throttle {
            instance.apply_throttle(throttle);
        }
        let instance = self.insert_job_instance(instance);

        let service_id = format!("svc-{}", instance.id);
        let mut execution = JobExecution::pending(&instance, service_id, None);
        configure(&mut execution);
        self.insert_execution(execution)
    }

    pub fn set_fail_job_instance_create(&self, fail: bool) {
        self.state.lock().unwrap().fail_job_instance_create = fail;
    }

    /// 读取该爬虫的历史执行记录时返回数据库错误
    pub fn fail_history_for(&self, spider_name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_history
            .insert(spider_name.to_string());
    }

    pub fn projects(&self) -> Vec<Project> {
        self.state.lock().unwrap().projects.values().cloned().collect()
    }

    pub fn spiders(&self) -> Vec<SpiderInstance> {
        self.state.lock().unwrap().spiders.values().cloned().collect()
    }

    pub fn job_instances(&self) -> Vec<JobInstance> {
        self.state
            .lock()
            .unwrap()
            .job_instances
            .values()
            .cloned()
            .collect()
    }

    pub fn executions(&self) -> Vec<JobExecution> {
        let state = self.state.lock().unwrap();
        state.executions.values().map(|e| state.joined(e)).collect()
    }

    pub fn update_job_instance(&self, instance: JobInstance) {
        self.state
            .lock()
            .unwrap()
            .job_instances
            .insert(instance.id, instance);
    }
}

#[async_trait]
impl ProjectRepository for MockStore {
    async fn create(&self, project: &Project) -> KeeperResult<Project> {
        let mut state = self.state.lock().unwrap();
        let mut created = project.clone();
        created.id = state.allocate_id();
        state.projects.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<Project>> {
        Ok(self.state.lock().unwrap().projects.get(&id).cloned())
    }

    async fn list_all(&self) -> KeeperResult<Vec<Project>> {
        Ok(self.projects())
    }
}

#[async_trait]
impl SpiderRepository for MockStore {
    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<SpiderInstance>> {
        Ok(self.state.lock().unwrap().spiders.get(&id).cloned())
    }

    async fn find_by_name(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Option<SpiderInstance>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .spiders
            .values()
            .find(|s| s.project_id == project_id && s.spider_name == spider_name)
            .cloned())
    }

    async fn list_by_project(&self, project_id: i64) -> KeeperResult<Vec<SpiderInstance>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .spiders
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn list_by_last_run(&self, project_id: i64) -> KeeperResult<Vec<SpiderLastRun>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<SpiderLastRun> = state
            .spiders
            .values()
            .filter(|s| s.project_id == project_id)
            .map(|s| SpiderLastRun {
                spider_id: s.id,
                spider_name: s.spider_name.clone(),
                last_start_time: state
                    .executions_for(project_id, &s.spider_name)
                    .iter()
                    .filter_map(|e| e.start_time)
                    .max(),
            })
            .collect();

        rows.sort_by(|a, b| {
            a.last_start_time
                .cmp(&b.last_start_time)
                .then(a.spider_id.cmp(&b.spider_id))
        });
        Ok(rows)
    }

    async fn add_spiders(
        &self,
        project_id: i64,
        spider_names: &[String],
    ) -> KeeperResult<Vec<SpiderInstance>> {
        let mut added = Vec::new();
        for name in spider_names {
            let exists = self
                .state
                .lock()
                .unwrap()
                .spiders
                .values()
                .any(|s| s.project_id == project_id && &s.spider_name == name);
            if !exists {
                added.push(self.add_spider(project_id, name));
            }
        }
        Ok(added)
    }

    async fn get_setup(&self, spider_instance_id: i64) -> KeeperResult<Option<SpiderSetup>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .setups
            .get(&spider_instance_id)
            .cloned())
    }

    async fn save_setup(&self, setup: &SpiderSetup) -> KeeperResult<()> {
        self.set_auto_schedule(setup.spider_instance_id, setup.auto_schedule);
        Ok(())
    }
}

#[async_trait]
impl JobInstanceRepository for MockStore {
    async fn create(&self, job_instance: &JobInstance) -> KeeperResult<JobInstance> {
        if self.state.lock().unwrap().fail_job_instance_create {
            return Err(KeeperError::DatabaseOperation(
                "模拟的任务实例写入失败".to_string(),
            ));
        }
        let mut instance = job_instance.clone();
        instance.id = 0;
        Ok(self.insert_job_instance(instance))
    }

    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<JobInstance>> {
        Ok(self.state.lock().unwrap().job_instances.get(&id).cloned())
    }

    async fn list_active_periodic(&self) -> KeeperResult<Vec<JobInstance>> {
        Ok(self
            .job_instances()
            .into_iter()
            .filter(|j| j.is_active_periodic())
            .collect())
    }
}

#[async_trait]
impl JobExecutionRepository for MockStore {
    async fn create(&self, execution: &JobExecution) -> KeeperResult<JobExecution> {
        let mut execution = execution.clone();
        execution.id = 0;
        Ok(self.insert_execution(execution))
    }

    async fn list_running(&self, project_id: i64) -> KeeperResult<Vec<JobExecution>> {
        Ok(self
            .executions()
            .into_iter()
            .filter(|e| e.project_id == project_id && e.is_running())
            .collect())
    }

    async fn list_by_spider_and_status(
        &self,
        project_id: i64,
        spider_name: &str,
        status: SpiderStatus,
    ) -> KeeperResult<Vec<JobExecution>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .executions_for(project_id, spider_name)
            .into_iter()
            .filter(|e| e.running_status == status)
            .collect())
    }

    async fn list_finished_for_spider(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Vec<JobExecution>> {
        let state = self.state.lock().unwrap();
        if state.failing_history.contains(spider_name) {
            return Err(KeeperError::DatabaseOperation(format!(
                "模拟的历史记录读取失败: {spider_name}"
            )));
        }

        let mut finished: Vec<JobExecution> = state
            .executions_for(project_id, spider_name)
            .into_iter()
            .filter(|e| e.is_finished() && e.start_time.is_some() && e.end_time.is_some())
            .collect();
        finished.sort_by_key(|e| (e.start_time, e.id));
        Ok(finished)
    }

    async fn get_last_for_spider(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Option<JobExecution>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .executions_for(project_id, spider_name)
            .into_iter()
            .max_by_key(|e| (e.last_activity_time(), e.id)))
    }

    async fn find_by_service_id(
        &self,
        project_id: i64,
        service_job_execution_id: &str,
    ) -> KeeperResult<Option<JobExecution>> {
        Ok(self.executions().into_iter().find(|e| {
            e.project_id == project_id && e.service_job_execution_id == service_job_execution_id
        }))
    }

    async fn update_status(&self, execution: &JobExecution) -> KeeperResult<()> {
        let mut state = self.state.lock().unwrap();
        let stored = state.executions.get_mut(&execution.id).ok_or_else(|| {
            KeeperError::DatabaseOperation(format!("执行记录不存在: {}", execution.id))
        })?;
        stored.running_status = execution.running_status;
        stored.start_time = execution.start_time;
        stored.end_time = execution.end_time;
        stored.requests_count = execution.requests_count;
        stored.running_on = execution.running_on.clone();
        Ok(())
    }
}

/// 执行代理的测试替身
#[derive(Default)]
pub struct MockExecutionAgent {
    started: Mutex<Vec<(String, JobInstance)>>,
    spiders: Mutex<HashMap<String, Vec<String>>>,
    job_status: Mutex<HashMap<String, Vec<AgentJobSnapshot>>>,
    fail_start: AtomicBool,
    fail_listing: AtomicBool,
    job_counter: AtomicUsize,
}

impl MockExecutionAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_spiders(&self, project: &str, spiders: &[&str]) {
        self.spiders.lock().unwrap().insert(
            project.to_string(),
            spiders.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn set_job_status(&self, project: &str, snapshots: Vec<AgentJobSnapshot>) {
        self.job_status
            .lock()
            .unwrap()
            .insert(project.to_string(), snapshots);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// 已请求启动的任务实例，按调用顺序
    pub fn started_jobs(&self) -> Vec<JobInstance> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(_, job)| job.clone())
            .collect()
    }

    pub fn start_count(&self) -> usize {
        self.started.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutionAgent for MockExecutionAgent {
    async fn start_spider(
        &self,
        project: &Project,
        job_instance: &JobInstance,
    ) -> KeeperResult<AgentLaunch> {
        self.started
            .lock()
            .unwrap()
            .push((project.name.clone(), job_instance.clone()));

        if self.fail_start.load(Ordering::SeqCst) {
            return Err(KeeperError::Agent("模拟的启动失败".to_string()));
        }

        let n = self.job_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AgentLaunch {
            service_job_execution_id: format!("job-{n}"),
            running_on: Some("http://localhost:6800".to_string()),
        })
    }

    async fn get_spider_list(&self, project: &Project) -> KeeperResult<Vec<String>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(KeeperError::Network("模拟的网络错误".to_string()));
        }
        Ok(self
            .spiders
            .lock()
            .unwrap()
            .get(&project.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_job_status(&self, project: &Project) -> KeeperResult<Vec<AgentJobSnapshot>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(KeeperError::Network("模拟的网络错误".to_string()));
        }
        Ok(self
            .job_status
            .lock()
            .unwrap()
            .get(&project.name)
            .cloned()
            .unwrap_or_default())
    }
}

struct RegisteredEntry {
    spec: Option<TriggerSpec>,
    handler: Option<Arc<dyn TriggerHandler>>,
}

/// 定时触发器注册表的内存实现，注册时用 `cron` 校验表达式
#[derive(Default)]
pub struct MockTriggerRegistry {
    entries: Mutex<BTreeMap<String, RegisteredEntry>>,
    register_calls: AtomicUsize,
    deregister_calls: AtomicUsize,
}

impl MockTriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入不属于爬虫任务命名空间的触发器
    pub fn insert_foreign(&self, id: &str) {
        self.entries.lock().unwrap().insert(
            id.to_string(),
            RegisteredEntry {
                spec: None,
                handler: None,
            },
        );
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    pub fn spec(&self, id: &str) -> Option<TriggerSpec> {
        self.entries
            .lock()
            .unwrap()
            .get(id)
            .and_then(|e| e.spec.clone())
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn deregister_calls(&self) -> usize {
        self.deregister_calls.load(Ordering::SeqCst)
    }

    /// 模拟触发器到期
    pub async fn fire(&self, id: &str) -> bool {
        let target = {
            let entries = self.entries.lock().unwrap();
            entries.get(id).and_then(|e| {
                let spec = e.spec.as_ref()?;
                Some((spec.job_instance_id, e.handler.clone()?))
            })
        };

        match target {
            Some((job_instance_id, handler)) => {
                handler.run_job(job_instance_id).await;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TriggerRegistry for MockTriggerRegistry {
    async fn list_registered_ids(&self) -> KeeperResult<Vec<String>> {
        Ok(self.registered_ids())
    }

    async fn register(
        &self,
        spec: TriggerSpec,
        handler: Arc<dyn TriggerHandler>,
    ) -> KeeperResult<()> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);

        let expr = spec.cron.to_cron_expression();
        cron::Schedule::from_str(&expr).map_err(|e| KeeperError::InvalidCron {
            expr: expr.clone(),
            message: e.to_string(),
        })?;

        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&spec.id) {
            return Err(KeeperError::Trigger(format!("触发器已存在: {}", spec.id)));
        }
        entries.insert(
            spec.id.clone(),
            RegisteredEntry {
                spec: Some(spec),
                handler: Some(handler),
            },
        );
        Ok(())
    }

    async fn deregister(&self, id: &str) -> KeeperResult<()> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().remove(id);
        Ok(())
    }
}

/// 内存检查的测试替身，默认内存充足
pub struct MockMemoryGauge {
    enough: AtomicBool,
    fail: AtomicBool,
}

impl MockMemoryGauge {
    pub fn new(enough: bool) -> Self {
        Self {
            enough: AtomicBool::new(enough),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_enough(&self, enough: bool) {
        self.enough.store(enough, Ordering::SeqCst);
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockMemoryGauge {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl MemoryGauge for MockMemoryGauge {
    async fn has_enough_free_memory(&self) -> KeeperResult<bool> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(KeeperError::Internal("模拟的内存检查失败".to_string()));
        }
        Ok(self.enough.load(Ordering::SeqCst))
    }
}

