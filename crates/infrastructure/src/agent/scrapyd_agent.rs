use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use keeper_core::{
    config::models::AgentConfig,
    models::{AgentJobSnapshot, AgentLaunch, JobInstance, Project, SpiderStatus},
    traits::ExecutionAgent,
    KeeperError, KeeperResult,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

/// scrapyd 返回的时间不带时区，按本地时间解释
const SCRAPYD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    status: String,
    jobid: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListSpidersResponse {
    status: String,
    #[serde(default)]
    spiders: Vec<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListJobsResponse {
    status: String,
    #[serde(default)]
    pending: Vec<ScrapydJob>,
    #[serde(default)]
    running: Vec<ScrapydJob>,
    #[serde(default)]
    finished: Vec<ScrapydJob>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapydJob {
    id: String,
    spider: String,
    start_time: Option<String>,
    end_time: Option<String>,
}

/// scrapyd 风格的 HTTP 执行代理客户端
///
/// 启动请求在配置的节点间轮询分发；状态查询汇总所有节点的结果。
pub struct ScrapydAgent {
    servers: Vec<String>,
    http_client: reqwest::Client,
    next_server: AtomicUsize,
}

impl ScrapydAgent {
    pub fn new(config: &AgentConfig) -> KeeperResult<Self> {
        if config.servers.is_empty() {
            return Err(KeeperError::Configuration(
                "执行代理节点列表不能为空".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| KeeperError::Network(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            servers: config
                .servers
                .iter()
                .map(|s| s.trim_end_matches('/').to_string())
                .collect(),
            http_client,
            next_server: AtomicUsize::new(0),
        })
    }

    fn pick_server(&self) -> &str {
        let index = self.next_server.fetch_add(1, Ordering::Relaxed) % self.servers.len();
        &self.servers[index]
    }

    async fn list_spiders_on(&self, server: &str, project: &Project) -> KeeperResult<Vec<String>> {
        let url = format!("{server}/listspiders.json");
        let response: ListSpidersResponse = self
            .http_client
            .get(&url)
            .query(&[("project", project.name.as_str())])
            .send()
            .await
            .map_err(|e| KeeperError::Network(format!("请求 {url} 失败: {e}")))?
            .json()
            .await
            .map_err(|e| KeeperError::Agent(format!("解析 {url} 响应失败: {e}")))?;

        if response.status != "ok" {
            return Err(KeeperError::Agent(format!(
                "{url} 返回错误: {}",
                response.message.unwrap_or(response.status)
            )));
        }
        Ok(response.spiders)
    }

    async fn list_jobs_on(
        &self,
        server: &str,
        project: &Project,
    ) -> KeeperResult<Vec<AgentJobSnapshot>> {
        let url = format!("{server}/listjobs.json");
        let response: ListJobsResponse = self
            .http_client
            .get(&url)
            .query(&[("project", project.name.as_str())])
            .send()
            .await
            .map_err(|e| KeeperError::Network(format!("请求 {url} 失败: {e}")))?
            .json()
            .await
            .map_err(|e| KeeperError::Agent(format!("解析 {url} 响应失败: {e}")))?;

        if response.status != "ok" {
            return Err(KeeperError::Agent(format!(
                "{url} 返回错误: {}",
                response.message.unwrap_or(response.status)
            )));
        }
        Ok(snapshots_from_listing(server, response))
    }
}

#[async_trait]
impl ExecutionAgent for ScrapydAgent {
    async fn start_spider(
        &self,
        project: &Project,
        job_instance: &JobInstance,
    ) -> KeeperResult<AgentLaunch> {
        let server = self.pick_server();
        let url = format!("{server}/schedule.json");

        let mut form = vec![
            ("project".to_string(), project.name.clone()),
            ("spider".to_string(), job_instance.spider_name.clone()),
        ];
        form.extend(job_instance.parsed_arguments());

        debug!(
            "向 {} 提交爬虫 {} (任务实例 {})",
            server, job_instance.spider_name, job_instance.id
        );

        let response = self
            .http_client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!("连接执行代理 {} 失败: {}", server, e);
                KeeperError::Network(format!("请求 {url} 失败: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KeeperError::Agent(format!(
                "启动爬虫失败: HTTP {status} - {body}"
            )));
        }

        let body: ScheduleResponse = response
            .json()
            .await
            .map_err(|e| KeeperError::Agent(format!("解析 {url} 响应失败: {e}")))?;

        match (body.status.as_str(), body.jobid) {
            ("ok", Some(jobid)) => {
                info!(
                    "执行代理 {} 接受爬虫 {}，任务ID: {}",
                    server, job_instance.spider_name, jobid
                );
                Ok(AgentLaunch {
                    service_job_execution_id: jobid,
                    running_on: Some(server.to_string()),
                })
            }
            _ => Err(KeeperError::Agent(format!(
                "执行代理拒绝启动爬虫 {}: {}",
                job_instance.spider_name,
                body.message.unwrap_or(body.status)
            ))),
        }
    }

    async fn get_spider_list(&self, project: &Project) -> KeeperResult<Vec<String>> {
        let mut last_error = None;
        for server in &self.servers {
            match self.list_spiders_on(server, project).await {
                Ok(spiders) => return Ok(spiders),
                Err(e) => {
                    warn!("从 {} 获取项目 {} 的爬虫列表失败: {}", server, project.name, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| KeeperError::Agent("没有可用的执行代理节点".to_string())))
    }

    async fn get_job_status(&self, project: &Project) -> KeeperResult<Vec<AgentJobSnapshot>> {
        let mut snapshots = Vec::new();
        let mut failures = 0;
        let mut last_error = None;

        for server in &self.servers {
            match self.list_jobs_on(server, project).await {
                Ok(jobs) => snapshots.extend(jobs),
                Err(e) => {
                    warn!("从 {} 获取项目 {} 的任务状态失败: {}", server, project.name, e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == self.servers.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(snapshots)
    }
}

fn snapshots_from_listing(server: &str, listing: ListJobsResponse) -> Vec<AgentJobSnapshot> {
    let groups = [
        (SpiderStatus::Pending, listing.pending),
        (SpiderStatus::Running, listing.running),
        (SpiderStatus::Finished, listing.finished),
    ];

    groups
        .into_iter()
        .flat_map(|(status, jobs)| {
            jobs.into_iter().map(move |job| AgentJobSnapshot {
                service_job_execution_id: job.id,
                spider_name: job.spider,
                status,
                start_time: job.start_time.as_deref().and_then(parse_scrapyd_time),
                end_time: job.end_time.as_deref().and_then(parse_scrapyd_time),
                requests_count: None,
                running_on: Some(server.to_string()),
            })
        })
        .collect()
}

fn parse_scrapyd_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, SCRAPYD_TIME_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scrapyd_time_accepts_fractional_seconds() {
        let parsed = parse_scrapyd_time("2024-03-01 08:15:30.123456").unwrap();
        let local = parsed.with_timezone(&Local);
        assert_eq!(local.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-03-01 08:15:30");

        assert!(parse_scrapyd_time("2024-03-01 08:15:30").is_some());
        assert!(parse_scrapyd_time("not a time").is_none());
    }

    #[test]
    fn test_listing_maps_each_group_to_status() {
        let listing: ListJobsResponse = serde_json::from_str(
            r#"{
                "status": "ok",
                "pending": [{"id": "a1", "spider": "books"}],
                "running": [{"id": "b2", "spider": "news", "start_time": "2024-03-01 08:00:00.5"}],
                "finished": [{"id": "c3", "spider": "sellers.daily",
                              "start_time": "2024-03-01 06:00:00", "end_time": "2024-03-01 07:00:00"}]
            }"#,
        )
        .unwrap();

        let snapshots = snapshots_from_listing("http://node-1:6800", listing);
        assert_eq!(snapshots.len(), 3);

        assert_eq!(snapshots[0].status, SpiderStatus::Pending);
        assert!(snapshots[0].start_time.is_none());

        assert_eq!(snapshots[1].status, SpiderStatus::Running);
        assert!(snapshots[1].start_time.is_some());
        assert_eq!(snapshots[1].running_on.as_deref(), Some("http://node-1:6800"));

        let finished = &snapshots[2];
        assert_eq!(finished.status, SpiderStatus::Finished);
        assert_eq!(finished.service_job_execution_id, "c3");
        assert_eq!(
            (finished.end_time.unwrap() - finished.start_time.unwrap()).num_minutes(),
            60
        );
    }

    #[test]
    fn test_servers_are_used_round_robin() {
        let config = AgentConfig {
            servers: vec![
                "http://node-1:6800/".to_string(),
                "http://node-2:6800".to_string(),
            ],
            ..AgentConfig::default()
        };
        let agent = ScrapydAgent::new(&config).unwrap();

        assert_eq!(agent.pick_server(), "http://node-1:6800");
        assert_eq!(agent.pick_server(), "http://node-2:6800");
        assert_eq!(agent.pick_server(), "http://node-1:6800");
    }

    #[test]
    fn test_empty_server_list_is_rejected() {
        let config = AgentConfig {
            servers: Vec::new(),
            ..AgentConfig::default()
        };
        assert!(ScrapydAgent::new(&config).is_err());
    }
}
