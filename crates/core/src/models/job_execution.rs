use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobInstance;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SpiderStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "FINISHED")]
    Finished,
    #[serde(rename = "CANCELED")]
    Canceled,
}

impl SpiderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpiderStatus::Pending => "PENDING",
            SpiderStatus::Running => "RUNNING",
            SpiderStatus::Finished => "FINISHED",
            SpiderStatus::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SpiderStatus::Finished | SpiderStatus::Canceled)
    }

    fn rank(&self) -> u8 {
        match self {
            SpiderStatus::Pending => 0,
            SpiderStatus::Running => 1,
            SpiderStatus::Finished | SpiderStatus::Canceled => 2,
        }
    }

    /// 状态只能前进，终态不可再变更
    pub fn can_transition_to(&self, next: SpiderStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::str::FromStr for SpiderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SpiderStatus::Pending),
            "RUNNING" => Ok(SpiderStatus::Running),
            "FINISHED" => Ok(SpiderStatus::Finished),
            "CANCELED" => Ok(SpiderStatus::Canceled),
            _ => Err(format!("Invalid spider status: {s}")),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for SpiderStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SpiderStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<SpiderStatus>().map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SpiderStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobExecution {
    pub id: i64,
    pub project_id: i64,
    pub job_instance_id: i64,
    /// 执行代理侧的任务ID
    pub service_job_execution_id: String,
    pub running_status: SpiderStatus,
    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub requests_count: Option<i64>,
    pub running_on: Option<String>,
    /// 以下字段来自所属任务实例，只读
    pub spider_name: String,
    pub throttle_concurrency: Option<f64>,
}

impl JobExecution {
    /// 任务提交给执行代理后创建的待执行记录
    pub fn pending(
        job_instance: &JobInstance,
        service_job_execution_id: impl Into<String>,
        running_on: Option<String>,
    ) -> Self {
        Self {
            id: 0, // 将由数据库生成
            project_id: job_instance.project_id,
            job_instance_id: job_instance.id,
            service_job_execution_id: service_job_execution_id.into(),
            running_status: SpiderStatus::Pending,
            create_time: Utc::now(),
            start_time: None,
            end_time: None,
            requests_count: None,
            running_on,
            spider_name: job_instance.spider_name.clone(),
            throttle_concurrency: job_instance.throttle_concurrency,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_status == SpiderStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.running_status == SpiderStatus::Finished
    }

    /// 运行时长（分钟），缺少开始或结束时间时返回 None
    pub fn duration_minutes(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 60_000.0),
            _ => None,
        }
    }

    /// 最近一次活动时间：优先使用开始时间，未开始时使用创建时间
    pub fn last_activity_time(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or(self.create_time)
    }

    /// 应用执行代理上报的状态，返回记录是否发生变化
    pub fn apply_snapshot(&mut self, snapshot: &AgentJobSnapshot) -> bool {
        let mut changed = false;

        if self.running_status.can_transition_to(snapshot.status) {
            self.running_status = snapshot.status;
            changed = true;
        } else if self.running_status != snapshot.status {
            return false;
        }

        if self.start_time.is_none() && snapshot.start_time.is_some() {
            self.start_time = snapshot.start_time;
            changed = true;
        }
        if self.end_time.is_none() && snapshot.end_time.is_some() && snapshot.status.is_terminal() {
            self.end_time = snapshot.end_time;
            changed = true;
        }
        if snapshot.requests_count.is_some() && self.requests_count != snapshot.requests_count {
            self.requests_count = snapshot.requests_count;
            changed = true;
        }
        if self.running_on.is_none() && snapshot.running_on.is_some() {
            self.running_on = snapshot.running_on.clone();
            changed = true;
        }

        changed
    }
}

/// 执行代理上报的单个任务状态快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentJobSnapshot {
    pub service_job_execution_id: String,
    pub spider_name: String,
    pub status: SpiderStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub requests_count: Option<i64>,
    pub running_on: Option<String>,
}

/// 执行代理接受启动请求后的返回信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentLaunch {
    pub service_job_execution_id: String,
    pub running_on: Option<String>,
}
