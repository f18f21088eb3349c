use async_trait::async_trait;
use keeper_core::{
    models::{JobExecution, SpiderStatus},
    traits::JobExecutionRepository,
    KeeperError, KeeperResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

/// 执行记录查询总是连接所属任务实例，带出爬虫名称与并发控制值
const EXECUTION_SELECT: &str = r#"
    SELECT e.id, e.project_id, e.job_instance_id, e.service_job_execution_id,
           e.running_status, e.create_time, e.start_time, e.end_time,
           e.requests_count, e.running_on,
           j.spider_name AS spider_name, j.throttle_concurrency AS throttle_concurrency
    FROM job_executions e
    JOIN job_instances j ON j.id = e.job_instance_id
"#;

pub struct SqliteJobExecutionRepository {
    pool: SqlitePool,
}

impl SqliteJobExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_execution(row: &sqlx::sqlite::SqliteRow) -> KeeperResult<JobExecution> {
        Ok(JobExecution {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            job_instance_id: row.try_get("job_instance_id")?,
            service_job_execution_id: row.try_get("service_job_execution_id")?,
            running_status: row.try_get::<SpiderStatus, _>("running_status")?,
            create_time: row.try_get("create_time")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            requests_count: row.try_get("requests_count")?,
            running_on: row.try_get("running_on")?,
            spider_name: row.try_get("spider_name")?,
            throttle_concurrency: row.try_get("throttle_concurrency")?,
        })
    }

    async fn fetch_by_id(&self, id: i64) -> KeeperResult<JobExecution> {
        let row = sqlx::query(&format!("{EXECUTION_SELECT} WHERE e.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Self::row_to_execution(&row)
    }
}

#[async_trait]
impl JobExecutionRepository for SqliteJobExecutionRepository {
    #[instrument(skip(self, execution), fields(
        job_instance_id = execution.job_instance_id,
        service_job_execution_id = %execution.service_job_execution_id,
    ))]
    async fn create(&self, execution: &JobExecution) -> KeeperResult<JobExecution> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO job_executions (
                project_id, job_instance_id, service_job_execution_id, running_status,
                create_time, start_time, end_time, requests_count, running_on
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(execution.project_id)
        .bind(execution.job_instance_id)
        .bind(&execution.service_job_execution_id)
        .bind(execution.running_status)
        .bind(execution.create_time)
        .bind(execution.start_time)
        .bind(execution.end_time)
        .bind(execution.requests_count)
        .bind(&execution.running_on)
        .fetch_one(&self.pool)
        .await?;

        debug!("创建执行记录 ID: {}", id);
        self.fetch_by_id(id).await
    }

    async fn list_running(&self, project_id: i64) -> KeeperResult<Vec<JobExecution>> {
        let rows = sqlx::query(&format!(
            "{EXECUTION_SELECT} WHERE e.project_id = $1 AND e.running_status = $2 ORDER BY e.id"
        ))
        .bind(project_id)
        .bind(SpiderStatus::Running)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn list_by_spider_and_status(
        &self,
        project_id: i64,
        spider_name: &str,
        status: SpiderStatus,
    ) -> KeeperResult<Vec<JobExecution>> {
        let rows = sqlx::query(&format!(
            "{EXECUTION_SELECT}
             WHERE e.project_id = $1 AND j.spider_name = $2 AND e.running_status = $3
             ORDER BY e.id"
        ))
        .bind(project_id)
        .bind(spider_name)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn list_finished_for_spider(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Vec<JobExecution>> {
        let rows = sqlx::query(&format!(
            "{EXECUTION_SELECT}
             WHERE e.project_id = $1 AND j.spider_name = $2 AND e.running_status = $3
               AND e.start_time IS NOT NULL AND e.end_time IS NOT NULL
             ORDER BY e.start_time ASC, e.id ASC"
        ))
        .bind(project_id)
        .bind(spider_name)
        .bind(SpiderStatus::Finished)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn get_last_for_spider(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Option<JobExecution>> {
        let row = sqlx::query(&format!(
            "{EXECUTION_SELECT}
             WHERE e.project_id = $1 AND j.spider_name = $2
             ORDER BY COALESCE(e.start_time, e.create_time) DESC, e.id DESC
             LIMIT 1"
        ))
        .bind(project_id)
        .bind(spider_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_execution).transpose()
    }

    async fn find_by_service_id(
        &self,
        project_id: i64,
        service_job_execution_id: &str,
    ) -> KeeperResult<Option<JobExecution>> {
        let row = sqlx::query(&format!(
            "{EXECUTION_SELECT} WHERE e.project_id = $1 AND e.service_job_execution_id = $2
             ORDER BY e.id DESC LIMIT 1"
        ))
        .bind(project_id)
        .bind(service_job_execution_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_execution).transpose()
    }

    #[instrument(skip(self, execution), fields(execution_id = execution.id))]
    async fn update_status(&self, execution: &JobExecution) -> KeeperResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE job_executions
            SET running_status = $2, start_time = $3, end_time = $4,
                requests_count = $5, running_on = $6
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.running_status)
        .bind(execution.start_time)
        .bind(execution.end_time)
        .bind(execution.requests_count)
        .bind(&execution.running_on)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(KeeperError::DatabaseOperation(format!(
                "执行记录不存在: {}",
                execution.id
            )));
        }

        debug!("更新执行记录 {} 状态为 {}", execution.id, execution.running_status.as_str());
        Ok(())
    }
}
