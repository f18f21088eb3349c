use async_trait::async_trait;
use keeper_core::{
    models::{CronFields, JobInstance, JobPriority, JobRunType, ENABLED_PERIODIC},
    traits::JobInstanceRepository,
    KeeperError, KeeperResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, error, instrument};

use super::stored_time::stored_time;

const JOB_INSTANCE_COLUMNS: &str = "id, project_id, spider_name, run_type, priority, enabled, \
    cron_minutes, cron_hour, cron_day_of_month, cron_day_of_week, cron_month, \
    throttle_concurrency, spider_arguments, overlapping, tags, description, \
    date_created, date_modified";

pub struct SqliteJobInstanceRepository {
    pool: SqlitePool,
}

impl SqliteJobInstanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job_instance(row: &sqlx::sqlite::SqliteRow) -> KeeperResult<JobInstance> {
        let priority: i32 = row.try_get("priority")?;
        Ok(JobInstance {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            spider_name: row.try_get("spider_name")?,
            run_type: row.try_get::<JobRunType, _>("run_type")?,
            priority: JobPriority::from_i32(priority),
            enabled: row.try_get("enabled")?,
            cron: CronFields {
                minute: row.try_get("cron_minutes")?,
                hour: row.try_get("cron_hour")?,
                day_of_month: row.try_get("cron_day_of_month")?,
                day_of_week: row.try_get("cron_day_of_week")?,
                month: row.try_get("cron_month")?,
            },
            throttle_concurrency: row.try_get("throttle_concurrency")?,
            spider_arguments: row.try_get("spider_arguments")?,
            overlapping: row.try_get("overlapping")?,
            tags: row.try_get("tags")?,
            description: row.try_get("description")?,
            date_created: stored_time(row, "date_created")?,
            date_modified: stored_time(row, "date_modified")?,
        })
    }
}

#[async_trait]
impl JobInstanceRepository for SqliteJobInstanceRepository {
    #[instrument(skip(self, job_instance), fields(
        project_id = job_instance.project_id,
        spider_name = %job_instance.spider_name,
    ))]
    async fn create(&self, job_instance: &JobInstance) -> KeeperResult<JobInstance> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO job_instances (
                project_id, spider_name, run_type, priority, enabled,
                cron_minutes, cron_hour, cron_day_of_month, cron_day_of_week, cron_month,
                throttle_concurrency, spider_arguments, overlapping, tags, description,
                date_created, date_modified
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {JOB_INSTANCE_COLUMNS}
            "#
        ))
        .bind(job_instance.project_id)
        .bind(&job_instance.spider_name)
        .bind(job_instance.run_type)
        .bind(job_instance.priority.as_i32())
        .bind(job_instance.enabled)
        .bind(&job_instance.cron.minute)
        .bind(&job_instance.cron.hour)
        .bind(&job_instance.cron.day_of_month)
        .bind(&job_instance.cron.day_of_week)
        .bind(&job_instance.cron.month)
        .bind(job_instance.throttle_concurrency)
        .bind(&job_instance.spider_arguments)
        .bind(job_instance.overlapping)
        .bind(&job_instance.tags)
        .bind(&job_instance.description)
        .bind(job_instance.date_created)
        .bind(job_instance.date_modified)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) => {
                error!("保存任务实例失败，回滚事务: {}", e);
                tx.rollback().await?;
                return Err(KeeperError::Database(e));
            }
        };

        let created = Self::row_to_job_instance(&row)?;
        tx.commit().await?;

        debug!("创建任务实例: {} (ID: {})", created.spider_name, created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<JobInstance>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_INSTANCE_COLUMNS} FROM job_instances WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job_instance).transpose()
    }

    async fn list_active_periodic(&self) -> KeeperResult<Vec<JobInstance>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_INSTANCE_COLUMNS} FROM job_instances
             WHERE run_type = $1 AND enabled = $2 ORDER BY id"
        ))
        .bind(JobRunType::Periodic)
        .bind(ENABLED_PERIODIC)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job_instance).collect()
    }
}
