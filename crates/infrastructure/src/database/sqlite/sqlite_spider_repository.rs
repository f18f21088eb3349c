use async_trait::async_trait;
use chrono::Utc;
use keeper_core::{
    models::{SpiderInstance, SpiderLastRun, SpiderSetup},
    traits::SpiderRepository,
    KeeperResult,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::stored_time::parse_stored_time;

pub struct SqliteSpiderRepository {
    pool: SqlitePool,
}

impl SqliteSpiderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_spider(row: &sqlx::sqlite::SqliteRow) -> KeeperResult<SpiderInstance> {
        Ok(SpiderInstance {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            spider_name: row.try_get("spider_name")?,
            date_created: row.try_get("date_created")?,
        })
    }
}

#[async_trait]
impl SpiderRepository for SqliteSpiderRepository {
    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<SpiderInstance>> {
        let row = sqlx::query(
            "SELECT id, project_id, spider_name, date_created FROM spider_instances WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_spider).transpose()
    }

    async fn find_by_name(
        &self,
        project_id: i64,
        spider_name: &str,
    ) -> KeeperResult<Option<SpiderInstance>> {
        let row = sqlx::query(
            "SELECT id, project_id, spider_name, date_created FROM spider_instances
             WHERE project_id = $1 AND spider_name = $2",
        )
        .bind(project_id)
        .bind(spider_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_spider).transpose()
    }

    async fn list_by_project(&self, project_id: i64) -> KeeperResult<Vec<SpiderInstance>> {
        let rows = sqlx::query(
            "SELECT id, project_id, spider_name, date_created FROM spider_instances
             WHERE project_id = $1 ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_spider).collect()
    }

    async fn list_by_last_run(&self, project_id: i64) -> KeeperResult<Vec<SpiderLastRun>> {
        // 左连接保留从未运行过的爬虫；SQLite 升序排序时 NULL 排在最前
        let rows = sqlx::query(
            r#"
            SELECT s.id AS spider_id, s.spider_name AS spider_name,
                   MAX(e.start_time) AS last_start_time
            FROM spider_instances s
            LEFT JOIN job_instances j
                   ON j.spider_name = s.spider_name AND j.project_id = s.project_id
            LEFT JOIN job_executions e ON e.job_instance_id = j.id
            WHERE s.project_id = $1
            GROUP BY s.id, s.spider_name
            ORDER BY last_start_time ASC, s.id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                // 聚合列丢失了声明类型，按文本解析
                let last_start_time: Option<String> = row.try_get("last_start_time")?;
                Ok(SpiderLastRun {
                    spider_id: row.try_get("spider_id")?,
                    spider_name: row.try_get("spider_name")?,
                    last_start_time: last_start_time
                        .as_deref()
                        .and_then(parse_stored_time),
                })
            })
            .collect()
    }

    async fn add_spiders(
        &self,
        project_id: i64,
        spider_names: &[String],
    ) -> KeeperResult<Vec<SpiderInstance>> {
        let mut tx = self.pool.begin().await?;
        let mut added = Vec::new();

        for spider_name in spider_names {
            let row = sqlx::query(
                r#"
                INSERT INTO spider_instances (project_id, spider_name, date_created)
                VALUES ($1, $2, $3)
                ON CONFLICT (project_id, spider_name) DO NOTHING
                RETURNING id, project_id, spider_name, date_created
                "#,
            )
            .bind(project_id)
            .bind(spider_name)
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                continue;
            };
            let spider = Self::row_to_spider(&row)?;

            sqlx::query(
                "INSERT OR IGNORE INTO spider_setups (spider_instance_id, auto_schedule) VALUES ($1, 1)",
            )
            .bind(spider.id)
            .execute(&mut *tx)
            .await?;

            debug!("发现新爬虫: 项目 {} 中的 {}", project_id, spider.spider_name);
            added.push(spider);
        }

        tx.commit().await?;

        if !added.is_empty() {
            info!("项目 {} 新增 {} 个爬虫", project_id, added.len());
        }
        Ok(added)
    }

    async fn get_setup(&self, spider_instance_id: i64) -> KeeperResult<Option<SpiderSetup>> {
        let row = sqlx::query(
            "SELECT spider_instance_id, auto_schedule FROM spider_setups WHERE spider_instance_id = $1",
        )
        .bind(spider_instance_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(SpiderSetup {
                spider_instance_id: row.try_get("spider_instance_id")?,
                auto_schedule: row.try_get("auto_schedule")?,
            })),
            None => Ok(None),
        }
    }

    async fn save_setup(&self, setup: &SpiderSetup) -> KeeperResult<()> {
        sqlx::query(
            r#"
            INSERT INTO spider_setups (spider_instance_id, auto_schedule)
            VALUES ($1, $2)
            ON CONFLICT (spider_instance_id) DO UPDATE SET auto_schedule = excluded.auto_schedule
            "#,
        )
        .bind(setup.spider_instance_id)
        .bind(setup.auto_schedule)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
