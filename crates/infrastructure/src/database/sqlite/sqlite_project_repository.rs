use async_trait::async_trait;
use keeper_core::{models::Project, traits::ProjectRepository, KeeperResult};
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteProjectRepository {
    pool: SqlitePool,
}

impl SqliteProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> KeeperResult<Project> {
        Ok(Project {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            date_created: row.try_get("date_created")?,
        })
    }
}

#[async_trait]
impl ProjectRepository for SqliteProjectRepository {
    async fn create(&self, project: &Project) -> KeeperResult<Project> {
        let row = sqlx::query(
            r#"
            INSERT INTO projects (name, date_created)
            VALUES ($1, $2)
            RETURNING id, name, date_created
            "#,
        )
        .bind(&project.name)
        .bind(project.date_created)
        .fetch_one(&self.pool)
        .await?;

        let created = Self::row_to_project(&row)?;
        debug!("创建项目: {} (ID: {})", created.name, created.id);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> KeeperResult<Option<Project>> {
        let row = sqlx::query("SELECT id, name, date_created FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_project).transpose()
    }

    async fn list_all(&self) -> KeeperResult<Vec<Project>> {
        let rows = sqlx::query("SELECT id, name, date_created FROM projects ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_project).collect()
    }
}
