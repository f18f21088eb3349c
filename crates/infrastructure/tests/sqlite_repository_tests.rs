use anyhow::Result;
use chrono::{Duration, Local, NaiveDateTime, TimeZone, Utc};
use keeper_core::models::{
    CronFields, JobExecution, JobInstance, Project, SpiderSetup, SpiderStatus,
};
use keeper_core::traits::*;
use keeper_core::KeeperError;
use keeper_infrastructure::database::{
    DatabaseManager, SqliteJobExecutionRepository, SqliteJobInstanceRepository,
    SqliteProjectRepository, SqliteSpiderRepository,
};

struct Repos {
    projects: SqliteProjectRepository,
    spiders: SqliteSpiderRepository,
    instances: SqliteJobInstanceRepository,
    executions: SqliteJobExecutionRepository,
}

async fn setup() -> Result<(DatabaseManager, Repos)> {
    let db = DatabaseManager::in_memory().await?;
    db.migrate().await?;
    let pool = db.pool().clone();
    let repos = Repos {
        projects: SqliteProjectRepository::new(pool.clone()),
        spiders: SqliteSpiderRepository::new(pool.clone()),
        instances: SqliteJobInstanceRepository::new(pool.clone()),
        executions: SqliteJobExecutionRepository::new(pool),
    };
    Ok((db, repos))
}

async fn launch(
    repos: &Repos,
    project_id: i64,
    spider: &str,
    throttle: f64,
    service_id: &str,
) -> Result<JobExecution> {
    let mut instance = JobInstance::one_time(project_id, spider);
    instance.apply_throttle(throttle);
    let instance = repos.instances.create(&instance).await?;
    let execution = JobExecution::pending(&instance, service_id, None);
    Ok(repos.executions.create(&execution).await?)
}

#[tokio::test]
async fn test_migrate_is_idempotent() -> Result<()> {
    let (db, _repos) = setup().await?;
    db.migrate().await?;
    db.health_check().await?;
    Ok(())
}

#[tokio::test]
async fn test_add_spiders_only_returns_new_names() -> Result<()> {
    let (_db, repos) = setup().await?;
    let project = repos.projects.create(&Project::new("shop")).await?;

    let added = repos
        .spiders
        .add_spiders(project.id, &["books".to_string(), "news".to_string()])
        .await?;
    assert_eq!(added.len(), 2);

    let added_again = repos
        .spiders
        .add_spiders(project.id, &["news".to_string(), "sellers.weekly".to_string()])
        .await?;
    assert_eq!(added_again.len(), 1);
    assert_eq!(added_again[0].spider_name, "sellers.weekly");

    let all = repos.spiders.list_by_project(project.id).await?;
    assert_eq!(all.len(), 3);

    let setup = repos.spiders.get_setup(added[0].id).await?.unwrap();
    assert!(setup.auto_schedule);

    repos
        .spiders
        .save_setup(&SpiderSetup {
            spider_instance_id: added[0].id,
            auto_schedule: false,
        })
        .await?;
    let setup = repos.spiders.get_setup(added[0].id).await?.unwrap();
    assert!(!setup.auto_schedule);
    Ok(())
}

#[tokio::test]
async fn test_job_instance_round_trip() -> Result<()> {
    let (_db, repos) = setup().await?;

    let cron = CronFields::new("30", "2", "*", "0-4", "*");
    let template = repos
        .instances
        .create(&JobInstance::periodic(1, "books", cron.clone()))
        .await?;
    assert!(template.id > 0);

    let mut disabled = JobInstance::periodic(1, "news", CronFields::default());
    disabled.enabled = 1;
    repos.instances.create(&disabled).await?;

    let mut one_time = JobInstance::one_time(1, "books");
    one_time.apply_throttle(2.5);
    let one_time = repos.instances.create(&one_time).await?;

    let active = repos.instances.list_active_periodic().await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, template.id);
    assert_eq!(active[0].cron, cron);

    let loaded = repos.instances.get_by_id(one_time.id).await?.unwrap();
    assert_eq!(loaded.throttle_concurrency, Some(2.5));
    assert_eq!(
        loaded.spider_arguments.as_deref(),
        Some("setting=AUTOTHROTTLE_TARGET_CONCURRENCY=2.5")
    );
    assert!(loaded.overlapping);
    assert!(loaded.is_materialized());
    Ok(())
}

#[tokio::test]
async fn test_failed_job_instance_insert_is_rolled_back() -> Result<()> {
    let (db, repos) = setup().await?;
    let project = repos.projects.create(&Project::new("shop")).await?;

    let err = repos
        .instances
        .create(&JobInstance::one_time(project.id, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, KeeperError::Database(_)));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_instances")
        .fetch_one(db.pool())
        .await?;
    assert_eq!(count, 0);

    // 回滚后连接归还连接池，后续写入不受影响
    let created = repos
        .instances
        .create(&JobInstance::one_time(project.id, "books"))
        .await?;
    assert_eq!(repos.instances.get_by_id(created.id).await?, Some(created));
    Ok(())
}

#[tokio::test]
async fn test_naive_modification_time_is_read_as_local_time() -> Result<()> {
    let (db, repos) = setup().await?;
    let project = repos.projects.create(&Project::new("shop")).await?;

    // 外部管理端写入的无时区时间
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO job_instances (
            project_id, spider_name, run_type, priority, enabled,
            cron_minutes, cron_hour, cron_day_of_month, cron_day_of_week, cron_month,
            overlapping, date_created, date_modified
        )
        VALUES ($1, 'books', 'periodic', 0, 0, '0', '3', '*', '*', '*', 0,
                '2024-05-01 12:00:00', '2024-05-01 12:00:00')
        RETURNING id
        "#,
    )
    .bind(project.id)
    .fetch_one(db.pool())
    .await?;

    let naive = NaiveDateTime::parse_from_str("2024-05-01 12:00:00", "%Y-%m-%d %H:%M:%S")?;
    let expected = Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.timestamp());

    let instance = repos.instances.get_by_id(id).await?.expect("模板应存在");
    assert_eq!(Some(instance.date_modified.timestamp()), expected);

    let periodic = repos.instances.list_active_periodic().await?;
    assert_eq!(periodic.len(), 1);
    assert_eq!(Some(periodic[0].date_modified.timestamp()), expected);
    Ok(())
}

#[tokio::test]
async fn test_running_executions_carry_instance_throttle() -> Result<()> {
    let (_db, repos) = setup().await?;

    let mut first = launch(&repos, 1, "books", 3.0, "job-1").await?;
    let mut second = launch(&repos, 1, "news", 1.5, "job-2").await?;
    launch(&repos, 1, "weather", 9.0, "job-3").await?;
    launch(&repos, 2, "books", 4.0, "job-4").await?;

    for execution in [&mut first, &mut second] {
        execution.running_status = SpiderStatus::Running;
        execution.start_time = Some(Utc::now());
        repos.executions.update_status(execution).await?;
    }

    let running = repos.executions.list_running(1).await?;
    assert_eq!(running.len(), 2);
    let load: f64 = running.iter().filter_map(|e| e.throttle_concurrency).sum();
    assert_eq!(load, 4.5);

    let pending = repos
        .executions
        .list_by_spider_and_status(1, "weather", SpiderStatus::Pending)
        .await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].spider_name, "weather");

    let found = repos.executions.find_by_service_id(2, "job-4").await?.unwrap();
    assert_eq!(found.project_id, 2);
    assert!(repos.executions.find_by_service_id(1, "job-4").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_finished_history_and_last_run() -> Result<()> {
    let (_db, repos) = setup().await?;
    let now = Utc::now();

    for (i, hours_ago) in [48, 24].into_iter().enumerate() {
        let mut execution = launch(&repos, 1, "books", 2.0, &format!("done-{i}")).await?;
        execution.running_status = SpiderStatus::Finished;
        execution.start_time = Some(now - Duration::hours(hours_ago));
        execution.end_time = Some(now - Duration::hours(hours_ago) + Duration::minutes(90));
        execution.requests_count = Some(100);
        repos.executions.update_status(&execution).await?;
    }
    let latest = launch(&repos, 1, "books", 2.0, "pending-1").await?;

    let finished = repos.executions.list_finished_for_spider(1, "books").await?;
    assert_eq!(finished.len(), 2);
    assert!(finished[0].start_time < finished[1].start_time);
    assert_eq!(finished[0].duration_minutes(), Some(90.0));

    let last = repos.executions.get_last_for_spider(1, "books").await?.unwrap();
    assert_eq!(last.id, latest.id);
    assert!(repos.executions.get_last_for_spider(1, "news").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_list_by_last_run_puts_never_run_spiders_first() -> Result<()> {
    let (_db, repos) = setup().await?;
    let project = repos.projects.create(&Project::new("shop")).await?;
    repos
        .spiders
        .add_spiders(
            project.id,
            &["recent".to_string(), "old".to_string(), "never".to_string()],
        )
        .await?;

    let now = Utc::now();
    for (spider, hours_ago) in [("recent", 1), ("old", 72)] {
        let mut execution = launch(&repos, project.id, spider, 1.0, spider).await?;
        execution.running_status = SpiderStatus::Running;
        execution.start_time = Some(now - Duration::hours(hours_ago));
        repos.executions.update_status(&execution).await?;
    }

    let ordered = repos.spiders.list_by_last_run(project.id).await?;
    let names: Vec<_> = ordered.iter().map(|s| s.spider_name.as_str()).collect();
    assert_eq!(names, vec!["never", "old", "recent"]);
    assert!(ordered[0].last_start_time.is_none());
    assert!(ordered[1].last_start_time.is_some());
    Ok(())
}

#[tokio::test]
async fn test_update_status_of_missing_execution_fails() -> Result<()> {
    let (_db, repos) = setup().await?;
    let instance = JobInstance::one_time(1, "books");
    let mut execution = JobExecution::pending(&instance, "ghost", None);
    execution.id = 404;

    assert!(repos.executions.update_status(&execution).await.is_err());
    Ok(())
}
