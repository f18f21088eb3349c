/// SQLite 表结构，全部使用 `IF NOT EXISTS`，启动时可重复执行
pub const SCHEMA_STATEMENTS: [&str; 9] = [
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        date_created TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS spider_instances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        spider_name TEXT NOT NULL,
        date_created TEXT NOT NULL,
        UNIQUE (project_id, spider_name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS spider_setups (
        spider_instance_id INTEGER PRIMARY KEY,
        auto_schedule INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_instances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        spider_name TEXT NOT NULL CHECK (length(trim(spider_name)) > 0),
        run_type TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        enabled INTEGER NOT NULL DEFAULT 0,
        cron_minutes TEXT NOT NULL DEFAULT '0',
        cron_hour TEXT NOT NULL DEFAULT '*',
        cron_day_of_month TEXT NOT NULL DEFAULT '*',
        cron_day_of_week TEXT NOT NULL DEFAULT '*',
        cron_month TEXT NOT NULL DEFAULT '*',
        throttle_concurrency REAL,
        spider_arguments TEXT,
        overlapping INTEGER NOT NULL DEFAULT 0,
        tags TEXT,
        description TEXT,
        date_created TEXT NOT NULL,
        date_modified TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id INTEGER NOT NULL,
        job_instance_id INTEGER NOT NULL,
        service_job_execution_id TEXT NOT NULL,
        running_status TEXT NOT NULL,
        create_time TEXT NOT NULL,
        start_time TEXT,
        end_time TEXT,
        requests_count INTEGER,
        running_on TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_instances_spider ON job_instances (project_id, spider_name)",
    "CREATE INDEX IF NOT EXISTS idx_job_instances_periodic ON job_instances (run_type, enabled)",
    "CREATE INDEX IF NOT EXISTS idx_job_executions_instance ON job_executions (job_instance_id)",
    "CREATE INDEX IF NOT EXISTS idx_job_executions_service_id ON job_executions (project_id, service_job_execution_id)",
];
