pub mod sqlite_job_execution_repository;
pub mod sqlite_job_instance_repository;
pub mod sqlite_project_repository;
pub mod sqlite_spider_repository;
mod stored_time;

pub use sqlite_job_execution_repository::SqliteJobExecutionRepository;
pub use sqlite_job_instance_repository::SqliteJobInstanceRepository;
pub use sqlite_project_repository::SqliteProjectRepository;
pub use sqlite_spider_repository::SqliteSpiderRepository;
