pub mod manager;
pub mod schema;
pub mod sqlite;

pub use manager::{DatabaseManager, DbPool};
pub use sqlite::{
    SqliteJobExecutionRepository, SqliteJobInstanceRepository, SqliteProjectRepository,
    SqliteSpiderRepository,
};
