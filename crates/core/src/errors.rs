use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("项目未找到: {id}")]
    ProjectNotFound { id: i64 },

    #[error("爬虫未找到: {id}")]
    SpiderNotFound { id: i64 },

    #[error("爬虫未找到: 项目 {project_id} 中的 {name}")]
    SpiderNameNotFound { project_id: i64, name: String },

    #[error("任务实例未找到: {id}")]
    JobInstanceNotFound { id: i64 },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("执行代理错误: {0}")]
    Agent(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("定时触发器错误: {0}")]
    Trigger(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        KeeperError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type KeeperResult<T> = std::result::Result<T, KeeperError>;
