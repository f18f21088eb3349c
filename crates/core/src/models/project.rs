use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    /// 执行代理侧的项目名称
    pub name: String,
    pub date_created: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0, // 将由数据库生成
            name: name.into(),
            date_created: Utc::now(),
        }
    }
}
