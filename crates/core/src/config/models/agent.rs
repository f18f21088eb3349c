use serde::{Deserialize, Serialize};

/// 执行代理集群配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub servers: Vec<String>,
    pub request_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            servers: vec!["http://localhost:6800".to_string()],
            request_timeout_seconds: 30,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.servers.is_empty() {
            return Err(anyhow::anyhow!("执行代理地址列表不能为空"));
        }

        for server in &self.servers {
            if !server.starts_with("http://") && !server.starts_with("https://") {
                return Err(anyhow::anyhow!("执行代理地址格式无效: {}", server));
            }
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 资源检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub enabled: bool,
    /// 启动新爬虫前要求的最小空闲内存（MB）
    pub min_free_memory_mb: u64,
    pub meminfo_path: String,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_memory_mb: 512,
            meminfo_path: "/proc/meminfo".to_string(),
        }
    }
}

impl ResourceConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.enabled && self.meminfo_path.is_empty() {
            return Err(anyhow::anyhow!("内存信息文件路径不能为空"));
        }

        Ok(())
    }
}
