use std::path::PathBuf;

use async_trait::async_trait;
use keeper_core::{config::models::ResourceConfig, traits::MemoryGauge, KeeperError, KeeperResult};
use tracing::{debug, warn};

/// 基于 `/proc/meminfo` 的空闲内存检查
///
/// 优先读取 `MemAvailable`，旧内核没有该字段时退回 `MemFree`。
pub struct MeminfoGauge {
    enabled: bool,
    min_free_kb: u64,
    meminfo_path: PathBuf,
}

impl MeminfoGauge {
    pub fn new(config: &ResourceConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_free_kb: config.min_free_memory_mb * 1024,
            meminfo_path: PathBuf::from(&config.meminfo_path),
        }
    }

    /// 当前空闲内存（KB）
    pub async fn free_memory_kb(&self) -> KeeperResult<u64> {
        let content = tokio::fs::read_to_string(&self.meminfo_path)
            .await
            .map_err(|e| {
                KeeperError::Internal(format!(
                    "读取 {} 失败: {e}",
                    self.meminfo_path.display()
                ))
            })?;

        parse_free_memory_kb(&content).ok_or_else(|| {
            KeeperError::Internal(format!(
                "{} 中缺少 MemAvailable/MemFree 字段",
                self.meminfo_path.display()
            ))
        })
    }
}

#[async_trait]
impl MemoryGauge for MeminfoGauge {
    async fn has_enough_free_memory(&self) -> KeeperResult<bool> {
        if !self.enabled {
            return Ok(true);
        }

        let free_kb = self.free_memory_kb().await?;
        let enough = free_kb >= self.min_free_kb;
        if enough {
            debug!("空闲内存 {} KB，阈值 {} KB", free_kb, self.min_free_kb);
        } else {
            warn!("空闲内存不足: {} KB < {} KB", free_kb, self.min_free_kb);
        }
        Ok(enough)
    }
}

fn parse_free_memory_kb(content: &str) -> Option<u64> {
    let field = |name: &str| {
        content.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
    };
    field("MemAvailable").or_else(|| field("MemFree"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MEMINFO: &str = "MemTotal:       16303416 kB\n\
                           MemFree:          812344 kB\n\
                           MemAvailable:    9123456 kB\n\
                           Buffers:          402100 kB\n";

    #[test]
    fn test_prefers_mem_available() {
        assert_eq!(parse_free_memory_kb(MEMINFO), Some(9_123_456));
    }

    #[test]
    fn test_falls_back_to_mem_free() {
        let old_kernel = "MemTotal: 1024 kB\nMemFree: 256 kB\n";
        assert_eq!(parse_free_memory_kb(old_kernel), Some(256));
        assert_eq!(parse_free_memory_kb("Buffers: 1 kB\n"), None);
    }

    #[tokio::test]
    async fn test_free_memory_compares_against_threshold() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MEMINFO.as_bytes()).unwrap();

        let mut config = ResourceConfig {
            meminfo_path: file.path().to_string_lossy().to_string(),
            min_free_memory_mb: 1024,
            ..ResourceConfig::default()
        };
        assert!(MeminfoGauge::new(&config).has_enough_free_memory().await.unwrap());

        config.min_free_memory_mb = 64 * 1024;
        assert!(!MeminfoGauge::new(&config).has_enough_free_memory().await.unwrap());
    }

    #[tokio::test]
    async fn test_disabled_memory_check_always_allows() {
        let config = ResourceConfig {
            enabled: false,
            meminfo_path: "/nonexistent/meminfo".to_string(),
            ..ResourceConfig::default()
        };
        assert!(MeminfoGauge::new(&config).has_enough_free_memory().await.unwrap());
    }
}
