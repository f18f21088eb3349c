use keeper_core::models::JobInstance;

/// 爬虫周期任务触发器的命名空间前缀
pub const TRIGGER_ID_PREFIX: &str = "spider_job_";

/// 触发器ID：`spider_job_<任务实例ID>:<最后修改时间的秒级时间戳>`
///
/// 修改时间参与ID，模板被编辑后ID随之变化，对账时旧触发器被移除、新触发器被注册。
pub fn trigger_id(job_instance: &JobInstance) -> String {
    format!(
        "{TRIGGER_ID_PREFIX}{}:{}",
        job_instance.id,
        job_instance.date_modified.timestamp()
    )
}

pub fn is_spider_job_trigger(id: &str) -> bool {
    id.starts_with(TRIGGER_ID_PREFIX)
}

/// 解析出 (任务实例ID, 修改时间戳)
pub fn parse_trigger_id(id: &str) -> Option<(i64, i64)> {
    let rest = id.strip_prefix(TRIGGER_ID_PREFIX)?;
    let (job_instance_id, modified) = rest.split_once(':')?;
    Some((job_instance_id.parse().ok()?, modified.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use keeper_core::models::CronFields;

    #[test]
    fn test_trigger_id_format() {
        let mut job = JobInstance::periodic(1, "books", CronFields::default());
        job.id = 42;
        job.date_modified = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let id = trigger_id(&job);
        assert_eq!(id, "spider_job_42:1700000000");
        assert!(is_spider_job_trigger(&id));
        assert_eq!(parse_trigger_id(&id), Some((42, 1_700_000_000)));
    }

    #[test]
    fn test_foreign_ids_are_not_parsed() {
        assert!(!is_spider_job_trigger("cleanup_logs"));
        assert_eq!(parse_trigger_id("cleanup_logs"), None);
        assert_eq!(parse_trigger_id("spider_job_x:1"), None);
    }
}
