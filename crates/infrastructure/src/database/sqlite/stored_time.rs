use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use keeper_core::{KeeperError, KeeperResult};
use sqlx::Row;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// 解析数据库中保存的时间文本
///
/// 带时区的文本按其时区解析；外部写入的无时区文本按本地时间解释。
pub(crate) fn parse_stored_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z"))
    {
        return Some(t.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn stored_time(row: &sqlx::sqlite::SqliteRow, column: &str) -> KeeperResult<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_stored_time(&raw).ok_or_else(|| {
        KeeperError::DatabaseOperation(format!("无法解析时间字段 {column}: {raw}"))
    })
}
