use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 启用标记：处于活跃状态的周期任务模板
pub const ENABLED_PERIODIC: i32 = 0;
/// 启用标记：已物化的一次性任务
pub const MATERIALIZED_ONE_TIME: i32 = -1;

/// 爬虫内部并发控制设置项
pub const AUTOTHROTTLE_SETTING: &str = "AUTOTHROTTLE_TARGET_CONCURRENCY";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobRunType {
    #[serde(rename = "periodic")]
    Periodic,
    #[serde(rename = "onetime")]
    OneTime,
}

impl JobRunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunType::Periodic => "periodic",
            JobRunType::OneTime => "onetime",
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobRunType {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobRunType {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "periodic" => Ok(JobRunType::Periodic),
            "onetime" => Ok(JobRunType::OneTime),
            _ => Err(format!("Invalid job run type: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobRunType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobPriority {
    Low,
    Normal,
    High,
    Highest,
}

impl JobPriority {
    pub fn as_i32(&self) -> i32 {
        match self {
            JobPriority::Low => -1,
            JobPriority::Normal => 0,
            JobPriority::High => 1,
            JobPriority::Highest => 2,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            i32::MIN..=-1 => JobPriority::Low,
            0 => JobPriority::Normal,
            1 => JobPriority::High,
            _ => JobPriority::Highest,
        }
    }
}

/// 周期任务的CRON字段，格式与数据库中保存的一致
///
/// 星期字段使用 `0 = 周一 … 6 = 周日` 的约定，也接受 `mon`、`tue` 等名称。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CronFields {
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub day_of_week: String,
    pub month: String,
}

const WEEKDAY_NAMES: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

impl Default for CronFields {
    fn default() -> Self {
        Self {
            minute: "0".to_string(),
            hour: "*".to_string(),
            day_of_month: "*".to_string(),
            day_of_week: "*".to_string(),
            month: "*".to_string(),
        }
    }
}

impl CronFields {
    pub fn new(minute: &str, hour: &str, day_of_month: &str, day_of_week: &str, month: &str) -> Self {
        Self {
            minute: minute.to_string(),
            hour: hour.to_string(),
            day_of_month: day_of_month.to_string(),
            day_of_week: day_of_week.to_string(),
            month: month.to_string(),
        }
    }

    /// 转换为带秒字段的六段CRON表达式，秒固定为0
    ///
    /// 星期字段中的数字会被转换为星期名称，避免不同CRON实现对数字含义的分歧。
    pub fn to_cron_expression(&self) -> String {
        format!(
            "0 {} {} {} {} {}",
            or_any(&self.minute),
            or_any(&self.hour),
            or_any(&self.day_of_month),
            or_any(&self.month),
            translate_day_of_week(or_any(&self.day_of_week)),
        )
    }
}

fn or_any(field: &str) -> &str {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        "*"
    } else {
        trimmed
    }
}

/// 星期字段中的范围与步长展开为名称列表
///
/// `cron` 按 SUN..SAT 排序，而这里周日排在最后，`SAT-SUN` 这样的范围会被拒绝。
fn translate_day_of_week(field: &str) -> String {
    if field == "*" {
        return field.to_string();
    }
    field
        .split(',')
        .map(|part| translate_weekday_part(part.trim()))
        .collect::<Vec<_>>()
        .join(",")
}

fn translate_weekday_part(part: &str) -> String {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => match step.trim().parse::<usize>() {
            Ok(step) if step > 0 => (range.trim(), Some(step)),
            _ => return part.to_string(),
        },
        None => (part, None),
    };

    let last = WEEKDAY_NAMES.len() - 1;
    let bounds = if range == "*" {
        Some((0, last))
    } else if let Some((start, end)) = range.split_once('-') {
        weekday_index(start).zip(weekday_index(end))
    } else {
        // 单个值带步长时表示从该值到周日
        weekday_index(range).map(|day| if step.is_some() { (day, last) } else { (day, day) })
    };

    match bounds {
        Some((start, end)) if start <= end => (start..=end)
            .step_by(step.unwrap_or(1))
            .map(|day| WEEKDAY_NAMES[day])
            .collect::<Vec<_>>()
            .join(","),
        _ => part.to_string(),
    }
}

fn weekday_index(token: &str) -> Option<usize> {
    let token = token.trim();
    match token.parse::<usize>() {
        Ok(day) if day < WEEKDAY_NAMES.len() => Some(day),
        Ok(_) => None,
        Err(_) => WEEKDAY_NAMES
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInstance {
    pub id: i64,
    pub project_id: i64,
    pub spider_name: String,
    pub run_type: JobRunType,
    pub priority: JobPriority,
    /// 0：活跃的周期模板；负数：已物化的一次性任务；其他：已禁用
    pub enabled: i32,
    pub cron: CronFields,
    pub throttle_concurrency: Option<f64>,
    pub spider_arguments: Option<String>,
    pub overlapping: bool,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
}

impl JobInstance {
    /// 创建周期任务模板
    pub fn periodic(project_id: i64, spider_name: impl Into<String>, cron: CronFields) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            project_id,
            spider_name: spider_name.into(),
            run_type: JobRunType::Periodic,
            priority: JobPriority::Normal,
            enabled: ENABLED_PERIODIC,
            cron,
            throttle_concurrency: None,
            spider_arguments: None,
            overlapping: false,
            tags: None,
            description: None,
            date_created: now,
            date_modified: now,
        }
    }

    /// 创建已物化的一次性任务
    pub fn one_time(project_id: i64, spider_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            project_id,
            spider_name: spider_name.into(),
            run_type: JobRunType::OneTime,
            priority: JobPriority::Normal,
            enabled: MATERIALIZED_ONE_TIME,
            cron: CronFields::default(),
            throttle_concurrency: None,
            spider_arguments: None,
            overlapping: true,
            tags: None,
            description: None,
            date_created: now,
            date_modified: now,
        }
    }

    pub fn is_active_periodic(&self) -> bool {
        self.run_type == JobRunType::Periodic && self.enabled == ENABLED_PERIODIC
    }

    pub fn is_materialized(&self) -> bool {
        self.enabled < 0
    }

    /// 写入并发控制值，同时作为启动参数覆盖爬虫内部的并发设置
    pub fn apply_throttle(&mut self, throttle: f64) {
        self.throttle_concurrency = Some(throttle);
        self.spider_arguments = Some(format!("setting={AUTOTHROTTLE_SETTING}={throttle:?}"));
    }

    /// 解析启动参数，格式为逗号分隔的 `key=value`
    pub fn parsed_arguments(&self) -> Vec<(String, String)> {
        self.spider_arguments
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect()
    }
}
