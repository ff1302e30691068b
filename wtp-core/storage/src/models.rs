use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 测试运行数据库模型
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRecord {
    pub id: i64,
    pub case_id: i64,
    pub case_name: String,
    pub status: String, // 'Pending', 'Running', 'Passed', 'Failed', 'Skipped'
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub report_path: Option<String>,
    pub log_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 运行日志数据库模型 (追加后不再修改)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunLogRecord {
    pub id: i64,
    pub run_id: i64,
    pub step_ordinal: Option<i64>,
    pub level: String, // 'INFO', 'ERROR', 'CRITICAL'
    pub message: String,
    pub screenshot_path: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 运行查询条件
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub case_id: Option<i64>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
