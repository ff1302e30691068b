use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::RunLogRecord;

/// 运行日志仓储
///
/// 日志只追加，落库后不做任何更新。
pub struct RunLogRepository {
    pool: SqlitePool,
}

impl RunLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 追加一条日志
    pub async fn append(&self, record: &RunLogRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO run_logs
            (run_id, step_ordinal, level, message, screenshot_path, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.run_id)
        .bind(record.step_ordinal)
        .bind(&record.level)
        .bind(&record.message)
        .bind(&record.screenshot_path)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 按追加顺序批量写入
    pub async fn append_all(&self, records: &[RunLogRecord]) -> Result<()> {
        for record in records {
            self.append(record).await?;
        }
        Ok(())
    }

    /// 获取一次运行的全部日志 (按追加顺序)
    pub async fn get_for_run(&self, run_id: i64) -> Result<Vec<RunLogRecord>> {
        let records = sqlx::query_as::<_, RunLogRecord>(
            r#"
            SELECT id, run_id, step_ordinal, level, message, screenshot_path, timestamp
            FROM run_logs
            WHERE run_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
