use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::models::{RunFilter, RunRecord};

/// 测试运行仓储
pub struct RunRepository {
    pool: SqlitePool,
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建一条 Running 状态的运行记录 (执行开始时落库)
    pub async fn create_running(
        &self,
        case_id: i64,
        case_name: &str,
        start_time: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO test_runs (case_id, case_name, status, start_time, created_at)
            VALUES (?, ?, 'Running', ?, ?)
            "#,
        )
        .bind(case_id)
        .bind(case_name)
        .bind(start_time)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let run_id = result.last_insert_rowid();
        debug!("Created running test run with ID: {}", run_id);

        Ok(run_id)
    }

    /// 写入运行终态
    ///
    /// 仅当记录仍处于 Running 状态时生效，重试安全 (恰好终结一次)。
    /// 返回本次调用是否实际完成了终结。
    pub async fn finalize(
        &self,
        id: i64,
        status: &str,
        end_time: DateTime<Utc>,
        duration_ms: i64,
        report_path: Option<&str>,
        log_path: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE test_runs
            SET status = ?, end_time = ?, duration_ms = ?, report_path = ?, log_path = ?
            WHERE id = ? AND status = 'Running'
            "#,
        )
        .bind(status)
        .bind(end_time)
        .bind(duration_ms)
        .bind(report_path)
        .bind(log_path)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let finalized = result.rows_affected() > 0;
        if finalized {
            debug!("Finalized test run {} with status {}", id, status);
        }

        Ok(finalized)
    }

    /// 直接插入一条终态运行记录 (代理上报的远程运行)
    pub async fn insert_completed(&self, record: &RunRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO test_runs
            (case_id, case_name, status, start_time, end_time, duration_ms,
             report_path, log_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.case_id)
        .bind(&record.case_name)
        .bind(&record.status)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.duration_ms)
        .bind(&record.report_path)
        .bind(&record.log_path)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 根据ID获取运行记录
    pub async fn get_by_id(&self, id: i64) -> Result<Option<RunRecord>> {
        let record = sqlx::query_as::<_, RunRecord>(
            r#"
            SELECT id, case_id, case_name, status, start_time, end_time, duration_ms,
                   report_path, log_path, created_at
            FROM test_runs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// 查询运行列表 (按开始时间倒序)
    pub async fn list(&self, filter: &RunFilter) -> Result<Vec<RunRecord>> {
        let mut query = String::from(
            r#"
            SELECT id, case_id, case_name, status, start_time, end_time, duration_ms,
                   report_path, log_path, created_at
            FROM test_runs
            WHERE 1=1
            "#,
        );

        let mut bindings = Vec::new();

        if let Some(case_id) = filter.case_id {
            query.push_str(" AND case_id = ?");
            bindings.push(case_id.to_string());
        }

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.clone());
        }

        query.push_str(" ORDER BY start_time DESC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = filter.offset {
            query.push_str(&format!(" OFFSET {}", offset));
        }

        let mut sql_query = sqlx::query_as::<_, RunRecord>(&query);

        for binding in &bindings {
            sql_query = sql_query.bind(binding);
        }

        let records = sql_query.fetch_all(&self.pool).await?;

        Ok(records)
    }

    /// 获取运行总数
    pub async fn count(&self, filter: &RunFilter) -> Result<i64> {
        let mut query = String::from("SELECT COUNT(*) FROM test_runs WHERE 1=1");

        let mut bindings = Vec::new();

        if let Some(case_id) = filter.case_id {
            query.push_str(" AND case_id = ?");
            bindings.push(case_id.to_string());
        }

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.clone());
        }

        let mut sql_query = sqlx::query_as::<_, (i64,)>(&query);

        for binding in &bindings {
            sql_query = sql_query.bind(binding);
        }

        let (count,) = sql_query.fetch_one(&self.pool).await?;

        Ok(count)
    }

    /// 删除运行记录(级联删除日志)
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM test_runs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("Run {} not found", id)));
        }

        debug!("Deleted test run {}", id);

        Ok(())
    }
}
