//! WTP 存储层
//!
//! 引擎通过这里的窄接口写出运行记录和运行日志；
//! 用例/项目定义的 CRUD 属于外部协作方，不在此层。

mod connection;
mod error;
mod models;
mod repositories;

pub use connection::StorageManager;
pub use error::{Result, StorageError};
pub use models::*;
pub use repositories::*;

use sqlx::SqlitePool;

/// 统一的数据访问层入口
pub struct Storage {
    _pool: SqlitePool,
    runs: RunRepository,
    run_logs: RunLogRepository,
}

impl Storage {
    /// 从 StorageManager 创建 Storage
    pub fn from_manager(manager: &StorageManager) -> Self {
        let pool = manager.pool().clone();
        Self {
            _pool: pool.clone(),
            runs: RunRepository::new(pool.clone()),
            run_logs: RunLogRepository::new(pool),
        }
    }

    /// 获取运行仓储
    pub fn runs(&self) -> &RunRepository {
        &self.runs
    }

    /// 获取运行日志仓储
    pub fn run_logs(&self) -> &RunLogRepository {
        &self.run_logs
    }

    /// 获取数据库连接池
    pub fn pool(&self) -> &SqlitePool {
        &self._pool
    }
}
