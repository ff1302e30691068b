//! WTP 执行引擎
//!
//! 关键词测试执行引擎：将用例的有序步骤经由关键词解释器作用到
//! 浏览器会话上，产出运行报告与日志。

pub mod interpreter;
pub mod keyword;
pub mod runner;

pub use interpreter::Interpreter;
pub use keyword::{Keyword, KeywordDefinition};
pub use runner::{persist_report, FailurePolicy, RunJournal, RunnerConfig, TestRunner};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("不支持的关键词: {keyword}")]
    UnsupportedKeyword { keyword: String },

    #[error("关键词 '{keyword}' 缺少必需参数 '{param}'")]
    MissingParam {
        keyword: &'static str,
        param: &'static str,
    },

    #[error("定位器等待超时: {locator} ({detail})")]
    LocatorTimeout { locator: String, detail: String },

    #[error(transparent)]
    Browser(#[from] wtp_browser::BrowserError),

    #[error("浏览器自动化错误: {0}")]
    Automation(String),

    #[error("数据库错误: {0}")]
    Storage(#[from] wtp_storage::StorageError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
