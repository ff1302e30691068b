//! WTP 浏览器会话管理
//!
//! 负责单次运行的浏览器会话生命周期：按配置的引擎和无头模式建立
//! WebDriver 会话，提供截图采集，并在释放时落盘会话 trace。

mod session;
mod trace;

pub use session::{BrowserSession, SessionConfig};
pub use trace::{TraceEvent, TraceRecorder};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    /// 启动请求的引擎失败对整次运行是致命的，不做自动重试
    #[error("浏览器启动失败: {0}")]
    LaunchFailed(String),

    #[error("截图失败: {0}")]
    Screenshot(String),

    #[error("WebDriver 错误: {0}")]
    WebDriver(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BrowserError>;
