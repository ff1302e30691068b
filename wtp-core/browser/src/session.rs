//! 浏览器会话
//!
//! 一次运行独占一个 WebDriver 会话。启动失败是致命错误；释放保证
//! 恰好关闭一次，并在关闭前落盘会话 trace。

use std::path::{Path, PathBuf};

use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use tracing::{info, warn};

use wtp_common::BrowserEngine;

use crate::trace::TraceRecorder;
use crate::{BrowserError, Result};

/// 会话配置
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 浏览器引擎
    pub engine: BrowserEngine,

    /// 无头模式
    pub headless: bool,

    /// WebDriver 端点 (例如 http://localhost:4444)
    pub webdriver_url: String,

    /// 本次运行的产物目录 (截图、trace)
    pub artifact_dir: PathBuf,

    /// 是否记录会话 trace
    pub trace: bool,
}

impl SessionConfig {
    pub fn new(
        engine: BrowserEngine,
        headless: bool,
        webdriver_url: impl Into<String>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            headless,
            webdriver_url: webdriver_url.into(),
            artifact_dir: artifact_dir.into(),
            trace: true,
        }
    }

    /// 按引擎和无头模式构造 WebDriver capabilities
    fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
        let caps = match self.engine {
            BrowserEngine::Chromium => {
                let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage", "--disable-gpu"];
                if self.headless {
                    args.push("--headless=new");
                }
                json!({
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                })
            }
            BrowserEngine::Firefox => {
                let args: Vec<&str> = if self.headless { vec!["-headless"] } else { vec![] };
                json!({
                    "browserName": "firefox",
                    "moz:firefoxOptions": { "args": args }
                })
            }
            BrowserEngine::Webkit => {
                if self.headless {
                    // safaridriver 不支持无头参数，按有头会话继续
                    warn!("webkit 引擎不支持无头模式，忽略 headless 配置");
                }
                json!({ "browserName": "safari" })
            }
        };

        caps.as_object().cloned().unwrap_or_default()
    }
}

/// 浏览器会话
///
/// 持有 WebDriver 客户端句柄和本次运行的产物目录。
pub struct BrowserSession {
    client: Client,
    engine: BrowserEngine,
    artifact_dir: PathBuf,
    screenshots_dir: PathBuf,
    trace: Option<TraceRecorder>,
}

impl BrowserSession {
    /// 建立新会话
    ///
    /// 连接/能力协商失败映射为 `BrowserError::LaunchFailed`，由调用方
    /// 将整次运行置为失败，不做重试。
    pub async fn launch(config: SessionConfig) -> Result<Self> {
        info!(
            "正在启动浏览器会话: engine={}, headless={}, endpoint={}",
            config.engine, config.headless, config.webdriver_url
        );

        std::fs::create_dir_all(&config.artifact_dir)?;
        let screenshots_dir = config.artifact_dir.join("screenshots");
        std::fs::create_dir_all(&screenshots_dir)?;

        let mut builder = ClientBuilder::rustls()
            .map_err(|e| BrowserError::LaunchFailed(format!("初始化 TLS 连接器失败: {}", e)))?;
        builder.capabilities(config.capabilities());

        let endpoint = config.webdriver_url.trim_end_matches('/');
        let client = builder.connect(endpoint).await.map_err(|e| {
            BrowserError::LaunchFailed(format!(
                "无法在 {} 建立 {} 会话: {}",
                endpoint, config.engine, e
            ))
        })?;

        info!("浏览器会话已建立: {}", config.engine);

        let trace = if config.trace {
            let recorder = TraceRecorder::new(config.engine.as_str());
            recorder.record("session_start", format!("headless={}", config.headless));
            Some(recorder)
        } else {
            None
        };

        Ok(Self {
            client,
            engine: config.engine,
            artifact_dir: config.artifact_dir,
            screenshots_dir,
            trace,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn engine(&self) -> BrowserEngine {
        self.engine
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// 追加一条会话 trace 事件
    pub fn trace_event(&self, kind: &str, detail: impl Into<String>) {
        if let Some(trace) = &self.trace {
            trace.record(kind, detail);
        }
    }

    /// 截图并保存到 screenshots 子目录，返回落盘路径
    pub async fn screenshot(&self, filename: &str) -> Result<PathBuf> {
        let png = self
            .client
            .screenshot()
            .await
            .map_err(|e| BrowserError::Screenshot(e.to_string()))?;

        let path = self.screenshots_dir.join(filename);
        std::fs::write(&path, &png)?;

        self.trace_event("screenshot", path.display().to_string());
        info!("截图已保存到 {}", path.display());
        Ok(path)
    }

    /// 释放会话
    ///
    /// 消费 self，保证 WebDriver 会话恰好关闭一次；trace 在关闭前落盘。
    /// 返回 trace 归档路径 (未启用 trace 时为 None)。
    pub async fn release(self) -> Result<Option<PathBuf>> {
        let trace_path = match &self.trace {
            Some(trace) => {
                trace.record("session_end", "");
                match trace.flush(&self.artifact_dir) {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("写入会话 trace 失败: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        self.client
            .close()
            .await
            .map_err(|e| BrowserError::WebDriver(format!("关闭会话失败: {}", e)))?;

        info!("浏览器会话已关闭");
        Ok(trace_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chromium_headless_capabilities() {
        let config = SessionConfig::new(
            BrowserEngine::Chromium,
            true,
            "http://localhost:4444",
            "/tmp/wtp-test",
        );

        let caps = config.capabilities();
        assert_eq!(caps["browserName"], "chrome");
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
    }

    #[test]
    fn test_firefox_headed_capabilities() {
        let config = SessionConfig::new(
            BrowserEngine::Firefox,
            false,
            "http://localhost:4444",
            "/tmp/wtp-test",
        );

        let caps = config.capabilities();
        assert_eq!(caps["browserName"], "firefox");
        let args = caps["moz:firefoxOptions"]["args"].as_array().unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn test_webkit_capabilities() {
        let config = SessionConfig::new(
            BrowserEngine::Webkit,
            true,
            "http://localhost:4444",
            "/tmp/wtp-test",
        );

        let caps = config.capabilities();
        assert_eq!(caps["browserName"], "safari");
    }
}
