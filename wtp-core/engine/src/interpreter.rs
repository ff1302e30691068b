//! 关键词解释器
//!
//! 将单个步骤 (关键词 + 定位器 + 参数值) 作用到浏览器会话上。
//! 步骤级失败在本地回收为 Failed 结果并附带失败截图，不向上传播。

use std::time::{Duration, Instant};

use fantoccini::elements::Element;
use fantoccini::Locator;
use tracing::{info, warn};

use wtp_browser::BrowserSession;
use wtp_common::{Step, StepOutcome, StepStatus};

use crate::keyword::Keyword;
use crate::{EngineError, Result};

/// 关键词解释器
///
/// 每次运行构造一个实例，借用该运行的浏览器会话。
pub struct Interpreter<'a> {
    session: &'a BrowserSession,
    base_url: &'a str,
    locator_timeout: Duration,
}

impl<'a> Interpreter<'a> {
    pub fn new(session: &'a BrowserSession, base_url: &'a str, locator_timeout: Duration) -> Self {
        Self {
            session,
            base_url,
            locator_timeout,
        }
    }

    /// 执行单个测试步骤
    ///
    /// 失败时先通过会话采集 `step_<ordinal>_failure.png` 再返回结果。
    pub async fn execute_step(&self, step: &Step) -> StepOutcome {
        let description = step.display_description();
        let started = Instant::now();

        info!("执行步骤 {}: {}", step.ordinal, description);

        match self.dispatch(step).await {
            Ok(screenshot_path) => {
                let message = format!("SUCCESS: {}", description);
                info!("{}", message);
                StepOutcome {
                    ordinal: step.ordinal,
                    description,
                    status: StepStatus::Passed,
                    message,
                    screenshot_path,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                let message = format!("FAILURE: {}. 错误: {}", description, e);
                tracing::error!("{}", message);

                let screenshot_path = self.capture_failure(step).await;

                StepOutcome {
                    ordinal: step.ordinal,
                    description,
                    status: StepStatus::Failed,
                    message,
                    screenshot_path,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    /// 失败现场截图，截图失败不影响步骤结果
    async fn capture_failure(&self, step: &Step) -> Option<String> {
        let filename = format!("step_{}_failure.png", step.ordinal);
        match self.session.screenshot(&filename).await {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                warn!("采集失败截图失败: {}", e);
                None
            }
        }
    }

    /// 关键词分发
    ///
    /// 返回非失败截图路径 (仅 screenshot 关键词产生)。
    async fn dispatch(&self, step: &Step) -> Result<Option<String>> {
        let keyword = Keyword::parse(&step.keyword)?;
        let locator = step.locator.as_deref().filter(|s| !s.is_empty());
        let value = step.value.as_deref();

        match keyword {
            Keyword::Goto => self.goto(value).await.map(|_| None),
            Keyword::Click => self.click(locator).await.map(|_| None),
            Keyword::Fill => self.fill(locator, value).await.map(|_| None),
            Keyword::Press => self.press(locator, value).await.map(|_| None),
            Keyword::SelectOption => self.select_option(locator, value).await.map(|_| None),
            Keyword::WaitForSelector => self.wait_for_selector(locator).await.map(|_| None),
            Keyword::WaitForUrl => self.wait_for_url(value).await.map(|_| None),
            Keyword::ExpectText => self.expect_text(locator, value).await.map(|_| None),
            Keyword::ExpectTitle => self.expect_title(value).await.map(|_| None),
            Keyword::Screenshot => self.take_screenshot(value).await.map(Some),
        }
    }

    /// 以 `/` 或 `(` 开头的定位器按 XPath 处理，其余按 CSS 选择器
    fn resolve_locator(raw: &str) -> Locator<'_> {
        if raw.starts_with('/') || raw.starts_with('(') {
            Locator::XPath(raw)
        } else {
            Locator::Css(raw)
        }
    }

    /// 在定位超时内等待元素出现，超时映射为 LocatorTimeout
    async fn find(&self, raw: &str) -> Result<Element> {
        self.session
            .client()
            .wait()
            .at_most(self.locator_timeout)
            .for_element(Self::resolve_locator(raw))
            .await
            .map_err(|e| EngineError::LocatorTimeout {
                locator: raw.to_string(),
                detail: e.to_string(),
            })
    }

    fn require<'v>(
        param: Option<&'v str>,
        keyword: &'static str,
        name: &'static str,
    ) -> Result<&'v str> {
        param.ok_or(EngineError::MissingParam {
            keyword,
            param: name,
        })
    }

    async fn goto(&self, value: Option<&str>) -> Result<()> {
        let value = Self::require(value, "goto", "value")?;

        let url = if value.starts_with("http") {
            value.to_string()
        } else {
            format!("{}{}", self.base_url, value)
        };

        self.session
            .client()
            .goto(&url)
            .await
            .map_err(|e| EngineError::Automation(format!("导航到 {} 失败: {}", url, e)))?;

        // 等待 body 可见，确保页面内容已渲染
        self.find("body").await?;

        self.session.trace_event("navigate", url);
        Ok(())
    }

    async fn click(&self, locator: Option<&str>) -> Result<()> {
        let locator = Self::require(locator, "click", "locator")?;

        let element = self.find(locator).await?;
        element
            .click()
            .await
            .map_err(|e| EngineError::Automation(format!("点击 {} 失败: {}", locator, e)))?;

        self.session.trace_event("click", locator);
        Ok(())
    }

    async fn fill(&self, locator: Option<&str>, value: Option<&str>) -> Result<()> {
        let locator = Self::require(locator, "fill", "locator")?;
        let value = Self::require(value, "fill", "value")?;

        let element = self.find(locator).await?;
        element
            .clear()
            .await
            .map_err(|e| EngineError::Automation(format!("清空 {} 失败: {}", locator, e)))?;
        element
            .send_keys(value)
            .await
            .map_err(|e| EngineError::Automation(format!("输入到 {} 失败: {}", locator, e)))?;

        self.session.trace_event("fill", locator);
        Ok(())
    }

    async fn press(&self, locator: Option<&str>, value: Option<&str>) -> Result<()> {
        let locator = Self::require(locator, "press", "locator")?;
        let value = Self::require(value, "press", "value")?;

        let element = self.find(locator).await?;
        let key = webdriver_key(value);
        element
            .send_keys(&key)
            .await
            .map_err(|e| EngineError::Automation(format!("向 {} 发送按键失败: {}", locator, e)))?;

        self.session.trace_event("press", format!("{} <- {}", locator, value));
        Ok(())
    }

    async fn select_option(&self, locator: Option<&str>, value: Option<&str>) -> Result<()> {
        let locator = Self::require(locator, "select_option", "locator")?;
        let value = Self::require(value, "select_option", "value")?;

        let element = self.find(locator).await?;
        element
            .select_by_value(value)
            .await
            .map_err(|e| EngineError::Automation(format!("选择选项 {} 失败: {}", value, e)))?;

        self.session.trace_event("select_option", locator);
        Ok(())
    }

    async fn wait_for_selector(&self, locator: Option<&str>) -> Result<()> {
        let locator = Self::require(locator, "wait_for_selector", "locator")?;
        self.find(locator).await?;
        self.session.trace_event("wait_for_selector", locator);
        Ok(())
    }

    /// 轮询当前 URL 直到包含期望片段或超时
    async fn wait_for_url(&self, value: Option<&str>) -> Result<()> {
        let value = Self::require(value, "wait_for_url", "value")?;
        let deadline = Instant::now() + self.locator_timeout;

        loop {
            let url = self
                .session
                .client()
                .current_url()
                .await
                .map_err(|e| EngineError::Automation(format!("读取当前 URL 失败: {}", e)))?;

            if url.as_str().contains(value) {
                self.session.trace_event("wait_for_url", url.as_str());
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(EngineError::LocatorTimeout {
                    locator: value.to_string(),
                    detail: format!("当前 URL 为 {}", url),
                });
            }

            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn expect_text(&self, locator: Option<&str>, value: Option<&str>) -> Result<()> {
        let locator = Self::require(locator, "expect_text", "locator")?;
        let value = Self::require(value, "expect_text", "value")?;

        let element = self.find(locator).await?;
        let actual = element
            .text()
            .await
            .map_err(|e| EngineError::Automation(format!("读取 {} 的文本失败: {}", locator, e)))?;

        if actual.trim() != value {
            return Err(EngineError::Automation(format!(
                "文本断言失败: 期望 '{}', 实际 '{}'",
                value,
                actual.trim()
            )));
        }

        self.session.trace_event("expect_text", locator);
        Ok(())
    }

    async fn expect_title(&self, value: Option<&str>) -> Result<()> {
        let value = Self::require(value, "expect_title", "value")?;

        let actual = self
            .session
            .client()
            .title()
            .await
            .map_err(|e| EngineError::Automation(format!("读取页面标题失败: {}", e)))?;

        if actual != value {
            return Err(EngineError::Automation(format!(
                "标题断言失败: 期望 '{}', 实际 '{}'",
                value, actual
            )));
        }

        self.session.trace_event("expect_title", value);
        Ok(())
    }

    async fn take_screenshot(&self, value: Option<&str>) -> Result<String> {
        let filename = match value {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("screenshot_{}.png", chrono::Utc::now().timestamp()),
        };

        let path = self.session.screenshot(&filename).await?;
        Ok(path.display().to_string())
    }
}

/// 将按键名映射为 WebDriver 按键码，未知名称原样透传
fn webdriver_key(name: &str) -> String {
    let key = match name.to_lowercase().as_str() {
        "enter" => '\u{e007}',
        "tab" => '\u{e004}',
        "escape" | "esc" => '\u{e00c}',
        "backspace" => '\u{e003}',
        "delete" => '\u{e017}',
        "space" => '\u{e00d}',
        "arrowup" | "up" => '\u{e013}',
        "arrowdown" | "down" => '\u{e015}',
        "arrowleft" | "left" => '\u{e012}',
        "arrowright" | "right" => '\u{e014}',
        "home" => '\u{e011}',
        "end" => '\u{e010}',
        "pageup" => '\u{e00e}',
        "pagedown" => '\u{e00f}',
        _ => return name.to_string(),
    };
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_locator_xpath() {
        assert!(matches!(
            Interpreter::resolve_locator("//div[@id='x']"),
            Locator::XPath(_)
        ));
        assert!(matches!(
            Interpreter::resolve_locator("(//a)[1]"),
            Locator::XPath(_)
        ));
    }

    #[test]
    fn test_resolve_locator_css() {
        assert!(matches!(
            Interpreter::resolve_locator("#submit"),
            Locator::Css(_)
        ));
        assert!(matches!(
            Interpreter::resolve_locator("input[name=q]"),
            Locator::Css(_)
        ));
    }

    #[test]
    fn test_webdriver_key_mapping() {
        assert_eq!(webdriver_key("Enter"), "\u{e007}");
        assert_eq!(webdriver_key("TAB"), "\u{e004}");
        // 未知按键名原样透传 (作为字面输入)
        assert_eq!(webdriver_key("a"), "a");
    }

    #[test]
    fn test_require_missing_param() {
        let err = Interpreter::require(None, "fill", "value").unwrap_err();
        assert!(matches!(err, EngineError::MissingParam { .. }));
        assert!(err.to_string().contains("fill"));
    }
}
