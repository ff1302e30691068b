//! CLI 配置管理
//!
//! **数据存储方式**: TOML 文件 (~/.config/wtp/config.toml)
//! 命令行参数优先于配置文件，配置文件优先于内置默认值。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// CLI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// 服务端地址
    pub server_url: String,

    /// SQLite 数据库路径
    pub db_path: String,

    /// 报告根目录
    pub reports_dir: String,

    /// WebDriver 端点
    pub webdriver_url: String,

    /// 相对 URL 前缀 (项目默认)
    #[serde(default)]
    pub base_url: String,

    /// 默认浏览器引擎
    #[serde(default = "default_browser")]
    pub browser: String,

    /// 默认无头模式
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// 配置版本
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_browser() -> String {
    "chromium".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            db_path: "~/.config/wtp/wtp.db".to_string(),
            reports_dir: "reports".to_string(),
            webdriver_url: "http://localhost:4444".to_string(),
            base_url: String::new(),
            browser: default_browser(),
            headless: default_headless(),
            version: default_version(),
        }
    }
}

impl CliConfig {
    /// 获取配置文件路径
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("无法获取用户主目录")?;
        Ok(home.join(".config").join("wtp").join("config.toml"))
    }

    /// 加载配置
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;

        Ok(config)
    }

    /// 保存配置
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建配置目录失败: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(&path, content)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.browser, "chromium");
        assert!(config.headless);
        assert_eq!(config.server_url, "http://localhost:8000");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = CliConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: CliConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.webdriver_url, config.webdriver_url);
        assert_eq!(parsed.headless, config.headless);
    }
}
