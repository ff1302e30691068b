//! WTP 通用类型定义
//!
//! 此 crate 包含服务端 (http-api/fleet) 和远程执行代理 (wtp-agent)
//! 之间共享的数据模型与协议类型。

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

// ========================================
// 测试用例数据模型 (由外部 CRUD 层物化后只读传入)
// ========================================

/// 浏览器引擎类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserEngine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserEngine::Chromium),
            "firefox" => Ok(BrowserEngine::Firefox),
            "webkit" | "safari" => Ok(BrowserEngine::Webkit),
            other => Err(format!(
                "不支持的浏览器类型: {} (可选: chromium/firefox/webkit)",
                other
            )),
        }
    }
}

impl std::fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 测试步骤
///
/// 步骤是引擎的只读输入，`ordinal` 在用例内严格递增。
/// `keyword` 保持为标签字符串，在解释执行时再解析为封闭的关键词枚举，
/// 未知标签在执行阶段报 UnsupportedKeyword。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// 步骤序号 (用例内严格递增)
    pub ordinal: i32,

    /// 关键词标签 (goto/click/fill/...)
    pub keyword: String,

    /// 元素定位器 (CSS 选择器或 XPath)
    #[serde(default)]
    pub locator: Option<String>,

    /// 参数值 (URL、输入文本、期望文本等)
    #[serde(default)]
    pub value: Option<String>,

    /// 人类可读的步骤描述
    #[serde(default)]
    pub description: Option<String>,
}

impl Step {
    /// 步骤的显示描述，缺省时由关键词和定位器拼出
    pub fn display_description(&self) -> String {
        if let Some(desc) = &self.description {
            return desc.clone();
        }
        match &self.locator {
            Some(locator) => format!("{} on {}", self.keyword, locator),
            None => self.keyword.clone(),
        }
    }
}

/// 测试用例
///
/// 归属一个项目，可选归属一个模块；执行期间不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
    #[serde(default)]
    pub module_id: Option<i64>,
    pub steps: Vec<Step>,
}

impl TestCase {
    /// 从 YAML 文件加载用例
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// 从 YAML 字符串加载用例
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ModelError::Serde(e.to_string()))
    }

    /// 从 JSON 字符串加载用例
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ModelError::Serde(e.to_string()))
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ModelError::Serde(e.to_string()))
    }
}

/// 项目级运行设置 (由持久层/CRUD 提供的项目默认配置)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// 相对 URL 的前缀
    #[serde(default)]
    pub base_url: String,

    /// 浏览器引擎
    #[serde(default)]
    pub browser: BrowserEngine,

    /// 无头模式
    #[serde(default = "default_headless")]
    pub headless: bool,
}

fn default_headless() -> bool {
    true
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            browser: BrowserEngine::default(),
            headless: true,
        }
    }
}

// ========================================
// 运行结果模型
// ========================================

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl RunStatus {
    /// 终态一经进入不再迁移
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Passed | RunStatus::Failed | RunStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Passed => "Passed",
            RunStatus::Failed => "Failed",
            RunStatus::Skipped => "Skipped",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(RunStatus::Pending),
            "Running" => Ok(RunStatus::Running),
            "Passed" => Ok(RunStatus::Passed),
            "Failed" => Ok(RunStatus::Failed),
            "Skipped" => Ok(RunStatus::Skipped),
            other => Err(format!("未知的运行状态: {}", other)),
        }
    }
}

/// 步骤执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

/// 运行日志条目 (追加后不再修改)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// 关联的步骤序号 (会话级事件为 None)
    pub step_ordinal: Option<i32>,

    pub level: LogLevel,

    pub message: String,

    /// 失败截图路径
    #[serde(default)]
    pub screenshot_path: Option<String>,

    pub timestamp: DateTime<Utc>,
}

/// 单个步骤的执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub ordinal: i32,
    pub description: String,
    pub status: StepStatus,
    pub message: String,
    #[serde(default)]
    pub screenshot_path: Option<String>,
    pub duration_ms: u64,
}

/// 一次用例执行的完整报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// 持久化后的运行 ID (代理侧本地执行时为 None)
    #[serde(default)]
    pub run_id: Option<i64>,

    pub case_id: i64,
    pub case_name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,

    /// 报告产物路径 (会话 trace 归档)
    #[serde(default)]
    pub report_path: Option<String>,

    /// 运行日志文件路径
    #[serde(default)]
    pub log_path: Option<String>,

    pub steps: Vec<StepOutcome>,
    pub logs: Vec<LogEntry>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

/// 模块/项目级批量执行的聚合报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRunReport {
    pub label: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub reports: Vec<RunReport>,
}

// ========================================
// 代理协议类型
// ========================================

/// 代理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Busy,
    Offline,
}

/// 代理信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: Uuid,
    pub name: String,
    pub hostname: String,
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,

    /// 当前在途命令 (最多一个)
    #[serde(default)]
    pub current_command: Option<Uuid>,
}

/// 代理注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// 代理注册响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub agent_id: Uuid,
}

/// 命令类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    RunCase,
    RunModule,
    RunProject,
}

/// 命令状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Dispatched,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }
}

/// 派发的工作单元载荷
///
/// 用例定义由服务端物化后随命令下发，代理侧无需访问 CRUD 层。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkSpec {
    RunCase {
        case: TestCase,
        settings: RunSettings,
    },
    RunModule {
        module_id: i64,
        cases: Vec<TestCase>,
        settings: RunSettings,
    },
    RunProject {
        project_id: i64,
        cases: Vec<TestCase>,
        settings: RunSettings,
    },
}

impl WorkSpec {
    pub fn kind(&self) -> CommandKind {
        match self {
            WorkSpec::RunCase { .. } => CommandKind::RunCase,
            WorkSpec::RunModule { .. } => CommandKind::RunModule,
            WorkSpec::RunProject { .. } => CommandKind::RunProject,
        }
    }

    /// 载荷中包含的用例列表
    pub fn cases(&self) -> Vec<&TestCase> {
        match self {
            WorkSpec::RunCase { case, .. } => vec![case],
            WorkSpec::RunModule { cases, .. } | WorkSpec::RunProject { cases, .. } => {
                cases.iter().collect()
            }
        }
    }

    pub fn settings(&self) -> &RunSettings {
        match self {
            WorkSpec::RunCase { settings, .. }
            | WorkSpec::RunModule { settings, .. }
            | WorkSpec::RunProject { settings, .. } => settings,
        }
    }

    /// 批量执行时的显示标签
    pub fn label(&self) -> String {
        match self {
            WorkSpec::RunCase { case, .. } => format!("case:{}", case.name),
            WorkSpec::RunModule { module_id, .. } => format!("module:{}", module_id),
            WorkSpec::RunProject { project_id, .. } => format!("project:{}", project_id),
        }
    }
}

/// 派发给代理的命令
///
/// 命令在整个生命周期内归属同一个代理；由代理的轮询恰好消费一次。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub kind: CommandKind,
    pub work: WorkSpec,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,

    /// 终态附加信息 (失败原因等)
    #[serde(default)]
    pub message: Option<String>,
}

/// 代理上报的命令执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command_id: Uuid,
    pub success: bool,
    pub message: String,
    pub runs: Vec<RunReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_yaml_roundtrip() {
        let case = TestCase {
            id: 7,
            name: "login-flow".to_string(),
            project_id: 1,
            module_id: Some(2),
            steps: vec![
                Step {
                    ordinal: 1,
                    keyword: "goto".to_string(),
                    locator: None,
                    value: Some("/login".to_string()),
                    description: Some("打开登录页".to_string()),
                },
                Step {
                    ordinal: 2,
                    keyword: "fill".to_string(),
                    locator: Some("#username".to_string()),
                    value: Some("admin".to_string()),
                    description: None,
                },
            ],
        };

        let yaml = case.to_yaml().unwrap();
        let parsed = TestCase::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.name, case.name);
        assert_eq!(parsed.steps.len(), 2);
        assert_eq!(parsed.steps[1].keyword, "fill");
    }

    #[test]
    fn test_step_display_description() {
        let step = Step {
            ordinal: 1,
            keyword: "click".to_string(),
            locator: Some("#submit".to_string()),
            value: None,
            description: None,
        };
        assert_eq!(step.display_description(), "click on #submit");

        let named = Step {
            description: Some("提交表单".to_string()),
            ..step
        };
        assert_eq!(named.display_description(), "提交表单");
    }

    #[test]
    fn test_browser_engine_parsing() {
        assert_eq!("chromium".parse::<BrowserEngine>().unwrap(), BrowserEngine::Chromium);
        assert_eq!("FIREFOX".parse::<BrowserEngine>().unwrap(), BrowserEngine::Firefox);
        assert_eq!("safari".parse::<BrowserEngine>().unwrap(), BrowserEngine::Webkit);
        assert!("ie6".parse::<BrowserEngine>().is_err());
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Passed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_work_spec_json_roundtrip() {
        let work = WorkSpec::RunCase {
            case: TestCase {
                id: 1,
                name: "smoke".to_string(),
                project_id: 1,
                module_id: None,
                steps: vec![],
            },
            settings: RunSettings::default(),
        };

        let json = serde_json::to_string(&work).unwrap();
        assert!(json.contains("run_case"));

        let parsed: WorkSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind(), CommandKind::RunCase);
        assert_eq!(parsed.cases().len(), 1);
    }
}
