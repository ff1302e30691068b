//! 测试运行器
//!
//! 驱动一次用例执行：获取浏览器会话、按序号递增顺序解释步骤、
//! 累积日志条目、判定运行终态、持久化运行记录、释放会话。
//! 运行状态机: Pending → Running → {Passed, Failed, Skipped}，终态不再迁移。

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use wtp_browser::{BrowserSession, SessionConfig};
use wtp_common::{
    BulkRunReport, LogEntry, LogLevel, RunReport, RunSettings, RunStatus, StepOutcome, StepStatus,
    TestCase,
};
use wtp_storage::{RunLogRecord, RunRecord, Storage};

use crate::interpreter::Interpreter;
use crate::Result;

/// 失败处理策略
///
/// 默认首次失败即停止，其余步骤记为 Skipped。
/// 策略只在运行器的一处分支生效，便于未来按用例配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 首次失败即停止 (默认)
    #[default]
    StopOnFailure,
    /// 失败后继续执行剩余步骤
    ContinueOnFailure,
}

/// 运行器配置
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// 报告根目录，每次运行生成独立子目录
    pub reports_root: PathBuf,

    /// WebDriver 端点
    pub webdriver_url: String,

    /// 定位器等待超时
    pub locator_timeout: Duration,

    /// 失败处理策略
    pub policy: FailurePolicy,

    /// 是否记录会话 trace
    pub trace: bool,

    /// 批量执行的最大并发数 (避免浏览器资源耗尽)
    pub fanout: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            reports_root: PathBuf::from("reports"),
            webdriver_url: "http://localhost:4444".to_string(),
            locator_timeout: Duration::from_secs(10),
            policy: FailurePolicy::default(),
            trace: true,
            fanout: 4,
        }
    }
}

/// 运行日志缓冲
///
/// 同时维护内存中的 LogEntry 序列 (最终落库) 和每次运行的 run.log 文件。
/// 会话级子事件只写文件，LogEntry 与步骤一一对应。
/// 追加顺序下时间戳单调不减。
pub struct RunJournal {
    entries: Vec<LogEntry>,
    file: Option<std::io::BufWriter<std::fs::File>>,
    last_timestamp: DateTime<Utc>,
}

impl RunJournal {
    pub fn new(log_path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(log_path)?;
        Ok(Self {
            entries: Vec::new(),
            file: Some(std::io::BufWriter::new(file)),
            last_timestamp: Utc::now(),
        })
    }

    /// 仅内存缓冲，不写文件 (测试用)
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            file: None,
            last_timestamp: Utc::now(),
        }
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let ts = Utc::now().max(self.last_timestamp);
        self.last_timestamp = ts;
        ts
    }

    /// 追加一条 LogEntry 并同步写入日志文件
    pub fn append(
        &mut self,
        step_ordinal: Option<i32>,
        level: LogLevel,
        message: String,
        screenshot_path: Option<String>,
    ) {
        let timestamp = self.next_timestamp();
        self.write_line(timestamp, level.as_str(), &message);
        self.entries.push(LogEntry {
            step_ordinal,
            level,
            message,
            screenshot_path,
            timestamp,
        });
    }

    /// 会话级子事件，只进日志文件，不产生 LogEntry
    pub fn file_line(&mut self, level: &str, message: &str) {
        let timestamp = self.next_timestamp();
        self.write_line(timestamp, level, message);
    }

    fn write_line(&mut self, timestamp: DateTime<Utc>, level: &str, message: &str) {
        if let Some(file) = &mut self.file {
            let _ = writeln!(
                file,
                "{} - {} - {}",
                timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
                level,
                message
            );
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(mut self) -> Vec<LogEntry> {
        self.flush();
        self.entries
    }

    pub fn flush(&mut self) {
        if let Some(file) = &mut self.file {
            let _ = file.flush();
        }
    }
}

/// 测试运行器
pub struct TestRunner {
    config: RunnerConfig,
    storage: Option<Arc<Storage>>,
}

impl TestRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            storage: None,
        }
    }

    /// 设置数据库存储
    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// 执行单个测试用例
    ///
    /// 浏览器会话在所有退出路径上都会被释放；运行记录恰好终结一次。
    pub async fn run_case(&self, case: &TestCase, settings: &RunSettings) -> Result<RunReport> {
        let start_time = Utc::now();
        let started = Instant::now();

        info!("开始测试用例: '{}' (共 {} 步)", case.name, case.steps.len());

        // 为此运行创建唯一的产物目录
        let run_dir = self.config.reports_root.join(format!(
            "run_{}_{}",
            case.id,
            start_time.format("%Y%m%d_%H%M%S%3f")
        ));
        std::fs::create_dir_all(&run_dir)?;

        let log_path = run_dir.join("run.log");
        let mut journal = RunJournal::new(&log_path)?;
        journal.file_line(
            "INFO",
            &format!("开始测试用例: '{}' (共 {} 步)", case.name, case.steps.len()),
        );

        // 执行开始即落一条 Running 记录
        let run_id = match &self.storage {
            Some(storage) => {
                match storage
                    .runs()
                    .create_running(case.id, &case.name, start_time)
                    .await
                {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("创建运行记录失败: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        let session_config = SessionConfig {
            engine: settings.browser,
            headless: settings.headless,
            webdriver_url: self.config.webdriver_url.clone(),
            artifact_dir: run_dir.clone(),
            trace: self.config.trace,
        };

        let (status, steps, report_path) = match BrowserSession::launch(session_config).await {
            Err(e) => {
                // 启动失败对整次运行致命，终态为 Failed，错误信息进日志
                let message = format!("浏览器会话启动失败: {}", e);
                error!("{}", message);
                journal.append(None, LogLevel::Critical, message, None);
                (RunStatus::Failed, Vec::new(), None)
            }
            Ok(session) => {
                journal.file_line("INFO", "浏览器会话已建立");

                let (status, steps) = self
                    .execute_steps(case, settings, &session, &mut journal)
                    .await;

                journal.file_line("INFO", "正在释放浏览器会话");
                let report_path = match session.release().await {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("释放浏览器会话失败: {}", e);
                        journal.file_line("ERROR", &format!("释放浏览器会话失败: {}", e));
                        None
                    }
                };

                (status, steps, report_path)
            }
        };

        let end_time = Utc::now();
        let duration_ms = started.elapsed().as_millis().max(1) as u64;

        journal.file_line(
            "INFO",
            &format!("测试用例 '{}' 以状态 {} 完成", case.name, status.as_str()),
        );

        let report = RunReport {
            run_id,
            case_id: case.id,
            case_name: case.name.clone(),
            status,
            start_time,
            end_time,
            duration_ms,
            report_path: report_path.map(|p| p.display().to_string()),
            log_path: Some(log_path.display().to_string()),
            steps,
            logs: journal.into_entries(),
        };

        // 持久化终态；失败只告警，不影响运行结果
        if let (Some(storage), Some(run_id)) = (&self.storage, run_id) {
            if let Err(e) = finalize_run(storage, run_id, &report).await {
                warn!("保存运行结果失败: {}", e);
            }
        }

        info!(
            "测试用例 '{}' 完成: {} ({} ms)",
            case.name,
            report.status.as_str(),
            report.duration_ms
        );

        Ok(report)
    }

    /// 按序号递增顺序执行步骤
    ///
    /// 默认策略下首个失败之后的步骤记为 Skipped，不再进入解释器。
    async fn execute_steps(
        &self,
        case: &TestCase,
        settings: &RunSettings,
        session: &BrowserSession,
        journal: &mut RunJournal,
    ) -> (RunStatus, Vec<StepOutcome>) {
        let interpreter = Interpreter::new(session, &settings.base_url, self.config.locator_timeout);

        let mut outcomes = Vec::with_capacity(case.steps.len());
        let mut failed = false;

        for step in &case.steps {
            if failed && self.config.policy == FailurePolicy::StopOnFailure {
                let outcome = skipped_outcome(step.ordinal, step.display_description());
                journal.append(
                    Some(step.ordinal),
                    LogLevel::Info,
                    outcome.message.clone(),
                    None,
                );
                outcomes.push(outcome);
                continue;
            }

            let outcome = interpreter.execute_step(step).await;

            let level = match outcome.status {
                StepStatus::Passed => LogLevel::Info,
                _ => LogLevel::Error,
            };
            journal.append(
                Some(step.ordinal),
                level,
                outcome.message.clone(),
                outcome.screenshot_path.clone(),
            );

            if outcome.status == StepStatus::Failed {
                failed = true;
            }
            outcomes.push(outcome);
        }

        let status = if failed {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        };
        (status, outcomes)
    }

    /// 模块/项目级批量执行
    ///
    /// 按配置的并发上限扇出，聚合每个用例的报告。
    /// 单个用例失败默认不中断其余用例。
    pub async fn run_bulk(
        &self,
        label: &str,
        cases: &[TestCase],
        settings: &RunSettings,
    ) -> BulkRunReport {
        info!("开始批量执行: {} ({} 个用例)", label, cases.len());
        let started = Instant::now();

        let limit = self.config.fanout.max(1);
        let results: Vec<Result<RunReport>> = stream::iter(0..cases.len())
            .map(|i| async move { self.run_case(&cases[i], settings).await })
            .buffered(limit)
            .collect()
            .await;

        let mut reports = Vec::with_capacity(cases.len());
        let mut passed = 0;
        let mut failed = 0;

        for (case, result) in cases.iter().zip(results) {
            match result {
                Ok(report) => {
                    if report.passed() {
                        passed += 1;
                    } else {
                        failed += 1;
                    }
                    reports.push(report);
                }
                Err(e) => {
                    error!("用例 '{}' 执行失败: {}", case.name, e);
                    failed += 1;
                    reports.push(aborted_report(case, e.to_string()));
                }
            }
        }

        info!(
            "批量执行完成: {} - {}/{} 通过",
            label,
            passed,
            cases.len()
        );

        BulkRunReport {
            label: label.to_string(),
            total: cases.len(),
            passed,
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
            reports,
        }
    }
}

/// 首次失败后剩余步骤的 Skipped 结果
fn skipped_outcome(ordinal: i32, description: String) -> StepOutcome {
    StepOutcome {
        message: format!("SKIPPED: {} (此前步骤已失败)", description),
        ordinal,
        description,
        status: StepStatus::Skipped,
        screenshot_path: None,
        duration_ms: 0,
    }
}

/// 执行环节之外的故障 (产物目录、落库等) 的兜底失败报告
fn aborted_report(case: &TestCase, message: String) -> RunReport {
    let now = Utc::now();
    RunReport {
        run_id: None,
        case_id: case.id,
        case_name: case.name.clone(),
        status: RunStatus::Failed,
        start_time: now,
        end_time: now,
        duration_ms: 0,
        report_path: None,
        log_path: None,
        steps: Vec::new(),
        logs: vec![LogEntry {
            step_ordinal: None,
            level: LogLevel::Critical,
            message,
            screenshot_path: None,
            timestamp: now,
        }],
    }
}

/// 将报告的终态写回 Running 记录并追加日志
async fn finalize_run(storage: &Storage, run_id: i64, report: &RunReport) -> Result<()> {
    storage
        .runs()
        .finalize(
            run_id,
            report.status.as_str(),
            report.end_time,
            report.duration_ms as i64,
            report.report_path.as_deref(),
            report.log_path.as_deref(),
        )
        .await?;

    let records: Vec<RunLogRecord> = report
        .logs
        .iter()
        .map(|entry| log_entry_record(run_id, entry))
        .collect();
    storage.run_logs().append_all(&records).await?;

    Ok(())
}

/// 持久化一条代理上报的终态运行及其日志，返回运行 ID
pub async fn persist_report(storage: &Storage, report: &RunReport) -> Result<i64> {
    let record = RunRecord {
        id: 0,
        case_id: report.case_id,
        case_name: report.case_name.clone(),
        status: report.status.as_str().to_string(),
        start_time: report.start_time,
        end_time: Some(report.end_time),
        duration_ms: Some(report.duration_ms as i64),
        report_path: report.report_path.clone(),
        log_path: report.log_path.clone(),
        created_at: Utc::now(),
    };

    let run_id = storage.runs().insert_completed(&record).await?;

    let records: Vec<RunLogRecord> = report
        .logs
        .iter()
        .map(|entry| log_entry_record(run_id, entry))
        .collect();
    storage.run_logs().append_all(&records).await?;

    Ok(run_id)
}

fn log_entry_record(run_id: i64, entry: &LogEntry) -> RunLogRecord {
    RunLogRecord {
        id: 0,
        run_id,
        step_ordinal: entry.step_ordinal.map(|o| o as i64),
        level: entry.level.as_str().to_string(),
        message: entry.message.clone(),
        screenshot_path: entry.screenshot_path.clone(),
        timestamp: entry.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_timestamps_non_decreasing() {
        let mut journal = RunJournal::in_memory();

        for i in 1..=5 {
            journal.append(Some(i), LogLevel::Info, format!("step {}", i), None);
        }

        let entries = journal.entries();
        assert_eq!(entries.len(), 5);
        for pair in entries.windows(2) {
            assert!(pair[1].timestamp >= pair[0].timestamp);
        }
    }

    #[test]
    fn test_journal_file_lines_do_not_create_entries() {
        let mut journal = RunJournal::in_memory();

        journal.file_line("INFO", "会话建立");
        journal.append(Some(1), LogLevel::Info, "step 1".to_string(), None);
        journal.file_line("INFO", "会话释放");

        assert_eq!(journal.entries().len(), 1);
    }

    #[test]
    fn test_skipped_outcome_message() {
        let outcome = skipped_outcome(3, "fill on #name".to_string());
        assert_eq!(outcome.status, StepStatus::Skipped);
        assert_eq!(outcome.ordinal, 3);
        assert!(outcome.message.starts_with("SKIPPED"));
        assert_eq!(outcome.duration_ms, 0);
    }

    #[test]
    fn test_failure_policy_serde() {
        let policy: FailurePolicy = serde_json::from_str("\"stop_on_failure\"").unwrap();
        assert_eq!(policy, FailurePolicy::StopOnFailure);

        let policy: FailurePolicy = serde_json::from_str("\"continue_on_failure\"").unwrap();
        assert_eq!(policy, FailurePolicy::ContinueOnFailure);

        assert_eq!(FailurePolicy::default(), FailurePolicy::StopOnFailure);
    }
}
