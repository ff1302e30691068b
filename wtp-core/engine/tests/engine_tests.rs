//! Engine 模块测试
//!
//! WebDriver 不可达时的致命路径可以离线验证：会话启动失败
//! 必须把整次运行置为 Failed 并恰好终结一次运行记录。

use std::sync::Arc;
use std::time::Duration;

use wtp_common::{LogLevel, RunSettings, RunStatus, Step, TestCase};
use wtp_engine::{FailurePolicy, RunnerConfig, TestRunner};
use wtp_storage::{RunFilter, Storage, StorageManager};

fn sample_case() -> TestCase {
    TestCase {
        id: 11,
        name: "login-smoke".to_string(),
        project_id: 1,
        module_id: None,
        steps: vec![
            Step {
                ordinal: 1,
                keyword: "goto".to_string(),
                locator: None,
                value: Some("/login".to_string()),
                description: None,
            },
            Step {
                ordinal: 2,
                keyword: "click".to_string(),
                locator: Some("#submit".to_string()),
                value: None,
                description: None,
            },
        ],
    }
}

/// 指向不可达端点的运行器配置
fn offline_config(reports_root: &std::path::Path) -> RunnerConfig {
    RunnerConfig {
        reports_root: reports_root.to_path_buf(),
        // 无服务监听的端口，连接立即被拒绝
        webdriver_url: "http://127.0.0.1:9".to_string(),
        locator_timeout: Duration::from_secs(1),
        policy: FailurePolicy::StopOnFailure,
        trace: true,
        fanout: 2,
    }
}

#[tokio::test]
async fn test_launch_failure_is_fatal_to_run() {
    let dir = tempfile::tempdir().unwrap();
    let runner = TestRunner::new(offline_config(dir.path()));

    let case = sample_case();
    let report = runner
        .run_case(&case, &RunSettings::default())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.duration_ms > 0);
    assert!(report.end_time >= report.start_time);

    // 会话未建立，步骤不进入解释器
    assert!(report.steps.is_empty());

    // 启动失败以 Critical 日志条目呈现
    assert_eq!(report.logs.len(), 1);
    assert_eq!(report.logs[0].level, LogLevel::Critical);
    assert!(report.logs[0].message.contains("浏览器会话启动失败"));

    // run.log 文件已生成
    let log_path = report.log_path.as_deref().unwrap();
    assert!(std::path::Path::new(log_path).exists());
}

#[tokio::test]
async fn test_launch_failure_finalizes_run_record() {
    let dir = tempfile::tempdir().unwrap();

    let manager = StorageManager::new_in_memory().await.unwrap();
    let storage = Arc::new(Storage::from_manager(&manager));

    let runner = TestRunner::new(offline_config(dir.path())).with_storage(Arc::clone(&storage));

    let case = sample_case();
    let report = runner
        .run_case(&case, &RunSettings::default())
        .await
        .unwrap();

    let run_id = report.run_id.expect("运行记录应已创建");

    let record = storage.runs().get_by_id(run_id).await.unwrap().unwrap();
    assert_eq!(record.status, "Failed");
    assert_eq!(record.case_id, 11);
    assert!(record.end_time.unwrap() >= record.start_time);
    assert!(record.duration_ms.unwrap() > 0);

    let logs = storage.run_logs().get_for_run(run_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, "CRITICAL");
}

#[tokio::test]
async fn test_bulk_run_aggregates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let runner = TestRunner::new(offline_config(dir.path()));

    let cases = vec![sample_case(), {
        let mut other = sample_case();
        other.id = 12;
        other.name = "checkout-smoke".to_string();
        other
    }];

    let bulk = runner
        .run_bulk("module:1", &cases, &RunSettings::default())
        .await;

    assert_eq!(bulk.total, 2);
    assert_eq!(bulk.passed, 0);
    assert_eq!(bulk.failed, 2);
    assert_eq!(bulk.reports.len(), 2);
    assert_eq!(bulk.reports[0].case_id, 11);
    assert_eq!(bulk.reports[1].case_id, 12);
}

#[tokio::test]
async fn test_persist_report_roundtrip() {
    let manager = StorageManager::new_in_memory().await.unwrap();
    let storage = Storage::from_manager(&manager);

    let dir = tempfile::tempdir().unwrap();
    let runner = TestRunner::new(offline_config(dir.path()));

    // 无存储的运行 (代理侧) 产出的报告，由服务端落库
    let report = runner
        .run_case(&sample_case(), &RunSettings::default())
        .await
        .unwrap();
    assert!(report.run_id.is_none());

    let run_id = wtp_engine::persist_report(&storage, &report).await.unwrap();

    let record = storage.runs().get_by_id(run_id).await.unwrap().unwrap();
    assert_eq!(record.status, "Failed");
    assert_eq!(record.case_name, "login-smoke");

    let logs = storage.run_logs().get_for_run(run_id).await.unwrap();
    assert_eq!(logs.len(), report.logs.len());

    let count = storage.runs().count(&RunFilter::default()).await.unwrap();
    assert_eq!(count, 1);
}
