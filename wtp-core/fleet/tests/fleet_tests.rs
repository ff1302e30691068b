//! Fleet 模块测试
//!
//! 覆盖代理生命周期：注册 → 派发 → 轮询 → 上报，以及心跳超时
//! 降级与在途命令终结。

use std::sync::Arc;
use std::time::Duration;

use wtp_common::{
    AgentStatus, CommandOutcome, CommandStatus, RegisterRequest, RunSettings, TestCase, WorkSpec,
};
use wtp_fleet::{
    spawn_sweeper, AgentRegistry, DispatchOutcome, DispatchTarget, Dispatcher, FleetError,
    RegistryConfig,
};

fn request(name: &str) -> RegisterRequest {
    RegisterRequest {
        name: name.to_string(),
        hostname: "executor-1".to_string(),
        capabilities: vec!["webdriver".to_string(), "ui-testing".to_string()],
    }
}

fn case_work() -> WorkSpec {
    WorkSpec::RunCase {
        case: TestCase {
            id: 1,
            name: "smoke".to_string(),
            project_id: 1,
            module_id: None,
            steps: vec![],
        },
        settings: RunSettings::default(),
    }
}

fn short_timeout_registry(timeout_ms: u64) -> AgentRegistry {
    AgentRegistry::new(RegistryConfig {
        heartbeat_timeout: Duration::from_millis(timeout_ms),
        history_limit: 10,
    })
}

#[tokio::test]
async fn test_dispatch_poll_report_cycle() {
    let registry = AgentRegistry::new(RegistryConfig::default());
    let agent = registry.register(request("A1")).await.unwrap();

    // 派发后代理转为忙碌，命令为 Pending
    let command = registry.enqueue(agent.id, case_work()).await.unwrap();
    assert_eq!(command.status, CommandStatus::Pending);
    assert_eq!(
        registry.get(agent.id).await.unwrap().status,
        AgentStatus::Busy
    );

    // 忙碌代理不可再接收派发
    let err = registry.enqueue(agent.id, case_work()).await.unwrap_err();
    assert!(matches!(err, FleetError::AgentUnavailable(_)));

    // 轮询出队并置为 Dispatched
    let polled = registry.poll(agent.id).await.unwrap().unwrap();
    assert_eq!(polled.id, command.id);
    assert_eq!(polled.status, CommandStatus::Dispatched);
    assert_eq!(
        registry.get(agent.id).await.unwrap().current_command,
        Some(command.id)
    );

    // 出队恰好一次
    assert!(registry.poll(agent.id).await.unwrap().is_none());

    // 上报成功后命令终结、代理回到在线
    let outcome = CommandOutcome {
        command_id: command.id,
        success: true,
        message: "1/1 通过".to_string(),
        runs: vec![],
    };
    let finished = registry.report(agent.id, &outcome).await.unwrap();
    assert_eq!(finished.status, CommandStatus::Completed);
    assert_eq!(
        registry.get(agent.id).await.unwrap().status,
        AgentStatus::Online
    );

    // 终结后的命令可查询
    let status = registry.command_status(command.id).await.unwrap();
    assert_eq!(status.status, CommandStatus::Completed);

    // 重复上报被拒绝
    let err = registry.report(agent.id, &outcome).await.unwrap_err();
    assert!(matches!(err, FleetError::UnknownCommand(_)));
}

#[tokio::test]
async fn test_heartbeat_timeout_marks_agent_offline() {
    let registry = short_timeout_registry(100);
    let agent = registry.register(request("A1")).await.unwrap();

    // 超时窗口内的心跳保持在线
    tokio::time::sleep(Duration::from_millis(50)).await;
    registry.heartbeat(agent.id).await.unwrap();
    assert!(registry.sweep().await.is_empty());
    assert_eq!(
        registry.get(agent.id).await.unwrap().status,
        AgentStatus::Online
    );

    // 静默超过超时窗口后，下一轮扫描观察到离线
    tokio::time::sleep(Duration::from_millis(150)).await;
    let transitions = registry.sweep().await;
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].0.status, AgentStatus::Offline);

    // 此后派发该代理快速失败
    let err = registry.enqueue(agent.id, case_work()).await.unwrap_err();
    assert!(matches!(err, FleetError::AgentUnavailable(_)));
    assert!(registry.available().await.is_empty());

    // 新的心跳使代理恢复在线
    registry.heartbeat(agent.id).await.unwrap();
    assert_eq!(
        registry.get(agent.id).await.unwrap().status,
        AgentStatus::Online
    );
}

#[tokio::test]
async fn test_sweep_fails_inflight_command() {
    let registry = short_timeout_registry(100);
    let agent = registry.register(request("A1")).await.unwrap();

    let command = registry.enqueue(agent.id, case_work()).await.unwrap();
    registry.poll(agent.id).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let transitions = registry.sweep().await;
    assert_eq!(transitions.len(), 1);

    // 在途命令随离线终结为 Failed，不自动转派
    let failed = transitions[0].1.as_ref().unwrap();
    assert_eq!(failed.id, command.id);
    assert_eq!(failed.status, CommandStatus::Failed);
    assert!(failed.message.as_ref().unwrap().contains("失联"));

    let status = registry.command_status(command.id).await.unwrap();
    assert_eq!(status.status, CommandStatus::Failed);

    // 迟到的上报被拒绝
    let outcome = CommandOutcome {
        command_id: command.id,
        success: true,
        message: String::new(),
        runs: vec![],
    };
    let err = registry.report(agent.id, &outcome).await.unwrap_err();
    assert!(matches!(err, FleetError::UnknownCommand(_)));
}

#[tokio::test]
async fn test_at_most_one_dispatched_command() {
    let registry = AgentRegistry::new(RegistryConfig::default());
    let a1 = registry.register(request("A1")).await.unwrap();
    let a2 = registry.register(request("A2")).await.unwrap();

    registry.enqueue(a1.id, case_work()).await.unwrap();
    registry.enqueue(a2.id, case_work()).await.unwrap();

    registry.poll(a1.id).await.unwrap().unwrap();
    registry.poll(a2.id).await.unwrap().unwrap();

    // 每个代理至多一个在途命令：再次轮询不下发新命令
    assert!(registry.poll(a1.id).await.unwrap().is_none());
    assert!(registry.poll(a2.id).await.unwrap().is_none());

    for info in registry.list().await {
        assert!(info.current_command.is_some());
        assert_eq!(info.status, AgentStatus::Busy);
    }
}

#[tokio::test]
async fn test_sweeper_task_runs_periodically() {
    let registry = Arc::new(short_timeout_registry(100));
    let agent = registry.register(request("A1")).await.unwrap();

    let handle = spawn_sweeper(Arc::clone(&registry), Duration::from_millis(50));

    // 代理静默后由后台扫描自动降级
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        registry.get(agent.id).await.unwrap().status,
        AgentStatus::Offline
    );

    handle.abort();
}

#[tokio::test]
async fn test_dispatch_to_unknown_agent_fails() {
    let registry = Arc::new(AgentRegistry::new(RegistryConfig::default()));
    let runner = Arc::new(wtp_engine::TestRunner::new(wtp_engine::RunnerConfig {
        reports_root: tempfile::tempdir().unwrap().path().to_path_buf(),
        webdriver_url: "http://127.0.0.1:9".to_string(),
        ..Default::default()
    }));
    let dispatcher = Dispatcher::new(Arc::clone(&registry), runner);

    let err = dispatcher
        .dispatch(DispatchTarget::Agent("ghost".to_string()), case_work())
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::AgentUnavailable(_)));
}

#[tokio::test]
async fn test_dispatch_to_server_runs_locally() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(AgentRegistry::new(RegistryConfig::default()));
    let runner = Arc::new(wtp_engine::TestRunner::new(wtp_engine::RunnerConfig {
        reports_root: dir.path().to_path_buf(),
        // WebDriver 不可达：本地执行立即以失败终结，但派发路径同步返回
        webdriver_url: "http://127.0.0.1:9".to_string(),
        ..Default::default()
    }));
    let dispatcher = Dispatcher::new(registry, runner);

    let outcome = dispatcher
        .dispatch(DispatchTarget::Server, case_work())
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::Completed(bulk) => {
            assert_eq!(bulk.total, 1);
            assert_eq!(bulk.failed, 1);
            assert_eq!(bulk.reports[0].case_id, 1);
        }
        DispatchOutcome::Queued(_) => panic!("服务端目标应同步完成"),
    }
}

#[tokio::test]
async fn test_dispatch_to_online_agent_queues_command() {
    let registry = Arc::new(AgentRegistry::new(RegistryConfig::default()));
    registry.register(request("A1")).await.unwrap();

    let runner = Arc::new(wtp_engine::TestRunner::new(Default::default()));
    let dispatcher = Dispatcher::new(Arc::clone(&registry), runner);

    let outcome = dispatcher
        .dispatch(DispatchTarget::Agent("A1".to_string()), case_work())
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::Queued(command) => {
            assert_eq!(command.status, CommandStatus::Pending);
            let agent = registry.find_by_name("A1").await.unwrap();
            assert_eq!(agent.status, AgentStatus::Busy);
            assert_eq!(command.agent_id, agent.id);
        }
        DispatchOutcome::Completed(_) => panic!("代理目标应入队"),
    }
}
