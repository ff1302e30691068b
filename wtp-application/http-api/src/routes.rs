//! API 路由
//!
//! 代理侧契约: register / heartbeat / poll-commands / report-result /
//! unregister；派发侧契约: dispatch / list-agents / command 状态查询；
//! 另有关键词发现端点与运行记录浏览。

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use wtp_common::{
    AgentInfo, Command, CommandOutcome, RegisterRequest, RegisterResponse, WorkSpec,
};
use wtp_engine::{persist_report, Keyword, KeywordDefinition};
use wtp_fleet::{DispatchOutcome, DispatchTarget};
use wtp_storage::{RunFilter, RunLogRecord, RunRecord};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// 构建完整路由
pub fn router(state: AppState) -> Router {
    Router::new()
        // 代理契约
        .route("/api/agents/register", post(register_agent))
        .route("/api/agents/:id/heartbeat", post(heartbeat))
        .route("/api/agents/:id/commands", get(poll_commands))
        .route("/api/agents/:id/report", post(report_result))
        .route("/api/agents/:id/unregister", post(unregister_agent))
        // 派发契约
        .route("/api/agents", get(list_agents))
        .route("/api/agents/available", get(list_available_agents))
        .route("/api/agents/:id", get(get_agent))
        .route("/api/dispatch", post(dispatch))
        .route("/api/commands/:id", get(command_status))
        // 关键词发现
        .route("/api/keywords", get(list_keywords))
        // 运行记录浏览
        .route("/api/runs", get(list_runs))
        .route("/api/runs/:id", get(get_run))
        .route("/api/runs/:id/logs", get(get_run_logs))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 注册新代理
async fn register_agent(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let info = state.registry.register(request).await?;
    Ok(Json(RegisterResponse { agent_id: info.id }))
}

/// 代理心跳
async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let status = state.registry.heartbeat(id).await?;
    Ok(Json(json!({ "status": "ok", "agent_status": status })))
}

/// 代理轮询待执行命令 (零或一条)
async fn poll_commands(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Option<Command>>> {
    let command = state.registry.poll(id).await?;
    Ok(Json(command))
}

/// 代理上报命令结果
///
/// 注册表终结命令后，上报的运行及日志落入持久层。
async fn report_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(outcome): Json<CommandOutcome>,
) -> ApiResult<Json<Value>> {
    let command = state.registry.report(id, &outcome).await?;

    let mut run_ids = Vec::with_capacity(outcome.runs.len());
    for report in &outcome.runs {
        match persist_report(&state.storage, report).await {
            Ok(run_id) => run_ids.push(run_id),
            Err(e) => warn!("持久化代理上报的运行失败: {}", e),
        }
    }

    info!(
        "命令 {} 上报完成: {:?} ({} 次运行已落库)",
        command.id,
        command.status,
        run_ids.len()
    );

    Ok(Json(json!({ "status": "ok", "run_ids": run_ids })))
}

/// 注销代理
async fn unregister_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state.registry.unregister(id).await?;
    Ok(Json(json!({ "message": format!("Agent {} unregistered", id) })))
}

/// 全部代理
async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentInfo>> {
    Json(state.registry.list().await)
}

/// 可用代理 (仅在线)
async fn list_available_agents(State(state): State<AppState>) -> Json<Vec<AgentInfo>> {
    Json(state.registry.available().await)
}

/// 单个代理信息
async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AgentInfo>> {
    state
        .registry
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Agent {} not found", id)))
}

#[derive(Debug, Deserialize)]
struct DispatchRequest {
    target: DispatchTarget,
    work: WorkSpec,
}

/// 派发工作单元
///
/// 目标为 server 时同步返回聚合报告并落库；目标为代理时返回已
/// 入队的命令句柄。
async fn dispatch(
    State(state): State<AppState>,
    Json(request): Json<DispatchRequest>,
) -> ApiResult<Json<DispatchOutcome>> {
    let outcome = state
        .dispatcher
        .dispatch(request.target, request.work)
        .await?;
    Ok(Json(outcome))
}

/// 命令状态查询
async fn command_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Command>> {
    state
        .registry
        .command_status(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Command {} not found", id)))
}

/// 支持的关键词目录
async fn list_keywords() -> Json<Vec<KeywordDefinition>> {
    Json(Keyword::definitions())
}

#[derive(Debug, Deserialize)]
struct RunsQuery {
    case_id: Option<i64>,
    status: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// 运行记录列表
async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<Vec<RunRecord>>> {
    let filter = RunFilter {
        case_id: query.case_id,
        status: query.status,
        limit: query.limit.or(Some(50)),
        offset: query.offset,
    };
    let records = state.storage.runs().list(&filter).await?;
    Ok(Json(records))
}

/// 单条运行记录
async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<RunRecord>> {
    state
        .storage
        .runs()
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Run {} not found", id)))
}

/// 一次运行的全部日志
async fn get_run_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<RunLogRecord>>> {
    let logs = state.storage.run_logs().get_for_run(id).await?;
    Ok(Json(logs))
}

/// 健康检查
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;
    use wtp_engine::{RunnerConfig, TestRunner};
    use wtp_fleet::{AgentRegistry, Dispatcher, RegistryConfig};
    use wtp_storage::{Storage, StorageManager};

    async fn test_state() -> AppState {
        let manager = StorageManager::new_in_memory().await.unwrap();
        let storage = Arc::new(Storage::from_manager(&manager));
        let registry = Arc::new(AgentRegistry::new(RegistryConfig::default()));
        let runner = Arc::new(
            TestRunner::new(RunnerConfig {
                webdriver_url: "http://127.0.0.1:9".to_string(),
                reports_root: std::env::temp_dir().join("wtp-api-tests"),
                ..Default::default()
            })
            .with_storage(Arc::clone(&storage)),
        );
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry), runner));
        AppState::new(registry, dispatcher, storage)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(test_state().await);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_heartbeat_poll_cycle() {
        let app = router(test_state().await);

        // 注册
        let request = Request::post("/api/agents/register")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"name":"A1","hostname":"h1","capabilities":["webdriver"]}"#,
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let agent_id = body["agent_id"].as_str().unwrap().to_string();

        // 心跳
        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/api/agents/{}/heartbeat", agent_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 空队列轮询返回 null
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/agents/{}/commands", agent_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.is_null());
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let app = router(test_state().await);

        let register = || {
            Request::post("/api/agents/register")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"name":"A1","hostname":"h1"}"#))
                .unwrap()
        };

        let response = app.clone().oneshot(register()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(register()).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_agent_heartbeat_is_404() {
        let app = router(test_state().await);

        let response = app
            .oneshot(
                Request::post(format!("/api/agents/{}/heartbeat", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_keywords_catalogue() {
        let app = router(test_state().await);

        let response = app
            .oneshot(Request::get("/api/keywords").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let keywords: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["keyword"].as_str().unwrap())
            .collect();
        assert!(keywords.contains(&"goto"));
        assert!(keywords.contains(&"expect_text"));
        assert_eq!(keywords.len(), 10);
    }
}
