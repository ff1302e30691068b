//! 命令派发器
//!
//! 接收一个工作单元和目标：目标为 "server" 时直接经本地运行器
//! 执行并同步返回结果；目标为具名代理时包装为命令入队，由代理
//! 的轮询拉取执行。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use wtp_common::{BulkRunReport, Command, TestCase, WorkSpec};
use wtp_engine::TestRunner;

use crate::registry::AgentRegistry;
use crate::{FleetError, Result};

/// 派发目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTarget {
    /// 在服务端本地执行
    Server,
    /// 派发给具名代理
    Agent(String),
}

/// 派发结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// 本地执行完成，附聚合报告
    Completed(BulkRunReport),
    /// 已入队等待代理拉取
    Queued(Command),
}

/// 命令派发器
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    runner: Arc<TestRunner>,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>, runner: Arc<TestRunner>) -> Self {
        Self { registry, runner }
    }

    /// 派发工作单元
    ///
    /// 注册表层面的失败 (目标不可用) 同步返回给调用方，不做重试
    /// 或改派。
    pub async fn dispatch(&self, target: DispatchTarget, work: WorkSpec) -> Result<DispatchOutcome> {
        match target {
            DispatchTarget::Server => {
                info!("在服务端本地执行: {}", work.label());

                let label = work.label();
                let settings = work.settings().clone();
                let cases: Vec<TestCase> = work.cases().into_iter().cloned().collect();

                let report = self.runner.run_bulk(&label, &cases, &settings).await;
                Ok(DispatchOutcome::Completed(report))
            }
            DispatchTarget::Agent(name) => {
                let agent = self
                    .registry
                    .find_by_name(&name)
                    .await
                    .ok_or_else(|| FleetError::AgentUnavailable(name.clone()))?;

                let command = self.registry.enqueue(agent.id, work).await?;
                info!("命令 {} 已派发给代理 {}", command.id, name);
                Ok(DispatchOutcome::Queued(command))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_target_serde() {
        let server: DispatchTarget = serde_json::from_str("\"server\"").unwrap();
        assert_eq!(server, DispatchTarget::Server);

        let agent: DispatchTarget = serde_json::from_str(r#"{"agent":"A1"}"#).unwrap();
        assert_eq!(agent, DispatchTarget::Agent("A1".to_string()));
    }
}
