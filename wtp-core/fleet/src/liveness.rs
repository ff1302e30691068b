//! 存活扫描后台任务
//!
//! 独立于任何一次运行的生命周期，周期性扫描注册表并降级
//! 心跳过期的代理。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::registry::AgentRegistry;

/// 启动周期性存活扫描
pub fn spawn_sweeper(registry: Arc<AgentRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let transitions = registry.sweep().await;
            if transitions.is_empty() {
                debug!("存活扫描完成，无状态变化");
                continue;
            }

            for (agent, failed_command) in transitions {
                warn!("代理 {} 已离线 (心跳超时)", agent.name);
                if let Some(command) = failed_command {
                    warn!(
                        "在途命令 {} 随代理 {} 离线终结为失败",
                        command.id, agent.name
                    );
                }
            }
        }
    })
}
