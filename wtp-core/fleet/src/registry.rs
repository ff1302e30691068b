//! 代理注册表
//!
//! 进程级的代理表，记录每个代理的存活状态和命令队列。
//! 所有状态迁移都在同一把写锁下完成：并发的注册/心跳/派发/轮询
//! 彼此串行化，"可用代理"的读取得到一致快照。

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wtp_common::{
    AgentInfo, AgentStatus, Command, CommandOutcome, CommandStatus, RegisterRequest, WorkSpec,
};

use crate::{FleetError, Result};

/// 注册表配置
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// 心跳超时窗口，超过未收到心跳的代理降级为离线
    pub heartbeat_timeout: Duration,

    /// 每个代理保留的已完成命令条数
    pub history_limit: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(15),
            history_limit: 100,
        }
    }
}

/// 单个代理的注册表记录
struct AgentRecord {
    id: Uuid,
    name: String,
    hostname: String,
    capabilities: Vec<String>,
    status: AgentStatus,
    last_heartbeat: DateTime<Utc>,
    registered_at: DateTime<Utc>,

    /// 待轮询的命令队列 (FIFO)
    queue: VecDeque<Command>,

    /// 在途命令，至多一个
    inflight: Option<Command>,

    /// 已终结命令 (有界保留，供状态查询)
    history: VecDeque<Command>,
}

impl AgentRecord {
    fn to_info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id,
            name: self.name.clone(),
            hostname: self.hostname.clone(),
            capabilities: self.capabilities.clone(),
            status: self.status,
            last_heartbeat: self.last_heartbeat,
            registered_at: self.registered_at,
            current_command: self.inflight.as_ref().map(|c| c.id),
        }
    }

    fn stale(&self, timeout: Duration) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.last_heartbeat);
        elapsed.num_milliseconds() > timeout.as_millis() as i64
    }

    fn push_history(&mut self, command: Command, limit: usize) {
        self.history.push_back(command);
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

/// 代理注册表
pub struct AgentRegistry {
    agents: RwLock<HashMap<Uuid, AgentRecord>>,
    config: RegistryConfig,
}

impl AgentRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// 注册代理
    ///
    /// 名称唯一：未知名称创建新代理；持有者已离线 (或心跳已过期)
    /// 的名称原地接管 (保持原 id)；存活代理占用的名称报
    /// DuplicateAgentName，不产生静默重复。
    pub async fn register(&self, request: RegisterRequest) -> Result<AgentInfo> {
        let mut agents = self.agents.write().await;
        let now = Utc::now();

        if let Some(record) = agents.values_mut().find(|r| r.name == request.name) {
            let takeover =
                record.status == AgentStatus::Offline || record.stale(self.config.heartbeat_timeout);
            if !takeover {
                return Err(FleetError::DuplicateAgentName(request.name));
            }

            record.hostname = request.hostname;
            record.capabilities = request.capabilities;
            record.status = AgentStatus::Online;
            record.last_heartbeat = now;
            info!("代理重新注册: {} ({})", record.name, record.id);
            return Ok(record.to_info());
        }

        let id = Uuid::new_v4();
        let record = AgentRecord {
            id,
            name: request.name.clone(),
            hostname: request.hostname,
            capabilities: request.capabilities,
            status: AgentStatus::Online,
            last_heartbeat: now,
            registered_at: now,
            queue: VecDeque::new(),
            inflight: None,
            history: VecDeque::new(),
        };
        let info = record.to_info();
        agents.insert(id, record);

        info!("注册新代理: {} ({})", request.name, id);
        Ok(info)
    }

    /// 注销代理 (逻辑删除)
    ///
    /// 在途命令随注销以失联终止。
    pub async fn unregister(&self, id: Uuid) -> Result<()> {
        let mut agents = self.agents.write().await;
        let record = agents.remove(&id).ok_or(FleetError::UnknownAgent(id))?;

        if let Some(command) = &record.inflight {
            warn!("代理 {} 注销时仍有在途命令 {}", record.name, command.id);
        }

        info!("注销代理: {} ({})", record.name, id);
        Ok(())
    }

    /// 处理心跳：刷新最后心跳时间，离线代理重新上线
    pub async fn heartbeat(&self, id: Uuid) -> Result<AgentStatus> {
        let mut agents = self.agents.write().await;
        let record = agents.get_mut(&id).ok_or(FleetError::UnknownAgent(id))?;

        record.last_heartbeat = Utc::now();
        if record.status == AgentStatus::Offline {
            record.status = AgentStatus::Online;
            info!("代理 {} 心跳恢复，重新上线", record.name);
        }

        Ok(record.status)
    }

    pub async fn get(&self, id: Uuid) -> Option<AgentInfo> {
        let agents = self.agents.read().await;
        agents.get(&id).map(|r| r.to_info())
    }

    pub async fn find_by_name(&self, name: &str) -> Option<AgentInfo> {
        let agents = self.agents.read().await;
        agents.values().find(|r| r.name == name).map(|r| r.to_info())
    }

    /// 全部代理
    pub async fn list(&self) -> Vec<AgentInfo> {
        let agents = self.agents.read().await;
        agents.values().map(|r| r.to_info()).collect()
    }

    /// 可用代理 (仅在线且空闲)
    pub async fn available(&self) -> Vec<AgentInfo> {
        let agents = self.agents.read().await;
        agents
            .values()
            .filter(|r| r.status == AgentStatus::Online)
            .map(|r| r.to_info())
            .collect()
    }

    /// 为代理入队命令 (派发器入口)
    ///
    /// 目标必须在线 (非忙碌、非离线)，否则快速失败；
    /// 命令创建后终身归属该代理，代理随之转为忙碌。
    pub async fn enqueue(&self, agent_id: Uuid, work: WorkSpec) -> Result<Command> {
        let mut agents = self.agents.write().await;
        let record = agents
            .get_mut(&agent_id)
            .ok_or(FleetError::UnknownAgent(agent_id))?;

        if record.status != AgentStatus::Online {
            return Err(FleetError::AgentUnavailable(record.name.clone()));
        }

        let command = Command {
            id: Uuid::new_v4(),
            agent_id,
            kind: work.kind(),
            work,
            status: CommandStatus::Pending,
            created_at: Utc::now(),
            message: None,
        };

        record.queue.push_back(command.clone());
        record.status = AgentStatus::Busy;

        info!(
            "命令 {} ({:?}) 已入队到代理 {}",
            command.id, command.kind, record.name
        );
        Ok(command)
    }

    /// 代理轮询命令
    ///
    /// 轮询同时刷新存活时间。出队与置为 Dispatched 在同一把写锁下
    /// 原子完成，保证恰好消费一次；已有在途命令时不再下发。
    pub async fn poll(&self, agent_id: Uuid) -> Result<Option<Command>> {
        let mut agents = self.agents.write().await;
        let record = agents
            .get_mut(&agent_id)
            .ok_or(FleetError::UnknownAgent(agent_id))?;

        record.last_heartbeat = Utc::now();
        if record.status == AgentStatus::Offline {
            record.status = AgentStatus::Online;
        }

        if record.inflight.is_some() {
            return Ok(None);
        }

        match record.queue.pop_front() {
            Some(mut command) => {
                command.status = CommandStatus::Dispatched;
                record.inflight = Some(command.clone());
                record.status = AgentStatus::Busy;
                debug!("命令 {} 已下发到代理 {}", command.id, record.name);
                Ok(Some(command))
            }
            None => Ok(None),
        }
    }

    /// 代理上报命令结果
    ///
    /// 校验在途命令一致后写入终态，代理回到在线状态。
    pub async fn report(&self, agent_id: Uuid, outcome: &CommandOutcome) -> Result<Command> {
        let mut agents = self.agents.write().await;
        let record = agents
            .get_mut(&agent_id)
            .ok_or(FleetError::UnknownAgent(agent_id))?;

        let Some(mut command) = record.inflight.take() else {
            return Err(FleetError::UnknownCommand(outcome.command_id));
        };
        if command.id != outcome.command_id {
            record.inflight = Some(command);
            return Err(FleetError::UnknownCommand(outcome.command_id));
        }
        command.status = if outcome.success {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        command.message = Some(outcome.message.clone());

        record.last_heartbeat = Utc::now();
        record.status = AgentStatus::Online;

        info!(
            "命令 {} 终结: {:?} (代理 {})",
            command.id, command.status, record.name
        );

        record.push_history(command.clone(), self.config.history_limit);
        Ok(command)
    }

    /// 查询命令状态 (队列中/在途/历史)
    pub async fn command_status(&self, command_id: Uuid) -> Option<Command> {
        let agents = self.agents.read().await;
        for record in agents.values() {
            if let Some(command) = record.queue.iter().find(|c| c.id == command_id) {
                return Some(command.clone());
            }
            if let Some(command) = record.inflight.as_ref().filter(|c| c.id == command_id) {
                return Some(command.clone());
            }
            if let Some(command) = record.history.iter().find(|c| c.id == command_id) {
                return Some(command.clone());
            }
        }
        None
    }

    /// 存活扫描
    ///
    /// 将心跳过期的代理降级为离线；其在途命令以失联为由终结为
    /// Failed (不自动转派其他代理)。返回本轮迁移，供调用方记录。
    pub async fn sweep(&self) -> Vec<(AgentInfo, Option<Command>)> {
        let mut agents = self.agents.write().await;
        let mut transitions = Vec::new();
        let history_limit = self.config.history_limit;

        for record in agents.values_mut() {
            if record.status == AgentStatus::Offline {
                continue;
            }
            if !record.stale(self.config.heartbeat_timeout) {
                continue;
            }

            record.status = AgentStatus::Offline;

            let failed_command = record.inflight.take().map(|mut command| {
                command.status = CommandStatus::Failed;
                command.message = Some(format!("代理失联: {}", record.name));
                record.push_history(command.clone(), history_limit);
                command
            });

            warn!("代理 {} 心跳超时，降级为离线", record.name);
            transitions.push((record.to_info(), failed_command));
        }

        transitions
    }
}
