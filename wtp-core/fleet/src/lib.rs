//! WTP 代理编排
//!
//! 维护远程执行代理的注册表与存活状态，按代理排队派发命令，
//! 并在心跳超时时将代理降级为离线。注册表是唯一的共享可变状态，
//! 只暴露原子的状态迁移操作。

pub mod dispatcher;
pub mod liveness;
pub mod registry;

pub use dispatcher::{DispatchOutcome, DispatchTarget, Dispatcher};
pub use liveness::spawn_sweeper;
pub use registry::{AgentRegistry, RegistryConfig};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum FleetError {
    /// 派发目标不在线 (离线或忙碌)
    #[error("代理不可用: {0}")]
    AgentUnavailable(String),

    /// 代理在命令在途期间失联
    #[error("代理失联: {0}")]
    AgentUnreachable(String),

    /// 注册名称已被存活代理占用
    #[error("代理名称已被占用: {0}")]
    DuplicateAgentName(String),

    #[error("未知代理: {0}")]
    UnknownAgent(Uuid),

    #[error("未知命令: {0}")]
    UnknownCommand(Uuid),
}

pub type Result<T> = std::result::Result<T, FleetError>;
