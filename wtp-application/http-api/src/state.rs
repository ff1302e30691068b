//! 服务端共享状态

use std::sync::Arc;

use wtp_fleet::{AgentRegistry, Dispatcher};
use wtp_storage::Storage;

/// 各路由共享的应用状态
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub storage: Arc<Storage>,
}

impl AppState {
    pub fn new(
        registry: Arc<AgentRegistry>,
        dispatcher: Arc<Dispatcher>,
        storage: Arc<Storage>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            storage,
        }
    }
}
