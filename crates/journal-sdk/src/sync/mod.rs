//! 离线同步模块
//!
//! 职责：
//! - 网络恢复边沿触发队列回放（也可手动触发）
//! - 按 FIFO 顺序逐项重放 CREATE/DELETE
//! - 仅在远端确认成功后出队
//! - 客户端 id → 服务端 id 的显式重映射

pub mod sync_engine;

pub use sync_engine::SyncEngine;

/// 一轮队列回放的结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyncReport {
    /// 本轮尝试的队列项数
    pub attempted: usize,
    /// 成功回放并出队的项数
    pub succeeded: usize,
    /// 失败并保留待重试的项数
    pub failed: usize,
}

impl SyncReport {
    /// 本轮是否全部成功
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
