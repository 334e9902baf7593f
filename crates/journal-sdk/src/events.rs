//! 事件系统模块
//!
//! 统一的事件广播，供展示层订阅：
//! - 连通性变化（提示用户在线/离线）
//! - 同步回放完成（刷新展示）
//! - 条目保存/删除

use tokio::sync::broadcast;
use tracing::debug;

use crate::sync::SyncReport;

/// SDK 对外广播的事件
#[derive(Debug, Clone)]
pub enum JournalEvent {
    /// 连通性变化
    ConnectivityChanged { online: bool },
    /// 一轮队列回放结束（展示层应在此刷新权威视图）
    SyncCompleted(SyncReport),
    /// 条目已保存（`synced=false` 表示保存在本地待同步）
    ReflectionSaved { id: String, synced: bool },
    /// 条目已删除
    ReflectionDeleted { id: String },
}

/// 事件管理器
#[derive(Debug)]
pub struct EventManager {
    sender: broadcast::Sender<JournalEvent>,
}

impl EventManager {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// 广播一个事件（无订阅者时静默丢弃）
    pub fn emit(&self, event: JournalEvent) {
        debug!("📢 事件: {:?}", event);
        let _ = self.sender.send(event);
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<JournalEvent> {
        self.sender.subscribe()
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
