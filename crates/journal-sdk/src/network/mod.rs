//! 连通性监控
//!
//! 平台层（浏览器壳、桌面端、测试）通过 `ConnectivityListener` 上报在线/离线
//! 状态，`ConnectivityMonitor` 负责维护当前状态并广播变化事件。同步引擎
//! 只消费"离线→在线"的恢复边沿（边沿触发，不轮询）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;

/// 连通性状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityStatus {
    /// 在线
    Online,
    /// 离线
    Offline,
}

impl std::fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityStatus::Online => write!(f, "online"),
            ConnectivityStatus::Offline => write!(f, "offline"),
        }
    }
}

/// 连通性变化事件
#[derive(Debug, Clone)]
pub struct ConnectivityEvent {
    pub old_status: ConnectivityStatus,
    pub new_status: ConnectivityStatus,
    pub timestamp: u64,
}

impl ConnectivityEvent {
    /// 是否是"离线→在线"的恢复边沿
    pub fn is_restored(&self) -> bool {
        self.old_status == ConnectivityStatus::Offline
            && self.new_status == ConnectivityStatus::Online
    }
}

/// 连通性监听器 trait（由平台层实现）
#[async_trait]
pub trait ConnectivityListener: Send + Sync + std::fmt::Debug {
    /// 获取当前状态
    async fn current_status(&self) -> ConnectivityStatus;

    /// 开始监听状态变化
    async fn start_monitoring(&self) -> Result<broadcast::Receiver<ConnectivityEvent>>;

    /// 停止监听
    async fn stop_monitoring(&self);
}

/// 连通性监控管理器
#[derive(Debug)]
pub struct ConnectivityMonitor {
    listener: Arc<dyn ConnectivityListener>,
    status_sender: broadcast::Sender<ConnectivityEvent>,
    current_status: Arc<tokio::sync::RwLock<ConnectivityStatus>>,
}

impl ConnectivityMonitor {
    pub fn new(listener: Arc<dyn ConnectivityListener>) -> Self {
        let (status_sender, _) = broadcast::channel(100);

        Self {
            listener,
            status_sender,
            current_status: Arc::new(tokio::sync::RwLock::new(ConnectivityStatus::Offline)),
        }
    }

    /// 启动监控：取监听器的初始状态，并转发其后续事件
    pub async fn start(&self) -> Result<()> {
        let initial = self.listener.current_status().await;
        {
            let mut status = self.current_status.write().await;
            *status = initial;
        }

        let mut receiver = self.listener.start_monitoring().await?;
        let status_sender = self.status_sender.clone();
        let current_status = self.current_status.clone();

        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                {
                    let mut status = current_status.write().await;
                    *status = event.new_status;
                }
                let _ = status_sender.send(event);
            }
        });

        Ok(())
    }

    /// 获取当前状态
    pub async fn status(&self) -> ConnectivityStatus {
        *self.current_status.read().await
    }

    /// 当前是否在线
    pub async fn is_online(&self) -> bool {
        self.status().await == ConnectivityStatus::Online
    }

    /// 手动设置状态（平台层的 online/offline 事件从这里进来）
    pub async fn set_status(&self, new_status: ConnectivityStatus) {
        let old_status = {
            let mut status = self.current_status.write().await;
            let old = *status;
            *status = new_status;
            old
        };

        let event = ConnectivityEvent {
            old_status,
            new_status,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs(),
        };
        tracing::info!("📶 连通性变化: {} -> {}", event.old_status, event.new_status);
        let _ = self.status_sender.send(event);
    }

    /// 订阅连通性变化
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.status_sender.subscribe()
    }
}

/// 默认监听器：假设始终在线，不产生事件
///
/// 实际应用应该由平台层提供真实的连通性监听实现；状态变化通过
/// `ConnectivityMonitor::set_status` 上报。
#[derive(Debug)]
pub struct DefaultConnectivityListener {
    sender: Arc<tokio::sync::RwLock<Option<broadcast::Sender<ConnectivityEvent>>>>,
}

impl Default for DefaultConnectivityListener {
    fn default() -> Self {
        Self {
            sender: Arc::new(tokio::sync::RwLock::new(None)),
        }
    }
}

#[async_trait]
impl ConnectivityListener for DefaultConnectivityListener {
    async fn current_status(&self) -> ConnectivityStatus {
        ConnectivityStatus::Online
    }

    async fn start_monitoring(&self) -> Result<broadcast::Receiver<ConnectivityEvent>> {
        let (tx, rx) = broadcast::channel(16);
        *self.sender.write().await = Some(tx);
        Ok(rx)
    }

    async fn stop_monitoring(&self) {
        *self.sender.write().await = None;
    }
}
