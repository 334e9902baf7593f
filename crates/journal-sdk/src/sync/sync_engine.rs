//! 同步引擎
//!
//! 职责：
//! - 网络恢复时回放离线期间积累的变更队列
//! - 管理回放锁（同一时刻至多一轮回放）
//! - CREATE 成功后执行 id 重映射并更新本地镜像

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::events::{EventManager, JournalEvent};
use crate::http_client::JournalApi;
use crate::network::ConnectivityEvent;
use crate::storage::entities::{CreateReflectionRequest, Mutation, QueueItem};
use crate::storage::{OfflineStore, SyncQueue};
use crate::sync::SyncReport;

/// 同步引擎
pub struct SyncEngine {
    store: Arc<OfflineStore>,
    queue: Arc<SyncQueue>,
    api: Arc<dyn JournalApi>,
    events: Arc<EventManager>,
    /// 回放锁：一轮回放进行中时，冗余触发被丢弃而不是并发执行
    pass_lock: Mutex<()>,
}

impl SyncEngine {
    /// 创建同步引擎
    pub fn new(
        store: Arc<OfflineStore>,
        queue: Arc<SyncQueue>,
        api: Arc<dyn JournalApi>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            store,
            queue,
            api,
            events,
            pass_lock: Mutex::new(()),
        }
    }

    /// 回放待同步队列
    ///
    /// 网络恢复边沿自动触发，也可手动调用。返回 `None` 表示已有一轮回放在
    /// 进行中，本次触发被丢弃。
    ///
    /// 队列整体读取失败会直接上抛（本轮不出队任何项）；单项失败只记录并
    /// 保留该项待下次触发重试，不中断后续项。
    pub async fn reconcile(&self) -> Result<Option<SyncReport>> {
        let _guard = match self.pass_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("⏭️ 已有一轮回放在进行中，丢弃冗余触发");
                return Ok(None);
            }
        };

        let items = self.queue.list().await?;
        if items.is_empty() {
            return Ok(Some(SyncReport::default()));
        }

        info!("🔁 开始回放离线队列: {} 项", items.len());

        let mut report = SyncReport {
            attempted: items.len(),
            ..Default::default()
        };
        // 本轮内的 id 重映射表：CREATE 确认后，旧客户端 id → 服务端 id。
        // 后续引用旧 id 的 DELETE 必须改用服务端 id，否则离线期间
        // 先建后删的条目会在远端留下孤儿记录。
        let mut remapped: HashMap<String, String> = HashMap::new();

        for item in items {
            match self.replay_item(&item, &mut remapped).await {
                Ok(()) => match self.queue.remove(item.queue_id).await {
                    Ok(()) => report.succeeded += 1,
                    Err(e) => {
                        error!("❌ 回放成功但出队失败: queue_id={}, error={}", item.queue_id, e);
                        report.failed += 1;
                    }
                },
                Err(e) => {
                    warn!(
                        "⚠️ 回放失败，保留待重试: queue_id={}, type={}, error={}",
                        item.queue_id,
                        item.mutation.kind(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "✅ 队列回放完成: 成功 {}/{}，失败 {}",
            report.succeeded, report.attempted, report.failed
        );
        self.events.emit(JournalEvent::SyncCompleted(report.clone()));
        Ok(Some(report))
    }

    /// 重放单个队列项；远端确认成功才返回 Ok
    async fn replay_item(
        &self,
        item: &QueueItem,
        remapped: &mut HashMap<String, String>,
    ) -> Result<()> {
        match &item.mutation {
            Mutation::Create(local) => {
                let request = CreateReflectionRequest::from(local);
                let mut confirmed = self.api.create_reflection(&request).await?;
                confirmed.synced = true;

                // 服务端分配了新 id：移除旧客户端 id 的本地副本，并记录重映射
                if confirmed.id != local.id {
                    remapped.insert(local.id.clone(), confirmed.id.clone());
                    self.store.delete_reflection(&local.id).await?;
                }
                self.store.put_reflection(&confirmed).await?;
                info!("✅ 离线创建已同步: {} -> {}", local.id, confirmed.id);
                Ok(())
            }
            Mutation::Delete { id } => {
                let target = remapped.get(id).cloned().unwrap_or_else(|| id.clone());
                self.api.delete_reflection(&target).await?;
                self.store.delete_reflection(&target).await?;
                info!("✅ 离线删除已同步: {}", target);
                Ok(())
            }
        }
    }

    /// 监听连通性事件，在"离线→在线"的恢复边沿触发一轮回放
    pub fn spawn_connectivity_watcher(
        self: Arc<Self>,
        mut receiver: broadcast::Receiver<ConnectivityEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                engine
                    .events
                    .emit(JournalEvent::ConnectivityChanged { online: event.new_status == crate::network::ConnectivityStatus::Online });
                if event.is_restored() {
                    info!("📶 网络恢复，触发队列回放");
                    if let Err(e) = engine.reconcile().await {
                        error!("❌ 网络恢复后的回放失败: {}", e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::MockJournalApi;
    use crate::storage::entities::Reflection;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        store: Arc<OfflineStore>,
        queue: Arc<SyncQueue>,
        api: Arc<MockJournalApi>,
        engine: Arc<SyncEngine>,
    }

    async fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(OfflineStore::open(temp_dir.path()).await.unwrap());
        let queue = Arc::new(SyncQueue::new(store.database()).unwrap());
        let api = Arc::new(MockJournalApi::new());
        let events = Arc::new(EventManager::new(16));
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            queue.clone(),
            api.clone() as Arc<dyn JournalApi>,
            events,
        ));
        Fixture {
            _temp_dir: temp_dir,
            store,
            queue,
            api,
            engine,
        }
    }

    /// 模拟离线提交：写本地镜像 + 入队 CREATE
    async fn offline_submit(f: &Fixture, id: &str) -> Reflection {
        let entry = Reflection::new_local(id.to_string(), "Amy", "Today was a good day", None);
        f.store.put_reflection(&entry).await.unwrap();
        f.queue.enqueue(Mutation::Create(entry.clone())).await.unwrap();
        entry
    }

    #[tokio::test]
    async fn test_create_replay_remaps_client_id() {
        let f = fixture().await;
        offline_submit(&f, "client-1").await;

        let report = f.engine.reconcile().await.unwrap().unwrap();
        assert_eq!(report.succeeded, 1);
        assert!(report.is_clean());

        // 旧客户端 id 的副本被服务端记录替换
        assert!(f.store.get_reflection("client-1").await.unwrap().is_none());
        let confirmed = f.store.get_reflection("srv-1").await.unwrap().unwrap();
        assert!(confirmed.synced);
        assert_eq!(confirmed.reflection_text, "Today was a good day");

        assert!(f.queue.is_empty().await.unwrap());
        assert_eq!(f.api.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_then_delete_same_id_drains_cleanly() {
        let f = fixture().await;
        let entry = offline_submit(&f, "client-x").await;
        // 离线期间又删除了同一条目
        f.store.delete_reflection(&entry.id).await.unwrap();
        f.queue
            .enqueue(Mutation::Delete { id: entry.id.clone() })
            .await
            .unwrap();

        let report = f.engine.reconcile().await.unwrap().unwrap();
        assert_eq!(report.attempted, 2);
        assert!(report.is_clean());

        // 既没有残留记录，也没有卡住的队列项
        assert!(f.queue.is_empty().await.unwrap());
        assert_eq!(f.store.get_all_reflections().await.unwrap().len(), 0);
        assert_eq!(f.api.records().await.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_item_stays_queued() {
        let f = fixture().await;
        offline_submit(&f, "client-1").await;
        f.api.set_reachable(false).await;

        let report = f.engine.reconcile().await.unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 0);

        // 失败的项保留在队列里，本地副本原样保留
        assert_eq!(f.queue.len().await.unwrap(), 1);
        assert!(f.store.get_reflection("client-1").await.unwrap().is_some());

        // 网络恢复后下一轮触发成功
        f.api.set_reachable(true).await;
        let report = f.engine.reconcile().await.unwrap().unwrap();
        assert!(report.is_clean());
        assert!(f.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_rest() {
        let f = fixture().await;
        offline_submit(&f, "client-1").await;
        offline_submit(&f, "client-2").await;
        // 第一次调用失败，第二次成功
        f.api.fail_next(1).await;

        let report = f.engine.reconcile().await.unwrap().unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);

        // 只剩失败的那一项
        let remaining = f.queue.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].mutation.target_id(), "client-1");
    }

    #[tokio::test]
    async fn test_overlapping_triggers_run_single_pass() {
        let f = fixture().await;
        offline_submit(&f, "client-1").await;
        f.api.set_delay_ms(50).await;

        let first = {
            let engine = f.engine.clone();
            tokio::spawn(async move { engine.reconcile().await })
        };
        // 等第一轮拿到回放锁后再触发第二次
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = f.engine.reconcile().await.unwrap();
        assert!(second.is_none());

        let first = first.await.unwrap().unwrap().unwrap();
        assert_eq!(first.succeeded, 1);
        // 只发出过一次网络调用
        assert_eq!(f.api.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_queue_is_clean_pass() {
        let f = fixture().await;
        let report = f.engine.reconcile().await.unwrap().unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(f.api.call_count().await, 0);
    }
}
