//! 同步队列 - 待回放变更的持久化 FIFO 队列
//!
//! 队列项以大端序的单调 `queue_id` 作键，sled 的按键迭代顺序即入队顺序。
//! 除"远端确认成功后移除"之外，队列只追加不修改。

use std::sync::Arc;

use sled::{Db, Tree};

use crate::error::{JournalSDKError, Result};
use crate::storage::entities::{Mutation, MutationType, QueueItem};
use crate::utils::TimeFormatter;

/// 队列集合的 Tree 名
const QUEUE_TREE: &str = "sync_queue";

/// 持久化同步队列
pub struct SyncQueue {
    db: Arc<Db>,
    tree: Tree,
}

impl SyncQueue {
    /// 在已打开的数据库上创建（或打开）队列
    pub fn new(db: Arc<Db>) -> Result<Self> {
        let tree = db
            .open_tree(QUEUE_TREE)
            .map_err(|e| JournalSDKError::StorageUnavailable(format!("打开队列 Tree 失败: {}", e)))?;
        Ok(Self { db, tree })
    }

    /// 入队一个变更意图，返回分配的 `queue_id`
    ///
    /// 持久化失败必须上抛给调用方（调用方要向用户报错），绝不静默丢失变更。
    pub async fn enqueue(&self, mutation: Mutation) -> Result<u64> {
        let queue_id = self
            .db
            .generate_id()
            .map_err(|e| JournalSDKError::KvStore(format!("分配队列 ID 失败: {}", e)))?;

        let item = QueueItem {
            queue_id,
            mutation,
            enqueued_at: TimeFormatter::iso_now(),
        };
        let data = bincode::serialize(&item)
            .map_err(|e| JournalSDKError::Serialization(format!("序列化队列项失败: {}", e)))?;

        self.tree
            .insert(queue_id.to_be_bytes(), data)
            .map_err(|e| JournalSDKError::KvStore(format!("写入队列项失败: {}", e)))?;
        self.flush().await?;

        tracing::info!("📥 变更已入队: queue_id={}, type={}, target={}",
            queue_id, item.mutation.kind(), item.mutation.target_id());
        Ok(queue_id)
    }

    /// 按入队顺序（FIFO）列出所有待回放项
    pub async fn list(&self) -> Result<Vec<QueueItem>> {
        let mut items = Vec::new();
        for entry in self.tree.iter() {
            let (_, data) =
                entry.map_err(|e| JournalSDKError::KvStore(format!("遍历队列失败: {}", e)))?;
            let item: QueueItem = bincode::deserialize(&data)
                .map_err(|e| JournalSDKError::Serialization(format!("反序列化队列项失败: {}", e)))?;
            items.push(item);
        }
        Ok(items)
    }

    /// 按变更类型过滤（二级查询）
    pub async fn list_by_kind(&self, kind: MutationType) -> Result<Vec<QueueItem>> {
        let items = self.list().await?;
        Ok(items.into_iter().filter(|i| i.mutation.kind() == kind).collect())
    }

    /// 移除一项；幂等，不存在时是 no-op
    pub async fn remove(&self, queue_id: u64) -> Result<()> {
        let removed = self
            .tree
            .remove(queue_id.to_be_bytes())
            .map_err(|e| JournalSDKError::KvStore(format!("移除队列项失败: {}", e)))?;
        if removed.is_some() {
            self.flush().await?;
            tracing::debug!("📤 队列项已移除: {}", queue_id);
        }
        Ok(())
    }

    /// 待回放项数量
    pub async fn len(&self) -> Result<usize> {
        Ok(self.tree.len())
    }

    /// 队列是否为空
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.tree.is_empty())
    }

    /// 清空队列
    pub async fn clear(&self) -> Result<()> {
        self.tree
            .clear()
            .map_err(|e| JournalSDKError::KvStore(format!("清空队列失败: {}", e)))?;
        self.flush().await
    }

    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| JournalSDKError::KvStore(format!("落盘失败: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entities::Reflection;
    use crate::storage::OfflineStore;
    use tempfile::TempDir;

    async fn open_queue(temp_dir: &TempDir) -> (OfflineStore, SyncQueue) {
        let store = OfflineStore::open(temp_dir.path()).await.unwrap();
        let queue = SyncQueue::new(store.database()).unwrap();
        (store, queue)
    }

    fn create_of(id: &str) -> Mutation {
        Mutation::Create(Reflection::new_local(
            id.to_string(),
            "Amy",
            "Today was a good day",
            None,
        ))
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, queue) = open_queue(&temp_dir).await;

        queue.enqueue(create_of("x")).await.unwrap();
        queue.enqueue(Mutation::Delete { id: "x".to_string() }).await.unwrap();
        queue.enqueue(create_of("y")).await.unwrap();

        let items = queue.list().await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].mutation.kind(), MutationType::Create);
        assert_eq!(items[0].mutation.target_id(), "x");
        assert_eq!(items[1].mutation.kind(), MutationType::Delete);
        assert_eq!(items[2].mutation.target_id(), "y");
        assert!(items[0].queue_id < items[1].queue_id);
        assert!(items[1].queue_id < items[2].queue_id);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, queue) = open_queue(&temp_dir).await;

        let queue_id = queue.enqueue(create_of("x")).await.unwrap();
        queue.remove(queue_id).await.unwrap();
        queue.remove(queue_id).await.unwrap();
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_kind() {
        let temp_dir = TempDir::new().unwrap();
        let (_store, queue) = open_queue(&temp_dir).await;

        queue.enqueue(create_of("x")).await.unwrap();
        queue.enqueue(Mutation::Delete { id: "z".to_string() }).await.unwrap();

        let creates = queue.list_by_kind(MutationType::Create).await.unwrap();
        assert_eq!(creates.len(), 1);
        let deletes = queue.list_by_kind(MutationType::Delete).await.unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].mutation.target_id(), "z");
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let (_store, queue) = open_queue(&temp_dir).await;
            queue.enqueue(create_of("persist")).await.unwrap();
        }

        let (_store, queue) = open_queue(&temp_dir).await;
        let items = queue.list().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].mutation.target_id(), "persist");
    }
}
