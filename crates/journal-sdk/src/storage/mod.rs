//! 存储模块 - 离线优先的数据持久化层
//!
//! 本模块提供：
//! - OfflineStore: 远端状态的本地持久化镜像（按 id 键控）
//! - SyncQueue: 待回放变更的持久化 FIFO 队列
//! - Entities: 数据实体定义
//!
//! 两个集合共用一个 sled 实例（每个执行上下文一个全局实例），单键操作
//! 由引擎保证原子性。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sled::{Db, Tree};

use crate::error::{JournalSDKError, Result};

pub mod entities;
pub mod queue;

pub use entities::{CreateReflectionRequest, Mutation, MutationType, QueueItem, Reflection};
pub use queue::SyncQueue;

/// 反思条目集合的 Tree 名
const REFLECTIONS_TREE: &str = "reflections";

/// 离线镜像存储
///
/// `open()` 是初始化握手：返回之前完成引擎打开与 Tree 创建，之后的读写
/// 都共享同一个已就绪实例（不会重复初始化）。
pub struct OfflineStore {
    #[allow(dead_code)]
    base_path: PathBuf,
    db: Arc<Db>,
    reflections: Tree,
}

impl OfflineStore {
    /// 打开（或创建）本地存储
    ///
    /// 引擎打不开时返回 `StorageUnavailable`，调用方应降级而不是崩溃。
    pub async fn open(base_path: &Path) -> Result<Self> {
        let base_path = base_path.to_path_buf();
        let store_path = base_path.join("offline");

        tokio::fs::create_dir_all(&store_path)
            .await
            .map_err(|e| JournalSDKError::StorageUnavailable(format!("创建存储目录失败: {}", e)))?;

        // 打开 sled 数据库（上一个实例可能刚释放锁，重试多次带退避）
        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<sled::Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&store_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            JournalSDKError::StorageUnavailable(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        let reflections = db
            .open_tree(REFLECTIONS_TREE)
            .map_err(|e| JournalSDKError::StorageUnavailable(format!("打开反思 Tree 失败: {}", e)))?;

        tracing::info!("✅ 离线存储已就绪: {}", store_path.display());

        Ok(Self {
            base_path,
            db: Arc::new(db),
            reflections,
        })
    }

    /// 底层数据库句柄（同步队列与外壳缓存共用同一实例）
    pub fn database(&self) -> Arc<Db> {
        self.db.clone()
    }

    /// 按 id upsert 一条条目（`synced` 标记由写入路径决定，原样持久化）
    pub async fn put_reflection(&self, reflection: &Reflection) -> Result<()> {
        let data = serde_json::to_vec(reflection)
            .map_err(|e| JournalSDKError::Serialization(format!("序列化条目失败: {}", e)))?;
        self.reflections
            .insert(reflection.id.as_bytes(), data)
            .map_err(|e| JournalSDKError::KvStore(format!("写入条目失败: {}", e)))?;
        self.flush().await?;
        tracing::debug!("💾 条目已写入本地镜像: {}", reflection.id);
        Ok(())
    }

    /// 按 id 读取条目
    pub async fn get_reflection(&self, id: &str) -> Result<Option<Reflection>> {
        let result = self
            .reflections
            .get(id.as_bytes())
            .map_err(|e| JournalSDKError::KvStore(format!("读取条目失败: {}", e)))?;
        match result {
            Some(data) => {
                let reflection = serde_json::from_slice(&data)
                    .map_err(|e| JournalSDKError::Serialization(format!("反序列化条目失败: {}", e)))?;
                Ok(Some(reflection))
            }
            None => Ok(None),
        }
    }

    /// 读取全部条目（顺序不保证，展示层自行排序）
    pub async fn get_all_reflections(&self) -> Result<Vec<Reflection>> {
        let mut reflections = Vec::new();
        for entry in self.reflections.iter() {
            let (_, data) =
                entry.map_err(|e| JournalSDKError::KvStore(format!("遍历条目失败: {}", e)))?;
            let reflection = serde_json::from_slice(&data)
                .map_err(|e| JournalSDKError::Serialization(format!("反序列化条目失败: {}", e)))?;
            reflections.push(reflection);
        }
        tracing::debug!("📖 从本地镜像加载了 {} 条条目", reflections.len());
        Ok(reflections)
    }

    /// 按 id 删除条目；不存在时是 no-op 而不是错误。返回是否确实存在。
    pub async fn delete_reflection(&self, id: &str) -> Result<bool> {
        let removed = self
            .reflections
            .remove(id.as_bytes())
            .map_err(|e| JournalSDKError::KvStore(format!("删除条目失败: {}", e)))?;
        if removed.is_some() {
            self.flush().await?;
            tracing::debug!("🗑️ 条目已从本地镜像删除: {}", id);
        }
        Ok(removed.is_some())
    }

    /// 将条目标记为已同步；条目不存在时是 no-op
    pub async fn mark_synced(&self, id: &str) -> Result<()> {
        if let Some(mut reflection) = self.get_reflection(id).await? {
            reflection.synced = true;
            self.put_reflection(&reflection).await?;
        }
        Ok(())
    }

    /// 列出所有未同步条目（synced 标记的二级查询）
    pub async fn list_unsynced(&self) -> Result<Vec<Reflection>> {
        let all = self.get_all_reflections().await?;
        Ok(all.into_iter().filter(|r| !r.synced).collect())
    }

    /// 按创建时刻列出条目（timestamp 的二级查询，展示层的时间线排序）
    ///
    /// ISO-8601 字符串的字典序即时间序。
    pub async fn list_chronological(&self) -> Result<Vec<Reflection>> {
        let mut all = self.get_all_reflections().await?;
        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(all)
    }

    /// 清空全部条目
    pub async fn clear_reflections(&self) -> Result<()> {
        self.reflections
            .clear()
            .map_err(|e| JournalSDKError::KvStore(format!("清空条目失败: {}", e)))?;
        self.flush().await
    }

    /// 条目数量
    pub fn reflection_count(&self) -> usize {
        self.reflections.len()
    }

    // 变更落盘，保证进程重启后仍然可见
    async fn flush(&self) -> Result<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| JournalSDKError::KvStore(format!("落盘失败: {}", e)))?;
        Ok(())
    }
}
