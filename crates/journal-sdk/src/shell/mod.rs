//! 应用外壳缓存模块
//!
//! 本模块提供：
//! - ResponseSnapshot: URL 对应的响应快照（状态码 + Content-Type + 正文）
//! - ShellCache: 带版本标签的快照缓存，每个版本一个 sled Tree
//! - ShellWorker: 安装/激活生命周期与 fetch 拦截策略（见 router 子模块）
//!
//! 同一时刻只有一个版本是"当前"版本；新版本激活时清理所有旧版本。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, info};

use crate::error::{JournalSDKError, Result};

pub mod router;

pub use router::{FetchRequest, HttpShellFetcher, ShellFetcher, ShellWorker, WorkerMessage, WorkerState};

/// 缓存 Tree 的名字前缀（后接版本标签）
const CACHE_TREE_PREFIX: &str = "shell_cache_";

/// 一个 URL 的响应快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl ResponseSnapshot {
    pub fn new(status: u16, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body,
        }
    }

    /// 合成的离线占位响应（无缓存可用、又不接受 HTML 回退时返回）
    pub fn offline_notice() -> Self {
        Self::new(503, "text/plain", b"Offline - Content not available".to_vec())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 正文按 UTF-8 解读（测试与日志用）
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 带版本标签的外壳缓存
pub struct ShellCache {
    db: Arc<Db>,
    version_tag: String,
    tree: Tree,
}

impl ShellCache {
    /// 打开（或创建）当前版本标签对应的缓存
    pub fn open(db: Arc<Db>, version_tag: &str) -> Result<Self> {
        let tree = db
            .open_tree(format!("{}{}", CACHE_TREE_PREFIX, version_tag))
            .map_err(|e| JournalSDKError::StorageUnavailable(format!("打开缓存 Tree 失败: {}", e)))?;
        Ok(Self {
            db,
            version_tag: version_tag.to_string(),
            tree,
        })
    }

    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    /// 写入一个 URL 的快照
    pub async fn put(&self, url: &str, snapshot: &ResponseSnapshot) -> Result<()> {
        let data = bincode::serialize(snapshot)
            .map_err(|e| JournalSDKError::Serialization(format!("序列化快照失败: {}", e)))?;
        self.tree
            .insert(url.as_bytes(), data)
            .map_err(|e| JournalSDKError::KvStore(format!("写入缓存失败: {}", e)))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| JournalSDKError::KvStore(format!("落盘失败: {}", e)))?;
        debug!("📦 已缓存: {} (tag={})", url, self.version_tag);
        Ok(())
    }

    /// 读取一个 URL 的快照
    pub async fn get(&self, url: &str) -> Result<Option<ResponseSnapshot>> {
        let result = self
            .tree
            .get(url.as_bytes())
            .map_err(|e| JournalSDKError::KvStore(format!("读取缓存失败: {}", e)))?;
        match result {
            Some(data) => {
                let snapshot = bincode::deserialize(&data)
                    .map_err(|e| JournalSDKError::Serialization(format!("反序列化快照失败: {}", e)))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    pub async fn contains(&self, url: &str) -> Result<bool> {
        self.tree
            .contains_key(url.as_bytes())
            .map_err(|e| JournalSDKError::KvStore(format!("检查缓存失败: {}", e)))
    }

    /// 缓存的条目数
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// 清理所有标签与当前版本不同的缓存，返回被清理的标签列表
    pub async fn purge_stale(&self) -> Result<Vec<String>> {
        let mut dropped = Vec::new();
        for name in self.db.tree_names() {
            let name_str = String::from_utf8_lossy(&name).into_owned();
            if let Some(tag) = name_str.strip_prefix(CACHE_TREE_PREFIX) {
                if tag != self.version_tag {
                    self.db
                        .drop_tree(&name)
                        .map_err(|e| JournalSDKError::KvStore(format!("清理旧缓存失败: {}", e)))?;
                    info!("🧹 已清理旧版本缓存: {}", tag);
                    dropped.push(tag.to_string());
                }
            }
        }
        Ok(dropped)
    }
}
