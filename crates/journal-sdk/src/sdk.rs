//! Journal SDK 核心 - 配置与门面
//!
//! 写路径在这里决定在线/离线分支：
//! - 在线：直接写远端 + 更新本地镜像（`synced=true`）
//! - 离线（或远端失败）：写本地镜像（`synced=false`）+ 入队等待回放
//!
//! 存储与网络错误在每个面向用户的操作边界被捕获并降级，不会作为未捕获
//! 失败向上传播；校验失败在任何 I/O 之前拒绝。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{JournalSDKError, Result};
use crate::events::{EventManager, JournalEvent};
use crate::http_client::{HttpClientConfig, HttpJournalApi, JournalApi};
use crate::network::{
    ConnectivityListener, ConnectivityMonitor, ConnectivityStatus, DefaultConnectivityListener,
};
use crate::shell::{HttpShellFetcher, ShellCache, ShellFetcher, ShellWorker};
use crate::storage::entities::{CreateReflectionRequest, Mutation, Reflection};
use crate::storage::{OfflineStore, SyncQueue};
use crate::sync::{SyncEngine, SyncReport};
use crate::utils::{IdGenerator, TimeFormatter};

/// 反思内容的最短长度（短于此在任何 I/O 之前拒绝）
pub const MIN_REFLECTION_LEN: usize = 10;

/// Journal SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// 数据存储目录
    pub data_dir: PathBuf,
    /// 远端 API 基础 URL（如 http://localhost:5000）
    pub server_base_url: String,
    /// 外壳缓存版本标签；预缓存清单每次变更都要递增
    pub cache_version_tag: String,
    /// 预缓存清单（应用外壳：根文档、样式表、图标）
    pub precache_manifest: Vec<String>,
    /// HTTP 客户端配置
    pub http_client_config: HttpClientConfig,
    /// 事件缓冲区大小
    pub event_buffer_size: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            server_base_url: "http://localhost:5000".to_string(),
            cache_version_tag: "v1".to_string(),
            precache_manifest: vec![
                "/".to_string(),
                "/static/css/style.css".to_string(),
                "/static/icons/icon-192x192.png".to_string(),
                "/static/icons/icon-512x512.png".to_string(),
            ],
            http_client_config: HttpClientConfig::default(),
            event_buffer_size: 100,
        }
    }
}

impl JournalConfig {
    pub fn builder() -> JournalConfigBuilder {
        JournalConfigBuilder::new()
    }
}

/// 获取默认数据目录 ~/.journal/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".journal")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        // Windows 支持
        home_dir.join(".journal")
    } else {
        PathBuf::from("./journal_data")
    }
}

/// Journal SDK 配置构建器
pub struct JournalConfigBuilder {
    config: JournalConfig,
}

impl JournalConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: JournalConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn server_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_base_url = url.into();
        self
    }

    pub fn cache_version_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.cache_version_tag = tag.into();
        self
    }

    pub fn precache_manifest(mut self, manifest: Vec<String>) -> Self {
        self.config.precache_manifest = manifest;
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn build(self) -> JournalConfig {
        self.config
    }
}

impl Default for JournalConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 导出文档（调用方负责落地为下载文件）
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDocument {
    /// 带当前日期的文件名，如 `reflections_export_2026-08-04.json`
    pub filename: String,
    /// 全量条目的 JSON 数组（pretty-printed）
    pub json: String,
}

/// Journal SDK
pub struct JournalSDK {
    config: JournalConfig,
    store: Arc<OfflineStore>,
    queue: Arc<SyncQueue>,
    api: Arc<dyn JournalApi>,
    network: Arc<ConnectivityMonitor>,
    sync_engine: Arc<SyncEngine>,
    shell_worker: Arc<ShellWorker>,
    events: Arc<EventManager>,
    ids: IdGenerator,
}

impl JournalSDK {
    /// 异步初始化 SDK（推荐方式）
    ///
    /// 分层初始化顺序：存储层 → 网络层 → 事件层 → 业务层
    pub async fn initialize(config: JournalConfig) -> Result<Arc<Self>> {
        let api = Arc::new(HttpJournalApi::new(
            &config.http_client_config,
            &config.server_base_url,
        )?);
        let fetcher = Arc::new(HttpShellFetcher::new(
            &config.http_client_config,
            &config.server_base_url,
        )?);
        // 实际应用应该由平台层提供真实的连通性监听实现
        let listener = Arc::new(DefaultConnectivityListener::default());
        Self::initialize_with(config, api, fetcher, listener).await
    }

    /// 以外部注入的组件初始化（平台层定制 / 测试）
    pub async fn initialize_with(
        config: JournalConfig,
        api: Arc<dyn JournalApi>,
        fetcher: Arc<dyn ShellFetcher>,
        listener: Arc<dyn ConnectivityListener>,
    ) -> Result<Arc<Self>> {
        info!("正在初始化 JournalSDK...");

        // === 第1层：本地存储（初始化握手完成之后才开放读写）===
        let store = Arc::new(OfflineStore::open(&config.data_dir).await?);
        let queue = Arc::new(SyncQueue::new(store.database())?);

        // === 第2层：连通性监控 ===
        let network = Arc::new(ConnectivityMonitor::new(listener));
        network.start().await?;

        // === 第3层：事件管理器 ===
        let events = Arc::new(EventManager::new(config.event_buffer_size));

        // === 第4层：同步引擎（订阅连通性恢复边沿）===
        let sync_engine = Arc::new(SyncEngine::new(
            store.clone(),
            queue.clone(),
            api.clone(),
            events.clone(),
        ));
        sync_engine.clone().spawn_connectivity_watcher(network.subscribe());

        // === 第5层：应用外壳 worker ===
        let cache = ShellCache::open(store.database(), &config.cache_version_tag)?;
        let shell_worker = Arc::new(ShellWorker::new(
            cache,
            fetcher,
            config.server_base_url.clone(),
            config.precache_manifest.clone(),
        ));

        let ids = IdGenerator::new()?;

        info!("✅ JournalSDK 初始化完成 (版本: {})", crate::version::SDK_VERSION);

        Ok(Arc::new(Self {
            config,
            store,
            queue,
            api,
            network,
            sync_engine,
            shell_worker,
            events,
            ids,
        }))
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<OfflineStore> {
        self.store.clone()
    }

    pub fn queue(&self) -> Arc<SyncQueue> {
        self.queue.clone()
    }

    pub fn network(&self) -> Arc<ConnectivityMonitor> {
        self.network.clone()
    }

    pub fn shell_worker(&self) -> Arc<ShellWorker> {
        self.shell_worker.clone()
    }

    /// 订阅 SDK 事件（连通性变化、回放完成等）
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<JournalEvent> {
        self.events.subscribe()
    }

    /// 平台层上报连通性变化（浏览器壳的 online/offline 事件从这里进来）
    pub async fn set_connectivity(&self, online: bool) {
        let status = if online {
            ConnectivityStatus::Online
        } else {
            ConnectivityStatus::Offline
        };
        self.network.set_status(status).await;
    }

    /// 提交一条反思
    ///
    /// 校验在任何 I/O 之前完成。在线时直写远端并镜像到本地；离线或远端
    /// 失败时保存在本地并入队（入队失败向调用方上抛，绝不静默丢失）。
    pub async fn submit_reflection(
        &self,
        name: &str,
        reflection_text: &str,
        canvas_image: Option<String>,
    ) -> Result<Reflection> {
        let name = name.trim();
        let text = reflection_text.trim();
        if name.is_empty() {
            return Err(JournalSDKError::ValidationFailed("姓名不能为空".to_string()));
        }
        if text.chars().count() < MIN_REFLECTION_LEN {
            return Err(JournalSDKError::ValidationFailed(format!(
                "反思内容至少需要 {} 个字符",
                MIN_REFLECTION_LEN
            )));
        }

        let entry = Reflection::new_local(self.ids.next_client_id()?, name, text, canvas_image);

        if self.network.is_online().await {
            match self.submit_online(&entry).await {
                Ok(confirmed) => return Ok(confirmed),
                Err(e) if e.is_remote() => {
                    warn!("⚠️ 在线提交失败，转入离线路径: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        self.submit_offline(entry).await
    }

    async fn submit_online(&self, entry: &Reflection) -> Result<Reflection> {
        let request = CreateReflectionRequest::from(entry);
        let mut confirmed = self.api.create_reflection(&request).await?;
        confirmed.synced = true;
        self.store.put_reflection(&confirmed).await?;
        self.events.emit(JournalEvent::ReflectionSaved {
            id: confirmed.id.clone(),
            synced: true,
        });
        Ok(confirmed)
    }

    async fn submit_offline(&self, mut entry: Reflection) -> Result<Reflection> {
        entry.synced = false;
        self.store.put_reflection(&entry).await?;
        self.queue.enqueue(Mutation::Create(entry.clone())).await?;
        info!("📴 已离线保存，待网络恢复后同步: {}", entry.id);
        self.events.emit(JournalEvent::ReflectionSaved {
            id: entry.id.clone(),
            synced: false,
        });
        Ok(entry)
    }

    /// 读取权威视图：在线时取远端并镜像到本地；离线或远端失败时退回本地
    /// 镜像；本地存储也不可用时降级为空列表而不是崩溃。
    pub async fn list_reflections(&self) -> Result<Vec<Reflection>> {
        if self.network.is_online().await {
            match self.api.list_reflections().await {
                Ok(remote) => {
                    let mut mirrored = Vec::with_capacity(remote.len());
                    for mut record in remote {
                        record.synced = true;
                        if let Err(e) = self.store.put_reflection(&record).await {
                            warn!("⚠️ 镜像远端条目失败: {} ({})", record.id, e);
                        }
                        mirrored.push(record);
                    }
                    return Ok(mirrored);
                }
                Err(e) if e.is_remote() => {
                    warn!("⚠️ 拉取远端列表失败，退回本地镜像: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        match self.store.get_all_reflections().await {
            Ok(local) => Ok(local),
            Err(e) => {
                warn!("⚠️ 本地存储不可用，降级为空列表: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// 删除一条反思（对已删除的 id 幂等）
    pub async fn delete_reflection(&self, id: &str) -> Result<()> {
        if self.network.is_online().await {
            match self.api.delete_reflection(id).await {
                Ok(()) => {
                    self.store.delete_reflection(id).await?;
                    self.events
                        .emit(JournalEvent::ReflectionDeleted { id: id.to_string() });
                    return Ok(());
                }
                Err(e) if e.is_remote() => {
                    warn!("⚠️ 在线删除失败，转入离线路径: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        self.store.delete_reflection(id).await?;
        self.queue
            .enqueue(Mutation::Delete { id: id.to_string() })
            .await?;
        info!("📴 已离线删除，待网络恢复后同步: {}", id);
        self.events
            .emit(JournalEvent::ReflectionDeleted { id: id.to_string() });
        Ok(())
    }

    /// 清空全部条目；逐条尝试，单条失败不中断其余，返回成功清除的条数
    pub async fn clear_all_reflections(&self) -> Result<usize> {
        let all = self.list_reflections().await?;
        let mut cleared = 0;
        for reflection in &all {
            match self.delete_reflection(&reflection.id).await {
                Ok(()) => cleared += 1,
                Err(e) => warn!("⚠️ 清除条目失败: {} ({})", reflection.id, e),
            }
        }
        info!("🧹 已清除 {}/{} 条条目", cleared, all.len());
        Ok(cleared)
    }

    /// 手动触发一轮队列回放
    ///
    /// 返回 `None` 表示已有一轮回放在进行中（本次触发被丢弃）。
    pub async fn sync_now(&self) -> Result<Option<SyncReport>> {
        self.sync_engine.reconcile().await
    }

    /// 待回放的变更数
    pub async fn pending_sync_count(&self) -> Result<usize> {
        self.queue.len().await
    }

    /// 导出全部条目为 pretty-printed JSON 文档
    pub async fn export_reflections(&self) -> Result<ExportDocument> {
        let all = self.list_reflections().await?;
        if all.is_empty() {
            return Err(JournalSDKError::NotFound("没有可导出的条目".to_string()));
        }
        let json = serde_json::to_string_pretty(&all)?;
        let filename = format!("reflections_export_{}.json", TimeFormatter::export_stamp_now());
        Ok(ExportDocument { filename, json })
    }

    /// 导出并写入目标目录，返回完整路径
    pub async fn write_export(&self, dir: &Path) -> Result<PathBuf> {
        let document = self.export_reflections().await?;
        let path = dir.join(&document.filename);
        tokio::fs::write(&path, document.json.as_bytes()).await?;
        info!("📤 导出完成: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::MockJournalApi;
    use crate::shell::router::test_helpers::MemoryShellFetcher;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        api: Arc<MockJournalApi>,
        sdk: Arc<JournalSDK>,
    }

    async fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let config = JournalConfig::builder()
            .data_dir(temp_dir.path())
            .server_base_url("http://localhost:5000")
            .build();
        let api = Arc::new(MockJournalApi::new());
        let fetcher = Arc::new(MemoryShellFetcher::new());
        let listener = Arc::new(DefaultConnectivityListener::default());
        let sdk = JournalSDK::initialize_with(config, api.clone(), fetcher, listener)
            .await
            .unwrap();
        Fixture {
            _temp_dir: temp_dir,
            api,
            sdk,
        }
    }

    /// 轮询直到队列清空（后台回放任务完成）
    async fn wait_until_queue_empty(sdk: &JournalSDK) {
        for _ in 0..100 {
            if sdk.pending_sync_count().await.unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("队列在预期时间内没有清空");
    }

    #[tokio::test]
    async fn test_online_submit_is_synced_and_not_queued() {
        let f = fixture().await;

        let confirmed = f
            .sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();
        assert!(confirmed.synced);
        assert_eq!(confirmed.id, "srv-1");

        let stored = f.sdk.store().get_reflection("srv-1").await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(f.sdk.pending_sync_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_submit_is_unsynced_and_queued_once() {
        let f = fixture().await;
        f.sdk.set_connectivity(false).await;

        let entry = f
            .sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();
        assert!(!entry.synced);

        let stored = f.sdk.store().get_reflection(&entry.id).await.unwrap().unwrap();
        assert!(!stored.synced);

        let pending = f.sdk.queue().list().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].mutation.kind(), crate::storage::MutationType::Create);
        assert_eq!(pending[0].mutation.target_id(), entry.id);
        // 没有发出过网络调用
        assert_eq!(f.api.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_offline_then_online_scenario() {
        let f = fixture().await;
        f.sdk.set_connectivity(false).await;

        let entry = f
            .sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();
        assert!(!entry.synced);

        // 恢复在线：恢复边沿触发后台回放
        f.sdk.set_connectivity(true).await;
        wait_until_queue_empty(&f.sdk).await;

        let all = f.sdk.store().get_all_reflections().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].synced);
        assert_eq!(all[0].id, "srv-1");
        assert_eq!(f.api.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_short_reflection_rejected_before_any_io() {
        let f = fixture().await;

        let err = f
            .sdk
            .submit_reflection("Amy", "nine char", None)
            .await
            .unwrap_err();
        assert!(matches!(err, JournalSDKError::ValidationFailed(_)));

        // 校验失败时既没有网络调用也没有本地写入
        assert_eq!(f.api.call_count().await, 0);
        assert_eq!(f.sdk.store().get_all_reflections().await.unwrap().len(), 0);
        assert_eq!(f.sdk.pending_sync_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let f = fixture().await;
        let err = f
            .sdk
            .submit_reflection("   ", "Today was a good day", None)
            .await
            .unwrap_err();
        assert!(matches!(err, JournalSDKError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_delete_already_deleted_is_noop() {
        let f = fixture().await;
        f.sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();

        f.sdk.delete_reflection("srv-1").await.unwrap();
        // 再删一次仍然成功
        f.sdk.delete_reflection("srv-1").await.unwrap();
        assert_eq!(f.api.records().await.len(), 0);
    }

    #[tokio::test]
    async fn test_list_falls_back_to_local_when_remote_fails() {
        let f = fixture().await;
        f.sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();

        // 远端变为不可达，但仍然"在线"：列表应退回本地镜像
        f.api.set_reachable(false).await;
        let listed = f.sdk.list_reflections().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "srv-1");
    }

    #[tokio::test]
    async fn test_online_submit_falls_back_to_queue_when_remote_fails() {
        let f = fixture().await;
        f.api.set_reachable(false).await;

        let entry = f
            .sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();
        assert!(!entry.synced);
        assert_eq!(f.sdk.pending_sync_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_export_roundtrip_preserves_fields() {
        let f = fixture().await;
        f.sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();
        f.sdk
            .submit_reflection("Ben", "Sketched the harbor at dusk", Some("data:image/png;base64,AAAA".to_string()))
            .await
            .unwrap();

        let listed = f.sdk.list_reflections().await.unwrap();
        let document = f.sdk.export_reflections().await.unwrap();
        assert!(document.filename.starts_with("reflections_export_"));
        assert!(document.filename.ends_with(".json"));

        let parsed: Vec<Reflection> = serde_json::from_str(&document.json).unwrap();
        assert_eq!(parsed, listed);
    }

    #[tokio::test]
    async fn test_export_empty_is_reported() {
        let f = fixture().await;
        let err = f.sdk.export_reflections().await.unwrap_err();
        assert!(matches!(err, JournalSDKError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_write_export_creates_file() {
        let f = fixture().await;
        f.sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();

        let out_dir = TempDir::new().unwrap();
        let path = f.sdk.write_export(out_dir.path()).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<Reflection> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_continues_past_failures() {
        let f = fixture().await;
        f.sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();
        f.sdk
            .submit_reflection("Ben", "Sketched the harbor at dusk", None)
            .await
            .unwrap();

        // 接下来两次远端调用失败：列表拉取退回本地镜像，第一条删除转入
        // 离线路径（本地删除 + 入队），第二条正常删除；整个批量不中断
        f.api.fail_next(2).await;
        let cleared = f.sdk.clear_all_reflections().await.unwrap();
        assert_eq!(cleared, 2);
        assert_eq!(f.sdk.pending_sync_count().await.unwrap(), 1);
        assert_eq!(f.api.records().await.len(), 1);
        assert_eq!(f.api.records().await[0].id, "srv-1");
    }

    #[tokio::test]
    async fn test_offline_created_entries_show_as_unsynced() {
        let f = fixture().await;
        f.sdk.set_connectivity(false).await;
        f.sdk
            .submit_reflection("Amy", "Today was a good day", None)
            .await
            .unwrap();

        let unsynced = f.sdk.store().list_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);

        let listed = f.sdk.list_reflections().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].synced);
    }
}
