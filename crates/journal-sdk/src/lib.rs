//! Journal SDK - 离线优先的反思日记同步层
//!
//! 本 SDK 提供了完整的离线优先能力，包括：
//! - 💾 远端状态的本地持久化镜像（进程重启后仍然可用）
//! - 📥 离线变更的持久化 FIFO 队列
//! - 🔁 网络恢复后的队列回放与 id 重映射
//! - 📦 带版本的应用外壳缓存与离线回退路由
//! - 📶 连通性监控：恢复边沿自动触发同步
//! - ⚙️ 事件系统：统一的事件广播和订阅机制
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use journal_sdk::{JournalSDK, JournalConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 配置 SDK
//!     let config = JournalConfig::builder()
//!         .data_dir("/path/to/data")
//!         .server_base_url("http://localhost:5000")
//!         .cache_version_tag("v7")
//!         .build();
//!
//!     // 初始化 SDK
//!     let sdk = JournalSDK::initialize(config).await?;
//!
//!     // 提交一条反思（离线时自动入队，网络恢复后回放）
//!     let entry = sdk.submit_reflection("Amy", "Today was a good day", None).await?;
//!     println!("已保存: {} (synced={})", entry.id, entry.synced);
//!
//!     // 读取权威视图
//!     let reflections = sdk.list_reflections().await?;
//!     println!("共 {} 条", reflections.len());
//!
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod error;
pub mod events;
pub mod http_client;
pub mod network;
pub mod sdk;
pub mod shell;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;

// 重新导出核心类型，方便使用
pub use error::{JournalSDKError, Result};
pub use events::{EventManager, JournalEvent};
pub use http_client::{HttpClientConfig, HttpJournalApi, JournalApi};
pub use network::{
    ConnectivityEvent, ConnectivityListener, ConnectivityMonitor, ConnectivityStatus,
    DefaultConnectivityListener,
};
pub use sdk::{ExportDocument, JournalConfig, JournalConfigBuilder, JournalSDK, MIN_REFLECTION_LEN};
pub use shell::{
    FetchRequest, HttpShellFetcher, ResponseSnapshot, ShellCache, ShellFetcher, ShellWorker,
    WorkerMessage, WorkerState,
};
pub use storage::{
    CreateReflectionRequest, Mutation, MutationType, OfflineStore, QueueItem, Reflection, SyncQueue,
};
pub use sync::{SyncEngine, SyncReport};
pub use utils::{IdGenerator, TimeFormatter};
pub use version::SDK_VERSION;
