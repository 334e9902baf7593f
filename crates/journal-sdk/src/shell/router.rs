//! 请求路由与离线回退
//!
//! worker 生命周期是显式状态机：Idle → Installed → Active。
//! - 安装：预缓存清单全部抓取入库，全部成功后才允许激活
//! - 激活：清理所有旧版本缓存，立即接管请求
//! - fetch 拦截只作用于同源请求；API 请求永远绕过缓存

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{JournalSDKError, Result};
use crate::http_client::{transport_error, HttpClientConfig};
use crate::shell::{ResponseSnapshot, ShellCache};

/// 一次被拦截的请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// 同源请求为站内路径（如 `/static/css/style.css`），跨源为完整 URL
    pub url: String,
    /// 请求是否接受 HTML 响应（导航请求为 true）
    pub accepts_html: bool,
}

impl FetchRequest {
    /// 普通 GET 资源请求
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            accepts_html: false,
        }
    }

    /// 导航请求（接受 HTML，失败时回退到缓存的根文档）
    pub fn navigation(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            accepts_html: true,
        }
    }
}

/// worker 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// 未安装
    Idle,
    /// 预缓存完成，等待激活
    Installed,
    /// 已接管请求
    Active,
}

/// worker 控制消息（线格式 `{"type": "SKIP_WAITING"}`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerMessage {
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

/// 网络抓取抽象（测试中以内存实现替换）
#[async_trait]
pub trait ShellFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot>;
}

/// 基于 reqwest 的抓取实现（站内路径拼接 base_url）
pub struct HttpShellFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpShellFetcher {
    pub fn new(config: &HttpClientConfig, base_url: impl Into<String>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(std::time::Duration::from_secs(timeout));
        }
        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(timeout));
        }
        let client = builder
            .build()
            .map_err(|e| JournalSDKError::Other(format!("创建抓取客户端失败: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ShellFetcher for HttpShellFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        let url = if request.url.starts_with("http://") || request.url.starts_with("https://") {
            request.url.clone()
        } else {
            format!("{}{}", self.base_url, request.url)
        };

        let response = self
            .client
            .request(request.method.clone(), &url)
            .send()
            .await
            .map_err(|e| transport_error("抓取资源失败", e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error("读取响应正文失败", e))?
            .to_vec();

        Ok(ResponseSnapshot::new(status, content_type, body))
    }
}

/// 应用外壳 worker：生命周期 + fetch 策略
pub struct ShellWorker {
    cache: ShellCache,
    fetcher: Arc<dyn ShellFetcher>,
    /// 站点源（跨源请求不做拦截）
    origin: String,
    /// 预缓存清单（应用外壳）
    precache: Vec<String>,
    /// 外壳回退用的根文档
    root_document: String,
    state: RwLock<WorkerState>,
}

impl ShellWorker {
    pub fn new(
        cache: ShellCache,
        fetcher: Arc<dyn ShellFetcher>,
        origin: impl Into<String>,
        precache: Vec<String>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            origin: origin.into().trim_end_matches('/').to_string(),
            precache,
            root_document: "/".to_string(),
            state: RwLock::new(WorkerState::Idle),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn cache(&self) -> &ShellCache {
        &self.cache
    }

    /// 安装：预缓存应用外壳
    ///
    /// 清单中任何一项失败都会使安装失败（不会进入 Installed 状态）。
    pub async fn install(&self) -> Result<()> {
        info!("⚙️ worker 安装中，预缓存 {} 项 (tag={})", self.precache.len(), self.cache.version_tag());
        for url in &self.precache {
            let snapshot = self.fetcher.fetch(&FetchRequest::get(url.clone())).await?;
            if !snapshot.is_success() {
                return Err(JournalSDKError::RemoteUnavailable(format!(
                    "预缓存失败: {} (HTTP {})",
                    url, snapshot.status
                )));
            }
            self.cache.put(url, &snapshot).await?;
        }
        *self.state.write().await = WorkerState::Installed;
        info!("✅ 应用外壳预缓存完成");
        Ok(())
    }

    /// 激活：清理旧版本缓存并立即接管请求
    pub async fn activate(&self) -> Result<()> {
        if self.state().await == WorkerState::Idle {
            return Err(JournalSDKError::NotInitialized(
                "worker 尚未完成安装，不能激活".to_string(),
            ));
        }
        let dropped = self.cache.purge_stale().await?;
        *self.state.write().await = WorkerState::Active;
        info!("✅ worker 已激活 (tag={}, 清理旧版本 {} 个)", self.cache.version_tag(), dropped.len());
        Ok(())
    }

    /// 处理控制消息
    pub async fn handle_message(&self, message: WorkerMessage) -> Result<()> {
        match message {
            WorkerMessage::SkipWaiting => {
                if self.state().await == WorkerState::Installed {
                    info!("⏩ 收到 SKIP_WAITING，立即激活");
                    self.activate().await
                } else {
                    Ok(())
                }
            }
        }
    }

    fn is_same_origin(&self, url: &str) -> bool {
        url.starts_with('/') || url.starts_with(&self.origin)
    }

    /// fetch 拦截策略
    ///
    /// 1. 跨源请求：不拦截，直连网络
    /// 2. API 请求：永远直连网络，不读不写缓存（保证动态数据读写一致）
    /// 3. 非 GET 请求：直连网络（变更不缓存）
    /// 4. GET：缓存优先；未命中则抓取、写入当前缓存并返回
    /// 5. 网络失败且无缓存：接受 HTML 的请求回退到缓存的根文档，
    ///    否则返回合成的 503 离线占位响应
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        if !self.is_same_origin(&request.url) {
            return self.fetcher.fetch(request).await;
        }

        if request.url.contains("/api/") {
            debug!("🌐 API 请求绕过缓存: {}", request.url);
            return self.fetcher.fetch(request).await;
        }

        if request.method != Method::GET {
            debug!("🌐 非 GET 请求直连网络: {} {}", request.method, request.url);
            return self.fetcher.fetch(request).await;
        }

        if let Some(snapshot) = self.cache.get(&request.url).await? {
            debug!("📦 缓存命中: {}", request.url);
            return Ok(snapshot);
        }

        match self.fetcher.fetch(request).await {
            Ok(snapshot) => {
                self.cache.put(&request.url, &snapshot).await?;
                Ok(snapshot)
            }
            Err(e) => {
                warn!("⚠️ 网络抓取失败，进入离线回退: {} ({})", request.url, e);
                if request.accepts_html {
                    if let Some(shell) = self.cache.get(&self.root_document).await? {
                        debug!("🏠 回退到缓存的根文档");
                        return Ok(shell);
                    }
                }
                Ok(ResponseSnapshot::offline_notice())
            }
        }
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::collections::HashMap;

    /// 测试用：内存路由表 + 可切换的在线状态
    pub struct MemoryShellFetcher {
        routes: RwLock<HashMap<String, ResponseSnapshot>>,
        online: RwLock<bool>,
        hits: RwLock<usize>,
    }

    impl MemoryShellFetcher {
        pub fn new() -> Self {
            Self {
                routes: RwLock::new(HashMap::new()),
                online: RwLock::new(true),
                hits: RwLock::new(0),
            }
        }

        pub async fn route(&self, url: &str, snapshot: ResponseSnapshot) {
            self.routes.write().await.insert(url.to_string(), snapshot);
        }

        pub async fn set_online(&self, online: bool) {
            *self.online.write().await = online;
        }

        /// 实际到达"网络"的请求数
        pub async fn hit_count(&self) -> usize {
            *self.hits.read().await
        }
    }

    #[async_trait]
    impl ShellFetcher for MemoryShellFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
            *self.hits.write().await += 1;
            if !*self.online.read().await {
                return Err(JournalSDKError::RemoteUnavailable("网络不可达".to_string()));
            }
            match self.routes.read().await.get(&request.url) {
                Some(snapshot) => Ok(snapshot.clone()),
                None => Ok(ResponseSnapshot::new(404, "text/plain", b"not found".to_vec())),
            }
        }
    }
}
