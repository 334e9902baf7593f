//! HTTP 客户端模块 - 远端反思 API
//!
//! 使用 reqwest 访问远端的三个端点：
//! - `GET /api/reflections` 拉取全部条目
//! - `POST /api/reflections` 创建条目（服务端分配权威 id）
//! - `DELETE /api/reflections/{id}` 删除条目（404 视为 no-op 成功）
//!
//! 所有请求带有界的连接/请求超时，挂起不会无限期悬住同步回放。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{JournalSDKError, Result};
use crate::storage::entities::{CreateReflectionRequest, Reflection};

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(30),
        }
    }
}

/// 远端反思 API 的抽象（测试中以内存实现替换）
#[async_trait]
pub trait JournalApi: Send + Sync {
    /// 拉取全部条目
    async fn list_reflections(&self) -> Result<Vec<Reflection>>;

    /// 创建条目，返回服务端确认的权威记录（携带服务端分配的 id）
    async fn create_reflection(&self, request: &CreateReflectionRequest) -> Result<Reflection>;

    /// 删除条目；目标不存在视为 no-op 成功
    async fn delete_reflection(&self, id: &str) -> Result<()>;
}

/// 把 reqwest 的传输错误映射到错误分类
pub(crate) fn transport_error(context: &str, error: reqwest::Error) -> JournalSDKError {
    if error.is_timeout() {
        JournalSDKError::Timeout(format!("{}: {}", context, error))
    } else {
        JournalSDKError::RemoteUnavailable(format!("{}: {}", context, error))
    }
}

/// 基于 reqwest 的远端 API 客户端
pub struct HttpJournalApi {
    client: Client,
    base_url: String,
}

impl HttpJournalApi {
    /// 创建客户端
    pub fn new(config: &HttpClientConfig, base_url: impl Into<String>) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }
        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| JournalSDKError::Other(format!("创建 HTTP 客户端失败: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("✅ 远端 API 客户端已创建 (base_url: {})", base_url);

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl JournalApi for HttpJournalApi {
    async fn list_reflections(&self) -> Result<Vec<Reflection>> {
        let response = self
            .client
            .get(self.url("/api/reflections"))
            .send()
            .await
            .map_err(|e| transport_error("拉取条目列表失败", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JournalSDKError::RemoteUnavailable(format!(
                "拉取条目列表失败，HTTP 状态码: {}",
                status
            )));
        }

        let reflections: Vec<Reflection> = response
            .json()
            .await
            .map_err(|e| JournalSDKError::Serialization(format!("解析条目列表失败: {}", e)))?;
        debug!("📖 远端返回 {} 条条目", reflections.len());
        Ok(reflections)
    }

    async fn create_reflection(&self, request: &CreateReflectionRequest) -> Result<Reflection> {
        let response = self
            .client
            .post(self.url("/api/reflections"))
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error("创建条目失败", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误信息".to_string());
            return Err(JournalSDKError::RemoteUnavailable(format!(
                "创建条目失败，HTTP 状态码: {} ({})",
                status, error_text
            )));
        }

        let confirmed: Reflection = response
            .json()
            .await
            .map_err(|e| JournalSDKError::Serialization(format!("解析创建响应失败: {}", e)))?;
        info!("✅ 条目已写入远端: {}", confirmed.id);
        Ok(confirmed)
    }

    async fn delete_reflection(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/reflections/{}", id)))
            .send()
            .await
            .map_err(|e| transport_error("删除条目失败", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // 目标已不存在，删除语义上是 no-op
            debug!("🗑️ 远端条目已不存在，视为删除成功: {}", id);
            return Ok(());
        }
        if !status.is_success() {
            return Err(JournalSDKError::RemoteUnavailable(format!(
                "删除条目失败，HTTP 状态码: {}",
                status
            )));
        }

        info!("🗑️ 条目已从远端删除: {}", id);
        Ok(())
    }
}


#[cfg(test)]
pub use test_helpers::MockJournalApi;
