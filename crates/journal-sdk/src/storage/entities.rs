//! 数据实体定义 - 类型安全的数据传输
//!
//! JSON 字段统一使用 camelCase（与远端 API 和导出文档保持一致）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::TimeFormatter;

/// 一条反思日记条目
///
/// `id` 创建后不可变，是唯一的身份键。`synced=false` 当且仅当该条目仅存在于
/// 本地、尚未确认写入远端。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reflection {
    pub id: String,
    pub name: String,
    pub reflection_text: String,
    /// 展示用日期（如 `Tue Aug 04 2026`）
    pub date: String,
    /// ISO-8601 创建时刻
    pub timestamp: String,
    /// 是否已确认写入远端（远端响应不携带此字段，反序列化时默认 false）
    #[serde(default)]
    pub synced: bool,
    /// 手绘内容（base64 data-URL 或服务端相对路径）
    #[serde(default)]
    pub canvas_image: Option<String>,
}

impl Reflection {
    /// 在客户端本地创建一条新条目（`synced=false`，时间字段取当前时刻）
    pub fn new_local(
        id: String,
        name: impl Into<String>,
        reflection_text: impl Into<String>,
        canvas_image: Option<String>,
    ) -> Self {
        let now: DateTime<Utc> = Utc::now();
        Self {
            id,
            name: name.into(),
            reflection_text: reflection_text.into(),
            date: TimeFormatter::display_date(now),
            timestamp: TimeFormatter::iso_timestamp(now),
            synced: false,
            canvas_image,
        }
    }
}

/// 远端创建接口的请求体（`POST /api/reflections`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReflectionRequest {
    pub name: String,
    pub reflection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_image: Option<String>,
}

impl From<&Reflection> for CreateReflectionRequest {
    fn from(reflection: &Reflection) -> Self {
        Self {
            name: reflection.name.clone(),
            reflection: reflection.reflection_text.clone(),
            canvas_image: reflection.canvas_image.clone(),
        }
    }
}

/// 变更类型（队列项的二级索引键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationType {
    Create,
    Delete,
}

impl std::fmt::Display for MutationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationType::Create => write!(f, "CREATE"),
            MutationType::Delete => write!(f, "DELETE"),
        }
    }
}

/// 一次待回放的变更意图
///
/// CREATE 携带完整的本地条目；DELETE 只引用条目 id，不拥有条目内容。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    Create(Reflection),
    Delete { id: String },
}

impl Mutation {
    pub fn kind(&self) -> MutationType {
        match self {
            Mutation::Create(_) => MutationType::Create,
            Mutation::Delete { .. } => MutationType::Delete,
        }
    }

    /// 该变更引用的条目 id
    pub fn target_id(&self) -> &str {
        match self {
            Mutation::Create(reflection) => &reflection.id,
            Mutation::Delete { id } => id,
        }
    }
}

/// 同步队列中的一项
///
/// `queue_id` 单调递增；回放顺序按 `queue_id` 的 FIFO 顺序，这是正确性要求
/// 而不是展示需求（离线期间先建后删同一条目时，乱序回放会复活已删条目）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue_id: u64,
    pub mutation: Mutation,
    /// 入队时刻（ISO-8601）
    pub enqueued_at: String,
}
