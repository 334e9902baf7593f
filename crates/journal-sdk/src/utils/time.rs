//! 时间处理工具模块
//!
//! 统一生成条目的三类时间字段：
//! - **timestamp**: ISO-8601 创建时刻（带毫秒，UTC）
//! - **date**: 展示用日期（`Tue Aug 04 2026` 形态，由展示层直接使用）
//! - **export stamp**: 导出文件名里的日期（`2026-08-04`）

use chrono::{DateTime, SecondsFormat, Utc};

/// 时间格式化工具
pub struct TimeFormatter;

impl TimeFormatter {
    /// ISO-8601 时间戳（UTC，毫秒精度）
    pub fn iso_timestamp(instant: DateTime<Utc>) -> String {
        instant.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// 当前时刻的 ISO-8601 时间戳
    pub fn iso_now() -> String {
        Self::iso_timestamp(Utc::now())
    }

    /// 展示用日期，如 `Tue Aug 04 2026`
    pub fn display_date(instant: DateTime<Utc>) -> String {
        instant.format("%a %b %d %Y").to_string()
    }

    /// 当前时刻的展示用日期
    pub fn display_date_now() -> String {
        Self::display_date(Utc::now())
    }

    /// 导出文件名中的日期戳，如 `2026-08-04`
    pub fn export_stamp(instant: DateTime<Utc>) -> String {
        instant.format("%Y-%m-%d").to_string()
    }

    /// 当前时刻的导出日期戳
    pub fn export_stamp_now() -> String {
        Self::export_stamp(Utc::now())
    }
}
