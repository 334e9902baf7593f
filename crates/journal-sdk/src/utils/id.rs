//! 客户端本地 ID 生成
//!
//! 条目在客户端创建时即分配一个基于时间的唯一 ID（雪花 ID 的十进制字符串），
//! 同步成功后由服务端分配的 ID 替换（显式重映射，见 sync 模块）。

use crate::error::{JournalSDKError, Result};

/// 雪花 ID 生成器封装
pub struct IdGenerator {
    snowflake: snowflake_me::Snowflake,
}

impl IdGenerator {
    /// 创建生成器
    ///
    /// 注意：使用 StdRng 而不是 thread_rng()，因为 thread_rng() 不是 Send 的，
    /// 不能在 async 上下文中持有。
    pub fn new() -> Result<Self> {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::from_entropy();
        let machine_id: u16 = rng.gen_range(0..32);
        let data_center_id: u16 = rng.gen_range(0..32);

        let snowflake = snowflake_me::Snowflake::builder()
            .machine_id(&|| Ok(machine_id))
            .data_center_id(&|| Ok(data_center_id))
            .finalize()
            .map_err(|e| JournalSDKError::Other(format!("初始化 Snowflake 失败: {:?}", e)))?;

        Ok(Self { snowflake })
    }

    /// 生成一个客户端本地 ID（基于时间，进程内唯一）
    pub fn next_client_id(&self) -> Result<String> {
        let id = self
            .snowflake
            .next_id()
            .map_err(|e| JournalSDKError::Other(format!("生成客户端 ID 失败: {:?}", e)))?;
        Ok(id.to_string())
    }
}
