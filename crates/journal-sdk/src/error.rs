use std::fmt;

#[derive(Debug)]
pub enum JournalSDKError {
    /// 本地持久化引擎无法打开（调用方应降级为空列表/禁用离线能力，而不是崩溃）
    StorageUnavailable(String),
    /// 网络或服务端错误（调用方应回退到入队或本地读取）
    RemoteUnavailable(String),
    NotFound(String),
    /// 校验失败（在任何 I/O 之前拒绝）
    ValidationFailed(String),
    KvStore(String),
    Serialization(String),
    IO(String),
    NotInitialized(String),
    Timeout(String),
    InvalidInput(String),
    Other(String),
}

impl fmt::Display for JournalSDKError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalSDKError::StorageUnavailable(e) => write!(f, "Storage unavailable: {}", e),
            JournalSDKError::RemoteUnavailable(e) => write!(f, "Remote unavailable: {}", e),
            JournalSDKError::NotFound(e) => write!(f, "Not found: {}", e),
            JournalSDKError::ValidationFailed(e) => write!(f, "Validation failed: {}", e),
            JournalSDKError::KvStore(e) => write!(f, "KV store error: {}", e),
            JournalSDKError::Serialization(e) => write!(f, "Serialization error: {}", e),
            JournalSDKError::IO(e) => write!(f, "IO error: {}", e),
            JournalSDKError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
            JournalSDKError::Timeout(e) => write!(f, "Timeout: {}", e),
            JournalSDKError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            JournalSDKError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for JournalSDKError {}

impl From<serde_json::Error> for JournalSDKError {
    fn from(error: serde_json::Error) -> Self {
        JournalSDKError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for JournalSDKError {
    fn from(error: std::io::Error) -> Self {
        JournalSDKError::IO(error.to_string())
    }
}

impl From<bincode::Error> for JournalSDKError {
    fn from(error: bincode::Error) -> Self {
        JournalSDKError::Serialization(error.to_string())
    }
}

impl JournalSDKError {
    /// 是否属于远端不可达一类的错误（此类错误走离线回退路径，而不是直接上抛）
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            JournalSDKError::RemoteUnavailable(_) | JournalSDKError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JournalSDKError>;
