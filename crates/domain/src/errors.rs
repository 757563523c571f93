//! 领域模型错误定义
//!
//! `DomainError` 描述输入校验失败；`RepositoryError` 是持久层的错误分类，
//! 每一种都对应调用方可以区分处理的情形。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数校验失败
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    /// 创建参数校验错误
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 持久层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// 分区不存在，说明存储未初始化或已损坏
    #[error("partition \"{partition}\" not found")]
    PartitionNotFound { partition: String },

    /// 点查未命中
    #[error("could not fetch \"{key}\" from partition \"{partition}\"")]
    RecordNotFound { key: String, partition: String },

    /// 唯一性约束冲突
    #[error("\"{key}\" already exists in partition \"{partition}\"")]
    DuplicateKey { key: String, partition: String },

    /// 序列化失败
    #[error("failed to encode record: {0}")]
    Encoding(String),

    /// 反序列化失败
    #[error("failed to decode record: {0}")]
    Decoding(String),

    /// 密钥 / 邀请校验失败
    #[error("security check for {what} failed")]
    SecurityCheckFailed { what: String },

    /// 成员角色不足
    #[error("insufficient role for {action}")]
    AuthorizationFailed { action: String },

    /// 分页参数不合法
    #[error("invalid pagination range: page={page}, limit={limit}")]
    PaginationRange { page: i64, limit: i64 },

    /// 存储引擎本身的失败（I/O、提交等）
    #[error("storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn partition_not_found(partition: impl Into<String>) -> Self {
        Self::PartitionNotFound {
            partition: partition.into(),
        }
    }

    pub fn record_not_found(key: impl Into<String>, partition: impl Into<String>) -> Self {
        Self::RecordNotFound {
            key: key.into(),
            partition: partition.into(),
        }
    }

    pub fn duplicate_key(key: impl Into<String>, partition: impl Into<String>) -> Self {
        Self::DuplicateKey {
            key: key.into(),
            partition: partition.into(),
        }
    }

    pub fn security_check_failed(what: impl Into<String>) -> Self {
        Self::SecurityCheckFailed { what: what.into() }
    }

    pub fn authorization_failed(action: impl Into<String>) -> Self {
        Self::AuthorizationFailed {
            action: action.into(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }

    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// 点查未命中
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
