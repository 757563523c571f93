use domain::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to issue token: {0}")]
    Issue(String),
    #[error("invalid token: {0}")]
    Invalid(String),
}

impl CredentialError {
    pub fn issue(message: impl Into<String>) -> Self {
        Self::Issue(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// 签发和校验不透明访问令牌的能力。
///
/// 令牌携带主体标识与过期时间，具体格式由实现决定。
#[cfg_attr(test, mockall::automock)]
pub trait CredentialService: Send + Sync {
    /// 为主体签发新令牌
    fn issue(&self, subject: UserId) -> Result<String, CredentialError>;

    /// 只校验签名与格式，不判断是否过期
    fn validate(&self, token: &str) -> Result<(), CredentialError>;

    /// 取出令牌中的主体标识
    fn subject_of(&self, token: &str) -> Result<String, CredentialError>;

    /// 无法解析的令牌视为已过期
    fn is_expired(&self, token: &str) -> bool;
}
