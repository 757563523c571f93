use domain::{DomainError, RepositoryError, SecretError};
use thiserror::Error;

use crate::{credential::CredentialError, hub::HubError};

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("hub error: {0}")]
    Hub(#[from] HubError),
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
    /// 登录 / 令牌校验失败，不区分具体原因
    #[error("authentication failed")]
    Authentication,
}

impl ApplicationError {
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure(message.into())
    }

    /// 成员角色不足
    pub fn forbidden(action: impl Into<String>) -> Self {
        ApplicationError::Repository(RepositoryError::authorization_failed(action))
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
