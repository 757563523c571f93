use std::sync::Arc;

use config::AppConfig;
use domain::{RepositoryError, SecretVerifier};
use thiserror::Error;
use tracing::info;

use crate::{db::ChatDatabase, password::BcryptSecretVerifier, repository::RedbRepository, storage::Store};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub repository: Arc<RedbRepository>,
    pub secret_verifier: Arc<BcryptSecretVerifier>,
}

impl Infrastructure {
    /// 打开（必要时创建）存储文件并初始化全部分区
    pub fn open(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let store = Store::open(&config.database.path)?;
        info!(path = %config.database.path, "storage opened");
        Ok(Self::assemble(store, config.server.bcrypt_cost))
    }

    /// 内存存储，测试使用
    pub fn in_memory(bcrypt_cost: Option<u32>) -> Result<Self, InfrastructureError> {
        Ok(Self::assemble(Store::in_memory()?, bcrypt_cost))
    }

    fn assemble(store: Store, bcrypt_cost: Option<u32>) -> Self {
        let secret_verifier = Arc::new(BcryptSecretVerifier::new(bcrypt_cost));
        let database = ChatDatabase::new(store, secret_verifier.clone());
        Self {
            repository: Arc::new(RedbRepository::new(Arc::new(database))),
            secret_verifier,
        }
    }

    pub fn secret_verifier_trait(&self) -> Arc<dyn SecretVerifier> {
        self.secret_verifier.clone()
    }
}
