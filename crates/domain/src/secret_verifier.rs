use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretError {
    #[error("hash error: {0}")]
    Hash(String),
    #[error("secret does not match")]
    Mismatch,
}

/// 单向哈希与比较能力，用于密码和邀请密钥。
///
/// 实现是同步的，调用方负责把它放到阻塞线程池里执行。
pub trait SecretVerifier: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, SecretError>;

    /// 明文与摘要匹配时返回 `Ok(())`，否则返回 `SecretError::Mismatch`
    fn verify(&self, digest: &str, plaintext: &str) -> Result<(), SecretError>;
}
