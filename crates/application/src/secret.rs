//! 在阻塞线程池中执行密钥哈希与比较

use std::sync::Arc;

use domain::{SecretError, SecretVerifier};

pub async fn hash_secret(
    verifier: Arc<dyn SecretVerifier>,
    plaintext: String,
) -> Result<String, SecretError> {
    tokio::task::spawn_blocking(move || verifier.hash(&plaintext))
        .await
        .map_err(|err| SecretError::Hash(err.to_string()))?
}

pub async fn verify_secret(
    verifier: Arc<dyn SecretVerifier>,
    digest: String,
    plaintext: String,
) -> Result<(), SecretError> {
    tokio::task::spawn_blocking(move || verifier.verify(&digest, &plaintext))
        .await
        .map_err(|err| SecretError::Hash(err.to_string()))?
}
