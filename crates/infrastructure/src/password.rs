use bcrypt::{hash, verify, DEFAULT_COST};
use domain::{SecretError, SecretVerifier};

/// bcrypt 实现的密钥哈希，用于用户密码和邀请密钥
#[derive(Debug, Clone)]
pub struct BcryptSecretVerifier {
    cost: u32,
}

impl BcryptSecretVerifier {
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: cost.unwrap_or(DEFAULT_COST),
        }
    }
}

impl SecretVerifier for BcryptSecretVerifier {
    fn hash(&self, plaintext: &str) -> Result<String, SecretError> {
        hash(plaintext, self.cost).map_err(|err| SecretError::Hash(err.to_string()))
    }

    fn verify(&self, digest: &str, plaintext: &str) -> Result<(), SecretError> {
        match verify(plaintext, digest) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SecretError::Mismatch),
            Err(err) => Err(SecretError::Hash(err.to_string())),
        }
    }
}

impl Default for BcryptSecretVerifier {
    fn default() -> Self {
        Self::new(Some(DEFAULT_COST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_verifies_only_the_original_secret() {
        let verifier = BcryptSecretVerifier::new(Some(4));
        let digest = verifier.hash("open-sesame").unwrap();

        assert_ne!(digest, "open-sesame");
        assert!(verifier.verify(&digest, "open-sesame").is_ok());
        assert_eq!(
            verifier.verify(&digest, "open-sesam3"),
            Err(SecretError::Mismatch)
        );
    }

    #[test]
    fn same_secret_hashes_differently() {
        let verifier = BcryptSecretVerifier::new(Some(4));
        let first = verifier.hash("password123").unwrap();
        let second = verifier.hash("password123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_digest_is_a_hash_error() {
        let verifier = BcryptSecretVerifier::new(Some(4));
        assert!(matches!(
            verifier.verify("not-a-bcrypt-digest", "x"),
            Err(SecretError::Hash(_))
        ));
    }
}
