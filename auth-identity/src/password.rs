use tracing::warn;

use crate::config::DEFAULT_BCRYPT_COST;
use crate::error::{IdentityError, Result};

/// Adaptive one-way hashing for account passwords.
///
/// bcrypt is CPU bound, so both operations run on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub async fn hash(&self, plaintext: &str) -> Result<String> {
        let plaintext = plaintext.to_owned();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .map_err(|e| IdentityError::Hashing(e.to_string()))?
            .map_err(|e| IdentityError::Hashing(e.to_string()))
    }

    /// A malformed digest verifies as `false`
    pub async fn verify(&self, plaintext: &str, digest: &str) -> Result<bool> {
        let plaintext = plaintext.to_owned();
        let digest = digest.to_owned();

        let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &digest))
            .await
            .map_err(|e| IdentityError::Hashing(e.to_string()))?;

        match outcome {
            Ok(matches) => Ok(matches),
            Err(e) => {
                warn!(error = %e, "Stored password digest could not be parsed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(4);
        let digest = hasher.hash("correct horse").await.unwrap();

        assert_ne!(digest, "correct horse");
        assert!(hasher.verify("correct horse", &digest).await.unwrap());
        assert!(!hasher.verify("battery staple", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_default_cost_is_twelve() {
        let hasher = PasswordHasher::default();
        assert_eq!(hasher.cost(), 12);
    }

    #[tokio::test]
    async fn test_malformed_digest_does_not_verify() {
        let hasher = PasswordHasher::new(4);
        assert!(!hasher.verify("anything", "not-a-bcrypt-digest").await.unwrap());
    }
}
