use crate::error::Result;

/// Checks a plaintext secret against a stored hash.
pub trait CredentialVerifier: Send + Sync {
    /// Returns `true` when `plaintext` matches `hash`. A malformed hash never matches.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

/// Produces the opaque hash stored for a password.
pub trait CredentialHasher: Send + Sync {
    /// Hashes `plaintext` for storage.
    fn hash(&self, plaintext: &str) -> Result<String>;
}

#[cfg(feature = "bcrypt")]
pub use self::bcrypt_impl::BcryptCredentials;

#[cfg(feature = "bcrypt")]
mod bcrypt_impl {
    use super::{CredentialHasher, CredentialVerifier};
    use crate::error::{Error, Result};
    use tracing::warn;

    /// bcrypt-backed hasher and verifier.
    #[derive(Debug, Clone, Copy)]
    pub struct BcryptCredentials {
        cost: u32,
    }

    impl BcryptCredentials {
        /// Uses bcrypt's default cost.
        pub fn new() -> Self {
            Self {
                cost: bcrypt::DEFAULT_COST,
            }
        }

        /// Uses a custom work factor. Low costs are only suitable for tests.
        pub fn with_cost(cost: u32) -> Self {
            Self { cost }
        }
    }

    impl Default for BcryptCredentials {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CredentialHasher for BcryptCredentials {
        fn hash(&self, plaintext: &str) -> Result<String> {
            bcrypt::hash(plaintext, self.cost)
                .map_err(|err| Error::Configuration(format!("failed to hash password: {err}")))
        }
    }

    impl CredentialVerifier for BcryptCredentials {
        fn verify(&self, plaintext: &str, hash: &str) -> bool {
            match bcrypt::verify(plaintext, hash) {
                Ok(matches) => matches,
                Err(err) => {
                    warn!(error = %err, "stored password hash is malformed");
                    false
                }
            }
        }
    }

}
