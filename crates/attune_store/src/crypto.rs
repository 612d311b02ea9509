//! AES-256-GCM envelopes and the process-wide key vault.
//!
//! Every encrypted field gets its own random 12-byte IV. The data key is
//! generated once, wrapped with a PBKDF2-derived key-encryption key, and the
//! wrapped form plus its salt live in the host's keyed store. Nothing in
//! this module logs key material.

use crate::store::{KeyedStore, KEYVAL};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use attune_core::config::CryptoConfig;
use attune_core::AttuneError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::OnceCell;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const SALT_LEN: usize = 16;

const KEYVAL_SALT: &str = "key_salt";
const KEYVAL_WRAPPED_KEY: &str = "wrapped_key";
const KEYVAL_DEVICE_SECRET: &str = "device_secret";

/// One encrypted field: IV plus ciphertext, both opaque bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherEnvelope {
    pub iv: Vec<u8>,
    pub data: Vec<u8>,
}

/// Encrypt plaintext under a fresh random IV.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<CipherEnvelope, AttuneError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| AttuneError::Storage("invalid encryption key length".to_string()))?;
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let data = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| AttuneError::Storage("encryption failed".to_string()))?;
    Ok(CipherEnvelope {
        iv: iv.to_vec(),
        data,
    })
}

/// Decrypt and authenticate. A cipher that does not verify is `Decrypt`,
/// not a generic storage failure.
pub fn decrypt(key: &[u8; KEY_LEN], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, AttuneError> {
    if iv.len() != IV_LEN {
        return Err(AttuneError::Decrypt);
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| AttuneError::Storage("invalid encryption key length".to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(iv), data)
        .map_err(|_| AttuneError::Decrypt)
}

/// Derive a key-encryption key from the device secret.
fn derive_kek(secret: &[u8], salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut kek = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut kek);
    kek
}

/// Lazily-initialized data key, wrapped at rest.
///
/// Lifecycle: unwrapped (or created) on first use, held for the life of the
/// process, dropped at exit. The unwrapped key never leaves this struct.
pub struct KeyVault {
    config: CryptoConfig,
    key: OnceCell<[u8; KEY_LEN]>,
}

impl KeyVault {
    pub fn new(config: CryptoConfig) -> Self {
        Self {
            config,
            key: OnceCell::new(),
        }
    }

    /// The data key, unwrapping from the store on first use and creating a
    /// fresh wrapped key when none exists yet.
    pub async fn data_key(&self, store: &dyn KeyedStore) -> Result<[u8; KEY_LEN], AttuneError> {
        self.key
            .get_or_try_init(|| self.load_or_create(store))
            .await
            .copied()
    }

    async fn load_or_create(&self, store: &dyn KeyedStore) -> Result<[u8; KEY_LEN], AttuneError> {
        let secret = self.device_secret(store).await?;
        let iterations = self.config.effective_iterations();

        let salt = store
            .get(KEYVAL, KEYVAL_SALT)
            .await
            .map_err(|e| AttuneError::Storage(e.to_string()))?;
        let wrapped = store
            .get(KEYVAL, KEYVAL_WRAPPED_KEY)
            .await
            .map_err(|e| AttuneError::Storage(e.to_string()))?;

        match (salt, wrapped) {
            (Some(salt), Some(wrapped)) => {
                let envelope: CipherEnvelope = serde_json::from_slice(&wrapped)
                    .map_err(|e| AttuneError::Storage(format!("wrapped key unreadable: {}", e)))?;
                let kek = derive_kek(&secret, &salt, iterations);
                let key_bytes = decrypt(&kek, &envelope.iv, &envelope.data)?;
                let key: [u8; KEY_LEN] = key_bytes
                    .try_into()
                    .map_err(|_| AttuneError::Decrypt)?;
                tracing::debug!("data key unwrapped");
                Ok(key)
            }
            _ => {
                let mut key = [0u8; KEY_LEN];
                OsRng.fill_bytes(&mut key);
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);

                let kek = derive_kek(&secret, &salt, iterations);
                let envelope = encrypt(&kek, &key)?;
                let wrapped = serde_json::to_vec(&envelope)
                    .map_err(|e| AttuneError::Storage(e.to_string()))?;

                store
                    .put(KEYVAL, KEYVAL_SALT, salt.to_vec())
                    .await
                    .map_err(|e| AttuneError::Storage(e.to_string()))?;
                store
                    .put(KEYVAL, KEYVAL_WRAPPED_KEY, wrapped)
                    .await
                    .map_err(|e| AttuneError::Storage(e.to_string()))?;
                tracing::info!(iterations, "generated and wrapped a new data key");
                Ok(key)
            }
        }
    }

    /// The secret feeding key derivation: configured, or generated once and
    /// kept in the host's process-local store.
    async fn device_secret(&self, store: &dyn KeyedStore) -> Result<Vec<u8>, AttuneError> {
        if let Some(secret) = &self.config.device_secret {
            return Ok(secret.as_bytes().to_vec());
        }
        if let Some(stored) = store
            .get(KEYVAL, KEYVAL_DEVICE_SECRET)
            .await
            .map_err(|e| AttuneError::Storage(e.to_string()))?
        {
            return Ok(stored);
        }
        let mut generated = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut generated);
        let encoded = BASE64.encode(generated).into_bytes();
        store
            .put(KEYVAL, KEYVAL_DEVICE_SECRET, encoded.clone())
            .await
            .map_err(|e| AttuneError::Storage(e.to_string()))?;
        tracing::info!("generated a device secret");
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_config() -> CryptoConfig {
        CryptoConfig {
            pbkdf2_iterations: 100_000,
            device_secret: Some("test-device-secret".to_string()),
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [7u8; KEY_LEN];
        let envelope = encrypt(&key, b"plaintext payload").unwrap();
        assert_eq!(envelope.iv.len(), IV_LEN);
        let back = decrypt(&key, &envelope.iv, &envelope.data).unwrap();
        assert_eq!(back, b"plaintext payload");
    }

    #[test]
    fn test_decrypt_with_wrong_iv_fails() {
        let key = [7u8; KEY_LEN];
        let envelope = encrypt(&key, b"plaintext payload").unwrap();
        let mut wrong_iv = envelope.iv.clone();
        wrong_iv[0] ^= 0xff;
        assert!(matches!(
            decrypt(&key, &wrong_iv, &envelope.data),
            Err(AttuneError::Decrypt)
        ));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let envelope = encrypt(&[7u8; KEY_LEN], b"secret").unwrap();
        assert!(matches!(
            decrypt(&[8u8; KEY_LEN], &envelope.iv, &envelope.data),
            Err(AttuneError::Decrypt)
        ));
    }

    #[test]
    fn test_each_envelope_gets_unique_iv() {
        let key = [7u8; KEY_LEN];
        let a = encrypt(&key, b"same input").unwrap();
        let b = encrypt(&key, b"same input").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.data, b.data);
    }

    #[tokio::test]
    async fn test_vault_key_is_stable_across_unwraps() {
        let store = MemoryStore::new();
        let first = {
            let vault = KeyVault::new(test_config());
            vault.data_key(&store).await.unwrap()
        };
        // A second vault over the same store unwraps the same key.
        let second = {
            let vault = KeyVault::new(test_config());
            vault.data_key(&store).await.unwrap()
        };
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_vault_generates_device_secret_when_unconfigured() {
        let store = MemoryStore::new();
        let vault = KeyVault::new(CryptoConfig::default());
        let first = vault.data_key(&store).await.unwrap();

        let vault2 = KeyVault::new(CryptoConfig::default());
        let second = vault2.data_key(&store).await.unwrap();
        assert_eq!(first, second);

        assert!(store
            .get(KEYVAL, KEYVAL_DEVICE_SECRET)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_wrong_device_secret_fails_unwrap() {
        let store = MemoryStore::new();
        let vault = KeyVault::new(test_config());
        vault.data_key(&store).await.unwrap();

        let wrong = KeyVault::new(CryptoConfig {
            pbkdf2_iterations: 100_000,
            device_secret: Some("a different secret".to_string()),
        });
        assert!(matches!(
            wrong.data_key(&store).await,
            Err(AttuneError::Decrypt)
        ));
    }
}
