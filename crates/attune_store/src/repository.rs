//! The encrypted state-check repository.
//!
//! Analysis and capture are encrypted independently, written as one atomic
//! record, and decrypted on read. Writes are serialized behind a gate;
//! reads run concurrently. A store whose persisted schema is newer than
//! this build opens read-only.

use crate::crypto::{self, CipherEnvelope, KeyVault};
use crate::retry::with_retry;
use crate::store::{KeyedStore, FACIAL_BASELINE, KEYVAL, STATE_CHECKS};
use attune_core::config::{CryptoConfig, RetryScheduleConfig};
use attune_core::{AttuneError, FacialAnalysis, FacialBaseline};
use attune_vision::Normalizer;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Current persisted schema. v1 records carried no per-record version or
/// user note; the v2 migration stamps both.
pub const SCHEMA_VERSION: u32 = 2;

/// Default window for recent-history reads.
pub const DEFAULT_RECENT_LIMIT: usize = 7;

const KEYVAL_SCHEMA_VERSION: &str = "schema_version";
const BASELINE_KEY: &str = "active";

/// The persisted form: ciphertext plus metadata, no plaintext analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCheckRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Base64 AES-GCM ciphertext of the canonical analysis JSON.
    pub analysis_cipher: String,
    /// Base64 12-byte nonce, unique per record.
    pub iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_cipher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_iv: Option<String>,
    #[serde(default)]
    pub user_note: String,
    #[serde(default = "default_record_version")]
    pub schema_version: u32,
}

fn default_record_version() -> u32 {
    1
}

/// A decrypted record as handed back to callers.
#[derive(Debug, Clone)]
pub struct StateCheck {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub analysis: FacialAnalysis,
    pub image: Option<Vec<u8>>,
    pub user_note: String,
}

/// Caller-supplied input to a save. The analysis arrives as raw JSON so a
/// malformed one can be routed through the normalizer's default-filling
/// path; saving never refuses.
#[derive(Debug, Clone, Default)]
pub struct StateCheckDraft {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub analysis: Value,
    pub user_note: Option<String>,
}

impl StateCheckDraft {
    pub fn from_analysis(analysis: &FacialAnalysis) -> Self {
        Self {
            analysis: serde_json::to_value(analysis).unwrap_or(Value::Null),
            ..Default::default()
        }
    }
}

pub struct StateCheckRepository {
    store: Arc<dyn KeyedStore>,
    vault: KeyVault,
    retry: RetryScheduleConfig,
    write_gate: Mutex<()>,
    read_only: bool,
    persisted_version: u32,
}

impl StateCheckRepository {
    /// Open the repository over a keyed store, running forward migrations.
    /// A persisted schema newer than this build leaves the repository
    /// readable but rejects writes with `SchemaMismatch`.
    pub async fn open(
        store: Arc<dyn KeyedStore>,
        crypto_config: CryptoConfig,
        retry: RetryScheduleConfig,
    ) -> Result<Self, AttuneError> {
        let persisted = read_schema_version(store.as_ref()).await?;

        let mut repo = Self {
            store,
            vault: KeyVault::new(crypto_config),
            retry,
            write_gate: Mutex::new(()),
            read_only: false,
            persisted_version: persisted.unwrap_or(SCHEMA_VERSION),
        };

        match persisted {
            None => {
                write_schema_version(repo.store.as_ref(), SCHEMA_VERSION).await?;
                repo.persisted_version = SCHEMA_VERSION;
            }
            Some(v) if v < SCHEMA_VERSION => {
                repo.migrate(v).await?;
                write_schema_version(repo.store.as_ref(), SCHEMA_VERSION).await?;
                repo.persisted_version = SCHEMA_VERSION;
            }
            Some(v) if v > SCHEMA_VERSION => {
                tracing::warn!(
                    found = v,
                    supported = SCHEMA_VERSION,
                    "persisted schema is newer than this build; opening read-only"
                );
                repo.read_only = true;
            }
            Some(_) => {}
        }

        Ok(repo)
    }

    /// Forward-only migrations. Records are rewritten in place, never
    /// destroyed.
    async fn migrate(&self, from: u32) -> Result<(), AttuneError> {
        if from < 2 {
            // v1 → v2: stamp per-record schema version and default the note.
            let all = self
                .store
                .get_all(STATE_CHECKS)
                .await
                .map_err(|e| AttuneError::Storage(e.to_string()))?;
            let mut migrated = 0usize;
            for bytes in all {
                let Ok(mut value) = serde_json::from_slice::<Value>(&bytes) else {
                    continue;
                };
                let Some(obj) = value.as_object_mut() else {
                    continue;
                };
                if obj.contains_key("schemaVersion") {
                    continue;
                }
                obj.insert("schemaVersion".to_string(), Value::from(2));
                obj.entry("userNote").or_insert_with(|| Value::from(""));
                let Some(id) = obj.get("id").and_then(Value::as_str).map(str::to_string) else {
                    continue;
                };
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| AttuneError::Storage(e.to_string()))?;
                self.store
                    .put(STATE_CHECKS, &id, bytes)
                    .await
                    .map_err(|e| AttuneError::Storage(e.to_string()))?;
                migrated += 1;
            }
            tracing::info!(migrated, "migrated state-check records to schema v2");
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), AttuneError> {
        if self.read_only {
            return Err(AttuneError::SchemaMismatch {
                found: self.persisted_version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    fn generate_id() -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(9)
            .map(|c| (c as char).to_ascii_lowercase())
            .collect();
        format!("state_{}_{}", Utc::now().timestamp_millis(), suffix)
    }

    /// Coerce a draft's analysis into canonical form before encryption.
    /// Normalization is idempotent, so canonical input passes through
    /// unchanged while malformed input takes the default-filling path.
    fn canonical_analysis(value: &Value) -> FacialAnalysis {
        if !value.is_object() {
            tracing::debug!("draft analysis not an object, default-filling before save");
        }
        Normalizer::new().normalize_value(value)
    }

    /// Encrypt and persist one state check; returns its id. Idempotent on
    /// id: a second save with the same id replaces the record.
    /// Cancellation is not honored here: the write commits or fails.
    pub async fn save_state_check(
        &self,
        draft: StateCheckDraft,
        image: Option<&[u8]>,
    ) -> Result<String, AttuneError> {
        self.ensure_writable()?;

        let analysis = Self::canonical_analysis(&draft.analysis);
        let key = self.vault.data_key(self.store.as_ref()).await?;

        let analysis_json =
            serde_json::to_vec(&analysis).map_err(|e| AttuneError::Storage(e.to_string()))?;
        let analysis_env = crypto::encrypt(&key, &analysis_json)?;
        let image_env = image.map(|bytes| crypto::encrypt(&key, bytes)).transpose()?;

        let record = StateCheckRecord {
            id: draft.id.unwrap_or_else(Self::generate_id),
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
            analysis_cipher: BASE64.encode(&analysis_env.data),
            iv: BASE64.encode(&analysis_env.iv),
            image_cipher: image_env.as_ref().map(|e| BASE64.encode(&e.data)),
            image_iv: image_env.as_ref().map(|e| BASE64.encode(&e.iv)),
            user_note: draft.user_note.unwrap_or_default(),
            schema_version: SCHEMA_VERSION,
        };
        let bytes =
            serde_json::to_vec(&record).map_err(|e| AttuneError::Storage(e.to_string()))?;

        let _gate = self.write_gate.lock().await;
        let store = Arc::clone(&self.store);
        let id = record.id.clone();
        with_retry(&self.retry, "save_state_check", || {
            let store = Arc::clone(&store);
            let id = id.clone();
            let bytes = bytes.clone();
            async move {
                store.open().await?;
                store.put(STATE_CHECKS, &id, bytes).await
            }
        })
        .await?;

        tracing::debug!(%id, has_image = image.is_some(), "state check saved");
        Ok(id)
    }

    /// Fetch and decrypt one record. Absence is `None`; a cipher that fails
    /// to verify surfaces `Decrypt`.
    pub async fn get_state_check(&self, id: &str) -> Result<Option<StateCheck>, AttuneError> {
        let store = Arc::clone(&self.store);
        let bytes = with_retry(&self.retry, "get_state_check", || {
            let store = Arc::clone(&store);
            let id = id.to_string();
            async move {
                store.open().await?;
                store.get(STATE_CHECKS, &id).await
            }
        })
        .await?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let record: StateCheckRecord =
            serde_json::from_slice(&bytes).map_err(|e| AttuneError::Storage(e.to_string()))?;
        let key = self.vault.data_key(self.store.as_ref()).await?;
        self.decrypt_record(&key, record).map(Some)
    }

    /// The most recent records, timestamp-descending, at most `limit`.
    ///
    /// Undecryptable records are skipped and logged once per retrieval.
    /// A caller-requested abort mid-decrypt stops the loop and returns what
    /// was read so far.
    pub async fn get_recent_state_checks(
        &self,
        limit: usize,
        signal: Option<&CancellationToken>,
    ) -> Result<Vec<StateCheck>, AttuneError> {
        let store = Arc::clone(&self.store);
        let all = with_retry(&self.retry, "get_recent_state_checks", || {
            let store = Arc::clone(&store);
            async move {
                store.open().await?;
                store.get_all(STATE_CHECKS).await
            }
        })
        .await?;

        let mut records: Vec<StateCheckRecord> = all
            .iter()
            .filter_map(|bytes| serde_json::from_slice(bytes).ok())
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let key = self.vault.data_key(self.store.as_ref()).await?;
        let mut out = Vec::with_capacity(limit.min(records.len()));
        let mut skipped = 0usize;
        for record in records {
            if out.len() == limit {
                break;
            }
            if signal.is_some_and(|token| token.is_cancelled()) {
                tracing::debug!("recent-records read aborted by caller");
                break;
            }
            match self.decrypt_record(&key, record) {
                Ok(check) => out.push(check),
                Err(AttuneError::Decrypt) => skipped += 1,
                Err(e) => return Err(e),
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "skipped undecryptable state-check records");
        }
        Ok(out)
    }

    fn decrypt_record(
        &self,
        key: &[u8; crypto::KEY_LEN],
        record: StateCheckRecord,
    ) -> Result<StateCheck, AttuneError> {
        let envelope = decode_envelope(&record.iv, &record.analysis_cipher)?;
        let plaintext = crypto::decrypt(key, &envelope.iv, &envelope.data)?;
        let analysis: FacialAnalysis =
            serde_json::from_slice(&plaintext).map_err(|e| AttuneError::Storage(e.to_string()))?;

        let image = match (&record.image_iv, &record.image_cipher) {
            (Some(iv), Some(cipher)) => {
                let envelope = decode_envelope(iv, cipher)?;
                Some(crypto::decrypt(key, &envelope.iv, &envelope.data)?)
            }
            _ => None,
        };

        Ok(StateCheck {
            id: record.id,
            timestamp: record.timestamp,
            analysis,
            image,
            user_note: record.user_note,
        })
    }

    /// Overwrite-on-write: the new baseline supersedes the old one.
    pub async fn save_baseline(&self, baseline: &FacialBaseline) -> Result<(), AttuneError> {
        self.ensure_writable()?;
        let bytes =
            serde_json::to_vec(baseline).map_err(|e| AttuneError::Storage(e.to_string()))?;

        let _gate = self.write_gate.lock().await;
        let store = Arc::clone(&self.store);
        with_retry(&self.retry, "save_baseline", || {
            let store = Arc::clone(&store);
            let bytes = bytes.clone();
            async move {
                store.open().await?;
                store.put(FACIAL_BASELINE, BASELINE_KEY, bytes).await
            }
        })
        .await
    }

    pub async fn get_baseline(&self) -> Result<Option<FacialBaseline>, AttuneError> {
        let store = Arc::clone(&self.store);
        let bytes = with_retry(&self.retry, "get_baseline", || {
            let store = Arc::clone(&store);
            async move {
                store.open().await?;
                store.get(FACIAL_BASELINE, BASELINE_KEY).await
            }
        })
        .await?;
        match bytes {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AttuneError::Storage(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn delete_baseline(&self) -> Result<(), AttuneError> {
        self.ensure_writable()?;
        let _gate = self.write_gate.lock().await;
        let store = Arc::clone(&self.store);
        with_retry(&self.retry, "delete_baseline", || {
            let store = Arc::clone(&store);
            async move {
                store.open().await?;
                store.delete(FACIAL_BASELINE, BASELINE_KEY).await
            }
        })
        .await
    }
}

fn decode_envelope(iv_b64: &str, data_b64: &str) -> Result<CipherEnvelope, AttuneError> {
    let iv = BASE64.decode(iv_b64).map_err(|_| AttuneError::Decrypt)?;
    let data = BASE64.decode(data_b64).map_err(|_| AttuneError::Decrypt)?;
    Ok(CipherEnvelope { iv, data })
}

async fn read_schema_version(store: &dyn KeyedStore) -> Result<Option<u32>, AttuneError> {
    let bytes = store
        .get(KEYVAL, KEYVAL_SCHEMA_VERSION)
        .await
        .map_err(|e| AttuneError::Storage(e.to_string()))?;
    match bytes {
        Some(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            text.trim()
                .parse::<u32>()
                .map(Some)
                .map_err(|_| AttuneError::Storage(format!("unreadable schema version: {}", text)))
        }
        None => Ok(None),
    }
}

async fn write_schema_version(store: &dyn KeyedStore, version: u32) -> Result<(), AttuneError> {
    store
        .put(
            KEYVAL,
            KEYVAL_SCHEMA_VERSION,
            version.to_string().into_bytes(),
        )
        .await
        .map_err(|e| AttuneError::Storage(e.to_string()))
}
