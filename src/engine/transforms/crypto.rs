//! AES-256-GCM field encryption.
//!
//! Ciphertext envelope: 12-byte random nonce ‖ ciphertext ‖ 16-byte
//! authentication tag, base-64 encoded. Key material is a base-64 32-byte
//! value, referenced in the mapping either literally or as an `${ENV_VAR}`
//! placeholder.

use crate::engine::error::{codes, ErrorInfo, ReshapeError, Result};
use crate::engine::metrics::EngineMetrics;
use crate::engine::transforms::value_to_text;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{error, warn};
use once_cell::sync::Lazy;
use openssl::symm::{decrypt_aead, encrypt_aead, Cipher};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Reusable AES-256-GCM helper bound to one key.
pub struct EncryptionHelper {
    key: Vec<u8>,
}

impl EncryptionHelper {
    /// Create a helper from a base-64 encoded 32-byte key.
    pub fn new(base64_key: &str) -> Result<Self> {
        let key = STANDARD
            .decode(base64_key)
            .map_err(|e| ReshapeError::Transform(format!("encryption key is not base-64: {e}")))?;
        if key.len() != KEY_LEN {
            return Err(ReshapeError::Transform(format!(
                "encryption key must be {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Ok(Self { key })
    }

    /// Encrypt a plaintext into the nonce‖ciphertext‖tag envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let mut tag = [0u8; TAG_LEN];
        let ciphertext = encrypt_aead(
            Cipher::aes_256_gcm(),
            &self.key,
            Some(&nonce),
            &[],
            plaintext.as_bytes(),
            &mut tag,
        )
        .map_err(|e| ReshapeError::Transform(format!("encryption failed: {e}")))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len() + TAG_LEN);
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        envelope.extend_from_slice(&tag);
        Ok(STANDARD.encode(envelope))
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, encrypted_base64: &str) -> Result<String> {
        if encrypted_base64.is_empty() {
            return Ok(String::new());
        }
        let envelope = STANDARD
            .decode(encrypted_base64)
            .map_err(|e| ReshapeError::Transform(format!("ciphertext is not base-64: {e}")))?;
        if envelope.len() < NONCE_LEN + TAG_LEN {
            return Err(ReshapeError::Transform(
                "ciphertext envelope too short".to_string(),
            ));
        }
        let (nonce, rest) = envelope.split_at(NONCE_LEN);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_LEN);
        let plaintext = decrypt_aead(
            Cipher::aes_256_gcm(),
            &self.key,
            Some(nonce),
            &[],
            ciphertext,
            tag,
        )
        .map_err(|e| ReshapeError::Transform(format!("decryption failed: {e}")))?;
        String::from_utf8(plaintext)
            .map_err(|e| ReshapeError::Transform(format!("decrypted value is not UTF-8: {e}")))
    }
}

/// Generate a fresh random 32-byte key, base-64 encoded.
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    STANDARD.encode(key)
}

/// Process-wide helper cache keyed by resolved key text, so repeated fields
/// sharing a key reuse one helper.
static HELPER_CACHE: Lazy<RwLock<HashMap<String, Arc<EncryptionHelper>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn helper_for(resolved_key: &str) -> Result<Arc<EncryptionHelper>> {
    if let Some(hit) = HELPER_CACHE.read().unwrap().get(resolved_key) {
        return Ok(Arc::clone(hit));
    }
    let helper = Arc::new(EncryptionHelper::new(resolved_key)?);
    HELPER_CACHE
        .write()
        .unwrap()
        .insert(resolved_key.to_string(), Arc::clone(&helper));
    Ok(helper)
}

/// Number of cached encryption helpers
pub fn cache_size() -> usize {
    HELPER_CACHE.read().unwrap().len()
}

/// Drop all cached helpers. Intended for host teardown.
pub fn clear_cache() {
    HELPER_CACHE.write().unwrap().clear();
}

/// `encrypt` transform entry point.
///
/// An absent key reference passes the value through with a warning; an unset
/// environment variable or unusable key material passes it through with an
/// error event. The record itself is never failed here.
pub fn encrypt_value(
    value: Value,
    key: Option<&str>,
    field_name: &str,
    errors: &mut Vec<ErrorInfo>,
) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    let Some(key) = key.filter(|k| !k.is_empty()) else {
        warn!("Encrypt transform for field={field_name} has no 'key' config, passing value through");
        return value;
    };

    let resolved = match resolve_key_reference(key) {
        Ok(resolved) => resolved,
        Err(message) => {
            error!("{message} (field={field_name})");
            errors.push(ErrorInfo::new(codes::TRANSFORM_ERROR, message).with_path(field_name));
            return value;
        }
    };

    let helper = match helper_for(&resolved) {
        Ok(helper) => helper,
        Err(e) => {
            error!("Unusable encryption key for field={field_name}: {e}");
            errors.push(ErrorInfo::new(codes::TRANSFORM_ERROR, e.to_string()).with_path(field_name));
            return value;
        }
    };

    EngineMetrics::global().record_encrypt_call();
    encrypt_node(value, &helper, field_name, errors)
}

fn encrypt_node(
    value: Value,
    helper: &EncryptionHelper,
    field_name: &str,
    errors: &mut Vec<ErrorInfo>,
) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|e| encrypt_node(e, helper, field_name, errors))
                .collect(),
        ),
        other => {
            let plaintext = value_to_text(&other);
            match helper.encrypt(&plaintext) {
                Ok(ciphertext) => Value::String(ciphertext),
                Err(e) => {
                    error!("Encryption failed for field={field_name}: {e}");
                    errors.push(
                        ErrorInfo::new(codes::TRANSFORM_ERROR, e.to_string())
                            .with_path(field_name),
                    );
                    other
                }
            }
        }
    }
}

/// Resolve a key reference: either literal base-64, or `${NAME}` read from
/// the environment.
fn resolve_key_reference(key: &str) -> std::result::Result<String, String> {
    if let Some(name) = key.strip_prefix("${").and_then(|k| k.strip_suffix('}')) {
        return std::env::var(name)
            .map_err(|_| format!("Environment variable {name} not set for encryption key"));
    }
    Ok(key.to_string())
}
