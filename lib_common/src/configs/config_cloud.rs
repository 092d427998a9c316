//! # Cloud Configuration Module
//!
//! This module provides utilities to retrieve, decrypt, and parse configuration
//! files stored in cloud environments. It supports AES-256-CBC decryption; the
//! decrypted JSON object is flattened into the same `section:key` form the
//! file configuration uses, so it can be overlaid on it.
//!
//! ## File format:
//! - Line 1: base64 initialization vector (16 bytes).
//! - Line 2: base64 ciphertext (PKCS7 padded).
//!
//! The key is a hex-encoded 32-byte value.

use std::collections::BTreeMap;
use std::env;

use aes::Aes256;
use base64::{engine::general_purpose, Engine as _};
use cbc::Decryptor;
use cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use serde_json::Value;
use thiserror::Error;

/// Environment variable holding the configuration URL.
pub const CLOUD_CONFIG_URL_VAR: &str = "WEBLIB_CLOUD_CONFIG_URL";
/// Environment variable holding the hex key.
pub const AES_PASSWORD_VAR: &str = "WEBLIB_AES_PASSWORD";

/// Errors that can occur during the cloud configuration lifecycle.
#[derive(Debug, Error, Clone)]
pub enum CloudConfigError {
    /// Errors specifically for when a required environment variable is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Errors occurring during HTTP requests or network connectivity.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Errors occurring during the AES decryption process or key validation.
    #[error("Decryption error: {0}")]
    DecryptionError(String),

    /// Errors resulting from malformed JSON content within the decrypted data.
    #[error("JSON parse error: {0}")]
    JsonError(String),

    /// Errors related to the structure of the retrieved file (e.g., missing IV or ciphertext).
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

/// Whether both cloud configuration variables are set.
pub fn cloud_config_requested() -> bool {
    env::var(CLOUD_CONFIG_URL_VAR).is_ok() && env::var(AES_PASSWORD_VAR).is_ok()
}

/// Retrieves and decrypts the configuration from a remote URL.
///
/// # Arguments
///
/// * `url` - An optional URL override. Defaults to `WEBLIB_CLOUD_CONFIG_URL`.
/// * `password` - An optional hex-encoded 32-byte key. Defaults to `WEBLIB_AES_PASSWORD`.
pub async fn load_cloud_config(
    url: Option<String>,
    password: Option<String>,
) -> Result<Value, CloudConfigError> {
    let password = password
        .or_else(|| env::var(AES_PASSWORD_VAR).ok())
        .ok_or_else(|| CloudConfigError::MissingEnvVar(AES_PASSWORD_VAR.to_string()))?;

    let url = url
        .or_else(|| env::var(CLOUD_CONFIG_URL_VAR).ok())
        .ok_or_else(|| CloudConfigError::MissingEnvVar(CLOUD_CONFIG_URL_VAR.to_string()))?;

    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e: reqwest::Error| CloudConfigError::NetworkError(e.to_string()))?;

    if !response.status().is_success() {
        return Err(CloudConfigError::NetworkError(format!(
            "HTTP request failed with status: {}",
            response.status()
        )));
    }

    let content = response
        .text()
        .await
        .map_err(|e: reqwest::Error| CloudConfigError::NetworkError(e.to_string()))?;

    decrypt_cloud_payload(&content, &password)
}

/// Decrypts a two-line IV/ciphertext payload with a hex key and parses it as JSON.
pub fn decrypt_cloud_payload(content: &str, key_hex: &str) -> Result<Value, CloudConfigError> {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.len() < 2 {
        return Err(CloudConfigError::InvalidData(format!(
            "File format error: expected at least 2 lines, found {}",
            lines.len()
        )));
    }

    let iv = general_purpose::STANDARD
        .decode(lines[0])
        .map_err(|e| CloudConfigError::InvalidData(format!("Invalid Base64 IV: {}", e)))?;

    let mut buf = general_purpose::STANDARD
        .decode(lines[1])
        .map_err(|e| CloudConfigError::InvalidData(format!("Invalid Base64 Ciphertext: {}", e)))?;

    let key_vec = hex::decode(key_hex.trim())
        .map_err(|e| CloudConfigError::DecryptionError(format!("Invalid Key Hex: {}", e)))?;

    let key_arr: [u8; 32] = key_vec.as_slice().try_into().map_err(|_| {
        CloudConfigError::DecryptionError(format!("Key must be 32 bytes, found {}", key_vec.len()))
    })?;
    let iv_arr: [u8; 16] = iv
        .as_slice()
        .try_into()
        .map_err(|_| CloudConfigError::InvalidData(format!("Invalid IV length: {}", iv.len())))?;

    if buf.is_empty() {
        return Err(CloudConfigError::DecryptionError("Ciphertext is empty".to_string()));
    }

    let decryptor = Decryptor::<Aes256>::new(&key_arr.into(), &iv_arr.into());
    let decrypted_data = decryptor.decrypt_padded_mut::<Pkcs7>(&mut buf).map_err(|e| {
        CloudConfigError::DecryptionError(format!(
            "Decryption failed: {:?}. Verify the decryption key.",
            e
        ))
    })?;

    serde_json::from_slice(decrypted_data).map_err(|e| CloudConfigError::JsonError(e.to_string()))
}

/// Flattens a JSON object into lowercased `section:key` entries.
///
/// Arrays are indexed (`piicolumns:0`), scalars are stringified and nulls are skipped.
pub fn flatten_json(value: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, prefix: String, out: &mut BTreeMap<String, String>) {
    let child = |key: &str| {
        if prefix.is_empty() {
            key.to_lowercase()
        } else {
            format!("{}:{}", prefix, key.to_lowercase())
        }
    };

    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                flatten_into(inner, child(key), out);
            }
        }
        Value::Array(items) => {
            for (index, inner) in items.iter().enumerate() {
                flatten_into(inner, child(&index.to_string()), out);
            }
        }
        Value::Null => {}
        Value::String(s) => {
            out.insert(prefix, s.clone());
        }
        other => {
            out.insert(prefix, other.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::Encryptor;
    use cipher::BlockEncryptMut;
    use serde_json::json;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn encrypt(plaintext: &[u8], iv: [u8; 16]) -> String {
        let key: [u8; 32] = hex::decode(KEY_HEX).unwrap().try_into().unwrap();
        let ciphertext = Encryptor::<Aes256>::new(&key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        format!(
            "{}\n{}\n",
            general_purpose::STANDARD.encode(iv),
            general_purpose::STANDARD.encode(ciphertext)
        )
    }

    #[test]
    fn decrypts_and_parses_payload() {
        let payload = encrypt(br#"{"S3": {"BucketName": "secret-bucket"}}"#, [7u8; 16]);
        let value = decrypt_cloud_payload(&payload, KEY_HEX).unwrap();
        assert_eq!(value["S3"]["BucketName"], "secret-bucket");
    }

    #[test]
    fn wrong_key_fails() {
        let payload = encrypt(br#"{"a": 1}"#, [1u8; 16]);
        let other_key = "ff".repeat(32);
        assert!(decrypt_cloud_payload(&payload, &other_key).is_err());
    }

    #[test]
    fn short_key_and_single_line_are_rejected() {
        let payload = encrypt(br#"{"a": 1}"#, [1u8; 16]);
        assert!(matches!(
            decrypt_cloud_payload(&payload, "0011"),
            Err(CloudConfigError::DecryptionError(_))
        ));
        assert!(matches!(
            decrypt_cloud_payload("only-one-line", KEY_HEX),
            Err(CloudConfigError::InvalidData(_))
        ));
    }

    #[test]
    fn flattens_like_file_configuration() {
        let flat = flatten_json(&json!({
            "S3": {"BucketName": "b", "AllowHttp": true},
            "PiiColumns": ["email", "phone"],
            "Retry": {"Attempts": 4},
            "Unused": null
        }));

        assert_eq!(flat["s3:bucketname"], "b");
        assert_eq!(flat["s3:allowhttp"], "true");
        assert_eq!(flat["piicolumns:1"], "phone");
        assert_eq!(flat["retry:attempts"], "4");
        assert!(!flat.contains_key("unused"));
    }
}
