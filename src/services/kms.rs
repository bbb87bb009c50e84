// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS service for encrypting/decrypting PSN tokens.
//!
//! Uses direct KMS encryption (not envelope encryption). Every ciphertext is
//! bound to its owner through additional authenticated data, so a token
//! copied onto another user's document fails to decrypt.

use crate::error::AppError;
use crate::models::UserTokens;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Full resource path to the KMS key
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,

    /// GCP KMS client; `None` in mock mode
    client: Option<std::sync::Arc<google_cloud_kms::client::Client>>,
}

impl KmsService {
    /// KMS Key Ring Name
    const KEY_RING_NAME: &str = "trophy-tracker";

    /// Create a new KMS service connected to GCP KMS.
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, AppError> {
        let key_path = format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project_id,
            location,
            Self::KEY_RING_NAME,
            key_name
        );

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        Ok(Self {
            key_path,
            client: Some(std::sync::Arc::new(client)),
        })
    }

    /// Create a mock KMS service (tests, in-memory debug runs).
    ///
    /// Ciphertext is base64 of the hex AAD and the plaintext, which is enough
    /// to exercise AAD mismatches without a KMS key. Only available in debug
    /// builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: "projects/mock/locations/mock/keyRings/mock/cryptoKeys/mock".to_string(),
            client: None,
        }
    }

    /// Encrypt plaintext data. Returns base64-encoded ciphertext.
    pub async fn encrypt(&self, plaintext: &str, aad: Option<&[u8]>) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::EncryptRequest;

        let Some(client) = self.client.as_ref() else {
            return Self::mock_encrypt(plaintext, aad);
        };

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            additional_authenticated_data: aad.map(<[u8]>::to_vec).unwrap_or_default(),
            ..Default::default()
        };

        let response = client
            .encrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        Ok(BASE64.encode(response.ciphertext))
    }

    /// Decrypt base64-encoded ciphertext.
    pub async fn decrypt(&self, ciphertext_b64: &str, aad: Option<&[u8]>) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::DecryptRequest;

        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Base64 ciphertext decode failed: {}", e))
        })?;

        let Some(client) = self.client.as_ref() else {
            return Self::mock_decrypt(ciphertext, aad);
        };

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext,
            additional_authenticated_data: aad.map(<[u8]>::to_vec).unwrap_or_default(),
            ..Default::default()
        };

        let response = client
            .decrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        String::from_utf8(response.plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }

    #[cfg(debug_assertions)]
    fn mock_encrypt(plaintext: &str, aad: Option<&[u8]>) -> Result<String, AppError> {
        let aad_hex = hex::encode(aad.unwrap_or_default());
        Ok(BASE64.encode(format!("{}:{}", aad_hex, plaintext)))
    }

    #[cfg(not(debug_assertions))]
    fn mock_encrypt(_plaintext: &str, _aad: Option<&[u8]>) -> Result<String, AppError> {
        Err(Self::not_initialized())
    }

    #[cfg(not(debug_assertions))]
    fn mock_decrypt(_ciphertext: Vec<u8>, _aad: Option<&[u8]>) -> Result<String, AppError> {
        Err(Self::not_initialized())
    }

    #[cfg(not(debug_assertions))]
    fn not_initialized() -> AppError {
        AppError::Internal(anyhow::anyhow!("KMS client not initialized"))
    }

    #[cfg(debug_assertions)]
    fn mock_decrypt(ciphertext: Vec<u8>, aad: Option<&[u8]>) -> Result<String, AppError> {
        let text = String::from_utf8(ciphertext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed (mock): {}", e)))?;

        let (aad_hex, plaintext) = text
            .split_once(':')
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Malformed mock ciphertext")))?;

        if aad_hex != hex::encode(aad.unwrap_or_default()) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "KMS decrypt failed (mock): AAD mismatch"
            )));
        }

        Ok(plaintext.to_string())
    }
}

/// AAD binding a ciphertext to its owner.
fn token_aad(user_id: &str) -> String {
    format!("user_id:{}", user_id)
}

/// Encrypt a credential bundle before storing it.
pub async fn seal_tokens(
    kms: &KmsService,
    user_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<UserTokens, AppError> {
    let aad = token_aad(user_id);

    let access_token_encrypted = kms.encrypt(access_token, Some(aad.as_bytes())).await?;
    let refresh_token_encrypted = match refresh_token {
        Some(token) => Some(kms.encrypt(token, Some(aad.as_bytes())).await?),
        None => None,
    };

    Ok(UserTokens {
        access_token_encrypted,
        refresh_token_encrypted,
        expires_at,
    })
}

/// Decrypt the access token of a stored bundle.
pub async fn open_access_token(
    kms: &KmsService,
    user_id: &str,
    tokens: &UserTokens,
) -> Result<String, AppError> {
    let aad = token_aad(user_id);
    kms.decrypt(&tokens.access_token_encrypted, Some(aad.as_bytes()))
        .await
}

/// Decrypt the refresh token of a stored bundle, if it has one.
pub async fn open_refresh_token(
    kms: &KmsService,
    user_id: &str,
    tokens: &UserTokens,
) -> Result<Option<String>, AppError> {
    let Some(encrypted) = tokens.refresh_token_encrypted.as_deref() else {
        return Ok(None);
    };
    let aad = token_aad(user_id);
    kms.decrypt(encrypted, Some(aad.as_bytes())).await.map(Some)
}
