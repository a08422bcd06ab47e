// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Anti-forgery `state` parameter for the Frontier authorization flow.
//!
//! Format (before URL-safe base64): `nonce_hex|timestamp_hex|signature_hex`,
//! where the signature is HMAC-SHA256 over `nonce_hex|timestamp_hex`.

use crate::error::AppError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;

/// Issues and verifies signed OAuth state tokens.
#[derive(Clone)]
pub struct OAuthStateSigner {
    key: Vec<u8>,
    max_age: Duration,
    rng: SystemRandom,
}

impl OAuthStateSigner {
    pub fn new(key: &[u8], max_age: Duration) -> Self {
        Self {
            key: key.to_vec(),
            max_age,
            rng: SystemRandom::new(),
        }
    }

    /// Create a fresh signed state token.
    pub fn issue(&self) -> Result<String, AppError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG unavailable")))?;

        let payload = format!("{}|{:x}", hex::encode(nonce), now_millis()?);
        let signature = hex::encode(self.sign(&payload)?);

        Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
    }

    /// Check signature and age of a state token we issued earlier.
    pub fn verify(&self, state: &str) -> bool {
        self.verify_inner(state).is_some()
    }

    fn verify_inner(&self, state: &str) -> Option<()> {
        let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
        let state_str = String::from_utf8(bytes).ok()?;

        let parts: Vec<&str> = state_str.splitn(3, '|').collect();
        if parts.len() != 3 {
            return None;
        }

        let payload = format!("{}|{}", parts[0], parts[1]);
        let signature = hex::decode(parts[2]).ok()?;

        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::error!("OAuth state signature mismatch! Potential tampering.");
            return None;
        }

        let issued_at = u128::from_str_radix(parts[1], 16).ok()?;
        let age = now_millis().ok()?.checked_sub(issued_at)?;
        if age > self.max_age.as_millis() {
            tracing::warn!(age_ms = age as u64, "OAuth state expired");
            return None;
        }

        Some(())
    }

    fn sign(&self, payload: &str) -> Result<Vec<u8>, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn now_millis() -> Result<u128, AppError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis())
}
