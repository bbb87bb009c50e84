// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request signature middleware for the command endpoint.
//!
//! The command gateway signs each raw request body with HMAC-SHA256 and
//! sends it as `X-Signature-256: sha256=<hex>`.

use crate::error::AppError;
use crate::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Hex HMAC-SHA256 of `body`, in header form.
pub fn sign_body(secret: &[u8], body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Constant-time check of a signature header value against `body`.
pub fn verify_signature(secret: &[u8], body: &[u8], header_value: &str) -> bool {
    let Some(expected) = sign_body(secret, body) else {
        return false;
    };
    expected.as_bytes().ct_eq(header_value.trim().as_bytes()).into()
}

/// Reject requests whose body signature does not match.
pub async fn require_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();

    let Some(signature) = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
    else {
        tracing::warn!(uri = %parts.uri, "Blocked command request without signature");
        return Err(AppError::Unauthorized);
    };

    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AppError::BadRequest(format!("unreadable body: {}", e)))?;

    if !verify_signature(&state.config.command_signing_key, &bytes, signature) {
        tracing::warn!(uri = %parts.uri, "Blocked command request with invalid signature");
        return Err(AppError::Unauthorized);
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}
