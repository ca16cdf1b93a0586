//! Platform-legal identifier minting
//!
//! Bundle identifiers and their namespaces must satisfy the Kubernetes name
//! grammar (`^[a-z0-9]([-a-z0-9]*[a-z0-9])?$`, under 53 characters). We mint
//! them by signing a short-lived token keyed on the caller's seed plus the
//! current instant, then filtering the result down to lowercase
//! alphanumerics. Uniqueness comes from the signature's entropy, not from
//! cryptographic strength; callers mint once per logical entity and never
//! re-derive.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Upper bound on minted identifier length, conservatively under the
/// platform's 53-character limit
pub const MAX_LEN: usize = 50;

#[derive(Serialize)]
struct MintClaims {
    iat: u64,
}

/// Mint a platform-legal, collision-resistant identifier from `seed`.
///
/// Never fails: if the signing step errors, the identifier falls back to a
/// digest of the same inputs. Two calls with different seeds at different
/// instants do not collide with overwhelming probability.
pub fn mint(seed: &str) -> String {
    let nanos = now_nanos();
    let claims = MintClaims {
        iat: (nanos / 1_000_000_000) as u64,
    };
    let key = format!("{seed}-{nanos}");

    let raw = match encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(key.as_bytes()),
    ) {
        Ok(token) => token,
        Err(e) => {
            // Identifiers are not security-sensitive; a digest of the same
            // inputs keeps the caller moving.
            warn!(error = %e, "token signing failed, minting from digest instead");
            let mut hasher = Sha256::new();
            hasher.update(seed.as_bytes());
            hasher.update(nanos.to_be_bytes());
            format!("{:x}", hasher.finalize())
        }
    };

    sanitize(&raw)
}

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Filter to lowercase alphanumerics and keep the trailing [`MAX_LEN`]
/// characters - the signature end of the token, where the entropy lives.
fn sanitize(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter_map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                Some(c)
            } else if c.is_ascii_uppercase() {
                Some(c.to_ascii_lowercase())
            } else {
                None
            }
        })
        .collect();

    let start = filtered.len().saturating_sub(MAX_LEN);
    filtered[start..].to_string()
}
