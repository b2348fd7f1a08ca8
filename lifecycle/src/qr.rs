//! Signed, time-bucketed QR payload codec.
//!
//! A QR payload is an opaque URL-safe base64 string binding a ticket ID to a
//! 30-second time bucket, signed with HMAC-SHA256. Screenshots of a QR code
//! go stale within a minute, and payloads cannot be forged or tampered with
//! without the signing key.
//!
//! Decoding never returns an error: an invalid code is an expected outcome at
//! a gate, reported as `valid = false`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::TicketId;

type HmacSha256 = Hmac<Sha256>;

/// How often a displayed QR payload rotates.
pub const REFRESH_INTERVAL_SECS: i64 = 30;

/// Wire format version, bumped on any incompatible payload change.
const PAYLOAD_VERSION: u8 = 1;

/// Claims carried inside a QR payload.
#[derive(Debug, Serialize, Deserialize)]
struct QrClaims {
    v: u8,
    ticket_id: TicketId,
    bucket: i64,
}

/// Outer envelope: claims plus their base64 HMAC-SHA256 signature.
#[derive(Debug, Serialize, Deserialize)]
struct QrEnvelope {
    claims: QrClaims,
    sig: String,
}

/// Outcome of decoding a scanned QR payload.
///
/// `ticket_id` is populated only when the signature verified, so a forged
/// payload never names a ticket. `valid` additionally requires the time
/// bucket to be current or immediately previous.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedQr {
    /// The ticket the payload was issued for, when authentic
    pub ticket_id: Option<TicketId>,
    /// Whether the payload is authentic and fresh
    pub valid: bool,
}

impl DecodedQr {
    const fn invalid() -> Self {
        Self { ticket_id: None, valid: false }
    }
}

/// HMAC-SHA256 codec for ticket QR payloads.
///
/// All gates and all ticket displays share one signing key; rotating the key
/// invalidates every outstanding payload at once.
#[derive(Clone)]
pub struct QrCodec {
    key: [u8; 32],
}

impl std::fmt::Debug for QrCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrCodec").finish_non_exhaustive()
    }
}

impl QrCodec {
    /// Derives the signing key from a configured secret string.
    #[must_use]
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        Self { key: digest.into() }
    }

    /// Generates a random signing key. Payloads signed with it do not
    /// survive a restart; intended for tests and demos.
    #[must_use]
    pub fn with_random_key() -> Self {
        Self { key: rand::random() }
    }

    /// Encodes a fresh payload for `ticket_id` at wall-clock time `now`.
    #[must_use]
    pub fn encode(&self, ticket_id: TicketId, now: DateTime<Utc>) -> String {
        let claims = QrClaims {
            v: PAYLOAD_VERSION,
            ticket_id,
            bucket: bucket_at(now),
        };
        let sig = self.sign(&claims);
        let envelope = QrEnvelope { claims, sig };
        match serde_json::to_vec(&envelope) {
            Ok(bytes) => URL_SAFE_NO_PAD.encode(bytes),
            // Serialization of these plain structs cannot fail
            Err(_) => String::new(),
        }
    }

    /// Decodes and verifies a scanned payload against wall-clock time `now`.
    ///
    /// A payload is valid when its signature verifies and its time bucket is
    /// the current one or the immediately previous one, tolerating a refresh
    /// racing the scan.
    #[must_use]
    pub fn decode(&self, code: &str, now: DateTime<Utc>) -> DecodedQr {
        let Ok(bytes) = URL_SAFE_NO_PAD.decode(code) else {
            return DecodedQr::invalid();
        };
        let Ok(envelope) = serde_json::from_slice::<QrEnvelope>(&bytes) else {
            return DecodedQr::invalid();
        };

        let expected = self.sign(&envelope.claims);
        if !constant_time_eq(expected.as_bytes(), envelope.sig.as_bytes()) {
            return DecodedQr::invalid();
        }
        if envelope.claims.v != PAYLOAD_VERSION {
            return DecodedQr::invalid();
        }

        let current = bucket_at(now);
        let fresh =
            envelope.claims.bucket == current || envelope.claims.bucket == current - 1;

        DecodedQr {
            ticket_id: Some(envelope.claims.ticket_id),
            valid: fresh,
        }
    }

    fn sign(&self, claims: &QrClaims) -> String {
        let Ok(payload) = serde_json::to_vec(claims) else {
            return String::new();
        };
        // Key is a fixed 32 bytes, always a valid HMAC key length
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            return String::new();
        };
        mac.update(&payload);
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

/// Bucket index for a wall-clock time. `div_euclid` keeps buckets monotonic
/// across the epoch for pre-1970 clocks.
fn bucket_at(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(REFRESH_INTERVAL_SECS)
}
