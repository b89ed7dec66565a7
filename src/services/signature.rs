//! HMAC-SHA256 signing and verification for webhook envelopes.
//!
//! The signed string is `"{timestamp}.{payload}"` where `timestamp` is unix
//! seconds (the `X-Webhook-Timestamp` header) and `payload` is the exact
//! JSON body sent. The signature header value is `sha256=<hex>`.
//!
//! Verification is what consumers run on their side; it lives here so the
//! contract has one implementation, exercised by the delivery worker for
//! signing and by the test suite end to end.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The only supported signature scheme.
pub const SIGNATURE_SCHEME: &str = "sha256";

/// Recommended timestamp tolerance for verifiers, in seconds.
///
/// Five minutes absorbs clock skew and retry latency while keeping the
/// replay window short.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

/// Why an inbound signature failed verification.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Header is not `<scheme>=<hex>`
    #[error("signature header is malformed")]
    MalformedHeader,

    /// Scheme is not `sha256`
    #[error("unsupported signature scheme")]
    UnsupportedScheme,

    /// Timestamp header is not an integer
    #[error("timestamp header is malformed")]
    MalformedTimestamp,

    /// Timestamp is outside the tolerance window (replay protection)
    #[error("timestamp outside tolerance window")]
    StaleTimestamp,

    /// HMAC did not match
    #[error("signature mismatch")]
    Mismatch,
}

/// The exact byte string that gets signed.
fn signed_payload(timestamp: i64, payload: &str) -> String {
    format!("{timestamp}.{payload}")
}

/// Sign `payload` for `timestamp`, returning the header value `sha256=<hex>`.
pub fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(signed_payload(timestamp, payload).as_bytes());

    format!(
        "{SIGNATURE_SCHEME}={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Verify a signature header against `payload`.
///
/// `timestamp_header` is the raw `X-Webhook-Timestamp` value; `now` is the
/// verifier's clock in unix seconds. Timestamps more than
/// `tolerance_seconds` away from `now` in either direction are rejected
/// before any HMAC work happens.
///
/// The comparison itself is constant-time (`Mac::verify_slice`).
pub fn verify(
    secret: &str,
    signature_header: &str,
    timestamp_header: &str,
    payload: &str,
    tolerance_seconds: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let (scheme, hex_sig) = signature_header
        .split_once('=')
        .ok_or(SignatureError::MalformedHeader)?;

    if scheme != SIGNATURE_SCHEME {
        return Err(SignatureError::UnsupportedScheme);
    }

    let timestamp: i64 = timestamp_header
        .parse()
        .map_err(|_| SignatureError::MalformedTimestamp)?;

    if (now - timestamp).abs() > tolerance_seconds {
        return Err(SignatureError::StaleTimestamp);
    }

    let claimed = hex::decode(hex_sig).map_err(|_| SignatureError::MalformedHeader)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(signed_payload(timestamp, payload).as_bytes());
    mac.verify_slice(&claimed)
        .map_err(|_| SignatureError::Mismatch)
}

/// Verify against several candidate secrets.
///
/// Rotation keeps the retired secret verifiable for a grace window, so a
/// consumer mid-rotation checks both. Returns the last error when no
/// candidate matches.
pub fn verify_any<'a, I>(
    secrets: I,
    signature_header: &str,
    timestamp_header: &str,
    payload: &str,
    tolerance_seconds: i64,
    now: i64,
) -> Result<(), SignatureError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut last = SignatureError::Mismatch;
    for secret in secrets {
        match verify(
            secret,
            signature_header,
            timestamp_header,
            payload,
            tolerance_seconds,
            now,
        ) {
            Ok(()) => return Ok(()),
            Err(err) => last = err,
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_f00dfeedface00112233445566778899aabbccddeeff00112233445566";
    const PAYLOAD: &str = r#"{"event_type":"claim.submitted","data":{"id":"c-1"}}"#;
    const NOW: i64 = 1_713_812_345;

    #[test]
    fn sign_then_verify_round_trip() {
        let header = sign(SECRET, NOW, PAYLOAD);
        assert!(header.starts_with("sha256="));
        assert_eq!(
            verify(
                SECRET,
                &header,
                &NOW.to_string(),
                PAYLOAD,
                DEFAULT_TOLERANCE_SECONDS,
                NOW
            ),
            Ok(())
        );
    }

    #[test]
    fn tampered_payload_rejected() {
        let header = sign(SECRET, NOW, PAYLOAD);
        let tampered = PAYLOAD.replace("c-1", "c-2");
        assert_eq!(
            verify(SECRET, &header, &NOW.to_string(), &tampered, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_rejected() {
        let header = sign(SECRET, NOW, PAYLOAD);
        assert_eq!(
            verify("whsec_other", &header, &NOW.to_string(), PAYLOAD, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn timestamps_outside_tolerance_rejected() {
        let header = sign(SECRET, NOW, PAYLOAD);

        // Too old
        assert_eq!(
            verify(SECRET, &header, &NOW.to_string(), PAYLOAD, 300, NOW + 301),
            Err(SignatureError::StaleTimestamp)
        );
        // Too far in the future
        assert_eq!(
            verify(SECRET, &header, &NOW.to_string(), PAYLOAD, 300, NOW - 301),
            Err(SignatureError::StaleTimestamp)
        );
        // Edge of the window still passes
        assert_eq!(
            verify(SECRET, &header, &NOW.to_string(), PAYLOAD, 300, NOW + 300),
            Ok(())
        );
    }

    #[test]
    fn malformed_headers_rejected() {
        let header = sign(SECRET, NOW, PAYLOAD);

        assert_eq!(
            verify(SECRET, "nonsense", &NOW.to_string(), PAYLOAD, 300, NOW),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verify(SECRET, "sha1=abcd", &NOW.to_string(), PAYLOAD, 300, NOW),
            Err(SignatureError::UnsupportedScheme)
        );
        assert_eq!(
            verify(SECRET, &header, "not-a-number", PAYLOAD, 300, NOW),
            Err(SignatureError::MalformedTimestamp)
        );
        assert_eq!(
            verify(SECRET, "sha256=zz", &NOW.to_string(), PAYLOAD, 300, NOW),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn rotation_grace_accepts_retired_secret() {
        let retired = "whsec_retired";
        let active = "whsec_active";
        let header = sign(retired, NOW, PAYLOAD);

        // Signed with the retired secret, verified against both candidates
        assert_eq!(
            verify_any(
                [active, retired],
                &header,
                &NOW.to_string(),
                PAYLOAD,
                300,
                NOW
            ),
            Ok(())
        );
        // Neither matches
        assert_eq!(
            verify_any(
                [active, "whsec_third"],
                &header,
                &NOW.to_string(),
                PAYLOAD,
                300,
                NOW
            ),
            Err(SignatureError::Mismatch)
        );
    }
}
