//! Shared-secret verification of inbound requests.
//!
//! Drone signs every plugin call with an HMAC-SHA256 HTTP signature: a
//! `Signature` header naming the covered headers and carrying the
//! base64-encoded MAC, a `Digest` header with the SHA-256 of the body, and
//! a `Date` header. A request that fails any of these checks never reaches
//! the resolver.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between the signed `Date` header and now.
const MAX_DATE_SKEW_SECS: i64 = 15 * 60;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("missing signed header: {0}")]
    MissingSignedHeader(String),

    #[error("signature does not match")]
    Mismatch,

    #[error("request body digest is missing or not covered by the signature")]
    MissingDigest,

    #[error("body digest does not match")]
    DigestMismatch,

    #[error("date header outside the acceptance window")]
    StaleDate,
}

/// Fields parsed out of a `Signature` header value.
#[derive(Debug, PartialEq, Eq)]
struct SignatureFields {
    key_id: String,
    algorithm: String,
    headers: Vec<String>,
    signature: String,
}

fn parse_signature_header(raw: &str) -> Result<SignatureFields, SignatureError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for field in raw.split(',') {
        let Some((name, value)) = field.trim().split_once('=') else {
            return Err(SignatureError::Malformed(format!(
                "field without '=': {field}"
            )));
        };
        let value = value.trim_matches('"').to_string();
        match name.trim() {
            "keyId" => key_id = Some(value),
            "algorithm" => algorithm = Some(value),
            "headers" => {
                headers = Some(
                    value
                        .split_whitespace()
                        .map(str::to_ascii_lowercase)
                        .collect(),
                )
            }
            "signature" => signature = Some(value),
            // Unknown fields are tolerated for forward compatibility.
            _ => {}
        }
    }

    Ok(SignatureFields {
        key_id: key_id.unwrap_or_default(),
        algorithm: algorithm
            .ok_or_else(|| SignatureError::Malformed("missing algorithm".to_string()))?,
        headers: headers.unwrap_or_else(|| vec!["date".to_string()]),
        signature: signature
            .ok_or_else(|| SignatureError::Malformed("missing signature".to_string()))?,
    })
}

/// Build the string the MAC covers: the signed headers in declared order,
/// each as `name: value`, joined by newlines.
fn signing_string(fields: &SignatureFields, headers: &HeaderMap) -> Result<String, SignatureError> {
    let mut lines = Vec::with_capacity(fields.headers.len());
    for name in &fields.headers {
        let value = headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SignatureError::MissingSignedHeader(name.clone()))?;
        lines.push(format!("{name}: {value}"));
    }
    Ok(lines.join("\n"))
}

fn verify_mac(secret: &[u8], message: &[u8], signature_b64: &str) -> Result<(), SignatureError> {
    let expected = BASE64
        .decode(signature_b64)
        .map_err(|_| SignatureError::Malformed("signature is not base64".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| SignatureError::Malformed("unusable shared secret".to_string()))?;
    mac.update(message);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

fn verify_digest(headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
    let Some(claimed) = headers.get("digest").and_then(|v| v.to_str().ok()) else {
        return Err(SignatureError::MissingDigest);
    };

    let computed = format!("SHA-256={}", BASE64.encode(Sha256::digest(body)));
    if claimed == computed {
        Ok(())
    } else {
        Err(SignatureError::DigestMismatch)
    }
}

fn verify_date(headers: &HeaderMap) -> Result<(), SignatureError> {
    let Some(raw) = headers.get("date").and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };
    let date = DateTime::parse_from_rfc2822(raw).map_err(|_| SignatureError::StaleDate)?;
    let skew = (Utc::now() - date.with_timezone(&Utc)).num_seconds().abs();
    if skew > MAX_DATE_SKEW_SECS {
        return Err(SignatureError::StaleDate);
    }
    Ok(())
}

/// Verify an inbound request against the shared secret.
pub fn verify_request(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let raw = headers
        .get("signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingSignature)?;

    let fields = parse_signature_header(raw)?;
    tracing::debug!("verifying request signature (keyId={})", fields.key_id);
    if !fields.algorithm.eq_ignore_ascii_case("hmac-sha256") {
        return Err(SignatureError::UnsupportedAlgorithm(fields.algorithm));
    }

    // The body is only as trustworthy as its digest, and the digest only
    // as trustworthy as the MAC covering it.
    if !fields.headers.iter().any(|name| name == "digest") {
        return Err(SignatureError::MissingDigest);
    }

    let message = signing_string(&fields, headers)?;
    verify_mac(secret.as_bytes(), message.as_bytes(), &fields.signature)?;
    verify_digest(headers, body)?;
    verify_date(headers)?;
    Ok(())
}

/// Sign a request the way Drone does. Used by tests and kept next to the
/// verifier so the two cannot drift apart.
#[cfg(test)]
pub fn sign_request(secret: &str, headers: &mut HeaderMap, body: &[u8]) {
    use axum::http::HeaderValue;

    let digest = format!("SHA-256={}", BASE64.encode(Sha256::digest(body)));
    headers.insert("digest", HeaderValue::from_str(&digest).unwrap());

    let date = Utc::now().to_rfc2822();
    headers.insert("date", HeaderValue::from_str(&date).unwrap());

    let fields = SignatureFields {
        key_id: "hmac-key".to_string(),
        algorithm: "hmac-sha256".to_string(),
        headers: vec!["date".to_string(), "digest".to_string()],
        signature: String::new(),
    };
    let message = signing_string(&fields, headers).unwrap();

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(message.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let header = format!(
        "keyId=\"{}\",algorithm=\"{}\",headers=\"date digest\",signature=\"{}\"",
        fields.key_id, fields.algorithm, signature
    );
    headers.insert("signature", HeaderValue::from_str(&header).unwrap());
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "correct-horse-battery-staple";

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        sign_request(SECRET, &mut headers, body);
        headers
    }

    #[test]
    fn test_round_trip_verifies() {
        let body = br#"{"name":"apiKey"}"#;
        let headers = signed_headers(body);
        assert!(verify_request(SECRET, &headers, body).is_ok());
    }

    #[test]
    fn test_missing_signature_header() {
        let headers = HeaderMap::new();
        assert!(matches!(
            verify_request(SECRET, &headers, b"{}"),
            Err(SignatureError::MissingSignature)
        ));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let body = b"{}";
        let headers = signed_headers(body);
        assert!(matches!(
            verify_request("other-secret", &headers, body),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_tampered_body_fails_digest_check() {
        let headers = signed_headers(b"{\"name\":\"apiKey\"}");
        assert!(matches!(
            verify_request(SECRET, &headers, b"{\"name\":\"other\"}"),
            Err(SignatureError::DigestMismatch)
        ));
    }

    #[test]
    fn test_tampered_date_fails_mac_check() {
        let body = b"{}";
        let mut headers = signed_headers(body);
        headers.insert(
            "date",
            HeaderValue::from_static("Mon, 02 Jan 2006 15:04:05 +0000"),
        );
        assert!(matches!(
            verify_request(SECRET, &headers, body),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_stale_date_is_rejected() {
        // Re-sign with an old date so the MAC itself is valid.
        let body = b"{}";
        let mut headers = HeaderMap::new();
        let digest = format!("SHA-256={}", BASE64.encode(Sha256::digest(body)));
        headers.insert("digest", HeaderValue::from_str(&digest).unwrap());
        let old_date = (Utc::now() - chrono::Duration::hours(2)).to_rfc2822();
        headers.insert("date", HeaderValue::from_str(&old_date).unwrap());

        let fields = SignatureFields {
            key_id: "hmac-key".to_string(),
            algorithm: "hmac-sha256".to_string(),
            headers: vec!["date".to_string(), "digest".to_string()],
            signature: String::new(),
        };
        let message = signing_string(&fields, &headers).unwrap();
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        headers.insert(
            "signature",
            HeaderValue::from_str(&format!(
                "keyId=\"hmac-key\",algorithm=\"hmac-sha256\",headers=\"date digest\",signature=\"{signature}\""
            ))
            .unwrap(),
        );

        assert!(matches!(
            verify_request(SECRET, &headers, body),
            Err(SignatureError::StaleDate)
        ));
    }

    /// Sign only the `date` header, leaving the body uncovered.
    fn sign_date_only(secret: &str, headers: &mut HeaderMap) {
        let date = Utc::now().to_rfc2822();
        headers.insert("date", HeaderValue::from_str(&date).unwrap());

        let fields = SignatureFields {
            key_id: "hmac-key".to_string(),
            algorithm: "hmac-sha256".to_string(),
            headers: vec!["date".to_string()],
            signature: String::new(),
        };
        let message = signing_string(&fields, headers).unwrap();
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        headers.insert(
            "signature",
            HeaderValue::from_str(&format!(
                "keyId=\"hmac-key\",algorithm=\"hmac-sha256\",headers=\"date\",signature=\"{signature}\""
            ))
            .unwrap(),
        );
    }

    #[test]
    fn test_signature_without_digest_is_rejected() {
        // A MAC over the date alone says nothing about the body; an
        // attacker could replay it with any payload.
        let mut headers = HeaderMap::new();
        sign_date_only(SECRET, &mut headers);

        assert!(matches!(
            verify_request(SECRET, &headers, br#"{"name":"anything"}"#),
            Err(SignatureError::MissingDigest)
        ));
    }

    #[test]
    fn test_uncovered_digest_header_is_rejected() {
        // Even a correct digest header does not count unless the MAC
        // covers it.
        let body = b"{}";
        let mut headers = HeaderMap::new();
        let digest = format!("SHA-256={}", BASE64.encode(Sha256::digest(body)));
        headers.insert("digest", HeaderValue::from_str(&digest).unwrap());
        sign_date_only(SECRET, &mut headers);

        assert!(matches!(
            verify_request(SECRET, &headers, body),
            Err(SignatureError::MissingDigest)
        ));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "signature",
            HeaderValue::from_static(
                "keyId=\"k\",algorithm=\"rsa-sha256\",headers=\"date\",signature=\"AAAA\"",
            ),
        );
        assert!(matches!(
            verify_request(SECRET, &headers, b"{}"),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_parse_signature_header_fields() {
        let fields = parse_signature_header(
            "keyId=\"hmac-key\",algorithm=\"hmac-sha256\",headers=\"Date Digest\",signature=\"c2ln\"",
        )
        .unwrap();
        assert_eq!(fields.key_id, "hmac-key");
        assert_eq!(fields.algorithm, "hmac-sha256");
        assert_eq!(fields.headers, vec!["date", "digest"]);
        assert_eq!(fields.signature, "c2ln");
    }

    #[test]
    fn test_parse_signature_header_defaults_to_date() {
        let fields =
            parse_signature_header("algorithm=\"hmac-sha256\",signature=\"c2ln\"").unwrap();
        assert_eq!(fields.headers, vec!["date"]);
    }

    #[test]
    fn test_signed_header_missing_from_request() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "signature",
            HeaderValue::from_static(
                "keyId=\"k\",algorithm=\"hmac-sha256\",headers=\"date digest\",signature=\"AAAA\"",
            ),
        );
        assert!(matches!(
            verify_request(SECRET, &headers, b"{}"),
            Err(SignatureError::MissingSignedHeader(name)) if name == "date"
        ));
    }
}
