//! Compact HS256 token codec.
//!
//! Wire format: `base64url(header).base64url(claims).base64url(signature)`,
//! unpadded, where the signature is HMAC-SHA256 over `header.claims`.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::map_authorities;
use crate::principal::Principal;

/// The only MAC algorithm this codec signs with or accepts.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Payload claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal name).
    pub sub: String,

    /// Comma-joined role names. Absent means "no roles".
    #[serde(default)]
    pub roles: String,

    /// Issued-at, epoch seconds.
    pub iat: i64,

    /// Expiry, epoch seconds.
    pub exp: i64,
}

/// Why a presented token was rejected.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("token is missing")]
    Missing,

    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    SignatureMismatch,

    #[error("token declares an unsupported algorithm")]
    UnsupportedAlgorithm,

    #[error("token has expired")]
    Expired,
}

impl ValidationError {
    /// Stable tag used in logs and diagnostic responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::Missing => "missing",
            ValidationError::Malformed => "malformed",
            ValidationError::SignatureMismatch => "signature_mismatch",
            ValidationError::UnsupportedAlgorithm => "unsupported_algorithm",
            ValidationError::Expired => "expired",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ValidationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => ValidationError::SignatureMismatch,
            ErrorKind::InvalidAlgorithm => ValidationError::UnsupportedAlgorithm,
            _ => ValidationError::Malformed,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("token ttl must be at least one millisecond and fit the claim range")]
    InvalidTtl,

    #[error("failed to encode token: {0}")]
    Encode(String),
}

/// Result of a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub principal: Principal,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Everything a verified token tells us, relative to the instant it was checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub principal: Principal,
    pub roles: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remaining_ms: u64,
}

/// Issues and verifies tokens with a single process-wide symmetric key.
///
/// Immutable after construction; share it behind an `Arc`. Decoding is a pure
/// function of `(token, key, now)` and safe to call from any number of tasks.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &ALGORITHM)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, TokenError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        // Expiry is checked against the millisecond clock in `inspect_at`.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    pub fn issue(&self, principal: &Principal, ttl: Duration) -> Result<IssuedToken, TokenError> {
        self.issue_at(principal, ttl, Utc::now())
    }

    /// Issue a token as of `now`.
    ///
    /// `iat` is `now` truncated to whole seconds and `exp` is `iat` plus the
    /// ttl rounded up to whole seconds, so `exp > iat` for every non-zero ttl.
    pub fn issue_at(
        &self,
        principal: &Principal,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl_ms = ttl.as_millis();
        if ttl_ms == 0 {
            return Err(TokenError::InvalidTtl);
        }
        let ttl_secs = i64::try_from(ttl_ms.div_ceil(1000)).map_err(|_| TokenError::InvalidTtl)?;

        let iat = now.timestamp();
        let exp = iat.checked_add(ttl_secs).ok_or(TokenError::InvalidTtl)?;
        let issued_at = timestamp(iat).ok_or(TokenError::InvalidTtl)?;
        let expires_at = timestamp(exp).ok_or(TokenError::InvalidTtl)?;

        let claims = Claims {
            sub: principal.subject().to_string(),
            roles: principal.roles(),
            iat,
            exp,
        };
        let token = self.encode(&claims)?;

        tracing::debug!(subject = %claims.sub, exp, "issued token");

        Ok(IssuedToken {
            token,
            principal: principal.clone(),
            issued_at,
            expires_at,
        })
    }

    /// Sign arbitrary claims. `issue_at` is the normal entry point; this exists
    /// for callers that already hold a claim set.
    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Principal, ValidationError> {
        self.decode_at(token, Utc::now())
    }

    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, ValidationError> {
        self.inspect_at(token, now).map(|info| info.principal)
    }

    pub fn inspect(&self, token: &str) -> Result<TokenInfo, ValidationError> {
        self.inspect_at(token, Utc::now())
    }

    /// Verify `token` as of `now` and return its decoded contents.
    ///
    /// Check order: presence, structure, algorithm, signature, claims, expiry.
    /// Claims are never trusted before the signature has been verified.
    pub fn inspect_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenInfo, ValidationError> {
        if token.trim().is_empty() {
            return Err(ValidationError::Missing);
        }
        if token.split('.').count() != 3 {
            return Err(ValidationError::Malformed);
        }

        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            if matches!(e.kind(), ErrorKind::Json(_)) {
                classify_unknown_header(token)
            } else {
                ValidationError::from(e)
            }
        })?;
        if header.alg != ALGORITHM {
            return Err(ValidationError::UnsupportedAlgorithm);
        }

        let claims =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;
        if claims.sub.is_empty() || claims.exp <= claims.iat {
            return Err(ValidationError::Malformed);
        }
        let issued_at = timestamp(claims.iat).ok_or(ValidationError::Malformed)?;
        let expires_at = timestamp(claims.exp).ok_or(ValidationError::Malformed)?;

        if now > expires_at {
            return Err(ValidationError::Expired);
        }

        let remaining_ms = u64::try_from((expires_at - now).num_milliseconds()).unwrap_or(0);
        let principal = Principal::new(claims.sub, map_authorities(&claims.roles));

        Ok(TokenInfo {
            principal,
            roles: claims.roles,
            issued_at,
            expires_at,
            remaining_ms,
        })
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// A header `jsonwebtoken` cannot parse is still unsupported, not malformed,
/// when it names an algorithm outside its enum (`"none"`).
fn classify_unknown_header(token: &str) -> ValidationError {
    let named_alg = token
        .split('.')
        .next()
        .and_then(|segment| URL_SAFE_NO_PAD.decode(segment).ok())
        .and_then(|bytes| serde_json::from_slice::<RawHeader>(&bytes).ok());

    match named_alg {
        Some(header) if header.alg != "HS256" => ValidationError::UnsupportedAlgorithm,
        _ => ValidationError::Malformed,
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, CapabilitySet};
    use chrono::Duration as ChronoDuration;

    const SECRET: &str = "test-secret-key-for-tokens";
    const DAY_MS: u64 = 86_400_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET).unwrap()
    }

    fn admin() -> Principal {
        Principal::new("admin", map_authorities("USER,ADMIN"))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn forge(alg: Algorithm, payload: &str, key: &str) -> String {
        let claims: serde_json::Value = serde_json::from_str(payload).unwrap();
        let key = EncodingKey::from_secret(key.as_bytes());
        jsonwebtoken::encode(&Header::new(alg), &claims, &key).unwrap()
    }

    fn flip_signature_bit(token: &str, byte: usize, bit: u8) -> String {
        let (signing_input, sig_b64) = token.rsplit_once('.').unwrap();
        let mut sig = URL_SAFE_NO_PAD.decode(sig_b64).unwrap();
        sig[byte] ^= 1 << bit;
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(sig))
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(TokenCodec::new("").unwrap_err(), TokenError::EmptySecret);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let err = codec().issue(&admin(), Duration::ZERO).unwrap_err();
        assert_eq!(err, TokenError::InvalidTtl);
    }

    #[test]
    fn issue_then_decode_admin_scenario() {
        let codec = codec();
        let now = at(1_700_000_000);
        let issued = codec
            .issue_at(&admin(), Duration::from_millis(DAY_MS), now)
            .unwrap();

        assert_eq!(issued.token.split('.').count(), 3);
        assert_eq!(issued.issued_at, now);
        assert_eq!(issued.expires_at, now + ChronoDuration::milliseconds(DAY_MS as i64));

        let principal = codec.decode_at(&issued.token, now).unwrap();
        assert_eq!(principal.subject(), "admin");
        let expected: CapabilitySet = [Capability::new("USER"), Capability::new("ADMIN")].into();
        assert_eq!(principal.capabilities(), &expected);

        let info = codec.inspect_at(&issued.token, now).unwrap();
        assert_eq!(info.remaining_ms, DAY_MS);
        assert_eq!(info.roles, "ADMIN,USER");

        let after = issued.expires_at + ChronoDuration::milliseconds(1);
        assert_eq!(
            codec.decode_at(&issued.token, after).unwrap_err(),
            ValidationError::Expired
        );
    }

    #[test]
    fn expiry_instant_itself_is_valid() {
        let codec = codec();
        let issued = codec
            .issue_at(&admin(), Duration::from_secs(60), at(1_000))
            .unwrap();
        let info = codec.inspect_at(&issued.token, issued.expires_at).unwrap();
        assert_eq!(info.remaining_ms, 0);
    }

    #[test]
    fn issuance_is_deterministic_for_same_clock_and_key() {
        let now = at(1_700_000_000);
        let a = codec().issue_at(&admin(), Duration::from_secs(5), now).unwrap();
        let b = codec().issue_at(&admin(), Duration::from_secs(5), now).unwrap();
        assert_eq!(a.token, b.token);
    }

    #[test]
    fn sub_second_ttl_still_yields_valid_window() {
        let codec = codec();
        let now = Utc.timestamp_millis_opt(1_700_000_000_999).unwrap();
        let issued = codec.issue_at(&admin(), Duration::from_millis(1), now).unwrap();
        assert!(issued.expires_at > issued.issued_at);
        assert!(codec.decode_at(&issued.token, now).is_ok());
    }

    #[test]
    fn missing_token() {
        assert_eq!(codec().decode("").unwrap_err(), ValidationError::Missing);
        assert_eq!(codec().decode("   ").unwrap_err(), ValidationError::Missing);
    }

    #[test]
    fn malformed_tokens() {
        let codec = codec();
        for token in ["invalid", "a.b", "too.many.parts.here", "!!!.@@@.###", "not.a.token"] {
            assert_eq!(
                codec.decode(token).unwrap_err(),
                ValidationError::Malformed,
                "token {token:?}"
            );
        }
    }

    #[test]
    fn wrong_secret_is_signature_mismatch() {
        let issued = codec().issue(&admin(), Duration::from_secs(60)).unwrap();
        let other = TokenCodec::new("different-secret").unwrap();
        assert_eq!(
            other.decode(&issued.token).unwrap_err(),
            ValidationError::SignatureMismatch
        );
    }

    #[test]
    fn tampered_payload_is_signature_mismatch() {
        let codec = codec();
        let user = Principal::new("user", map_authorities("USER"));
        let issued = codec.issue(&user, Duration::from_secs(60)).unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();

        let mut claims: Claims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims.roles = "USER,ADMIN".to_string();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(codec.decode(&forged).unwrap_err(), ValidationError::SignatureMismatch);
    }

    #[test]
    fn foreign_algorithm_is_unsupported() {
        let now = Utc::now().timestamp();
        let payload = format!(
            r#"{{"sub":"admin","roles":"ADMIN","iat":{now},"exp":{}}}"#,
            now + 60
        );
        let hs512 = forge(Algorithm::HS512, &payload, SECRET);
        let none = format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(&payload)
        );

        assert_eq!(codec().decode(&hs512).unwrap_err(), ValidationError::UnsupportedAlgorithm);
        assert_eq!(codec().decode(&none).unwrap_err(), ValidationError::UnsupportedAlgorithm);
    }

    #[test]
    fn undecodable_signature_is_mismatch() {
        let issued = codec().issue(&admin(), Duration::from_secs(60)).unwrap();
        let (signing_input, _) = issued.token.rsplit_once('.').unwrap();
        let token = format!("{signing_input}.***");
        assert_eq!(codec().decode(&token).unwrap_err(), ValidationError::SignatureMismatch);
    }

    #[test]
    fn header_declares_hs256_jwt() {
        let issued = codec().issue(&admin(), Duration::from_secs(60)).unwrap();
        let header = jsonwebtoken::decode_header(&issued.token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
        assert_eq!(header.typ.as_deref(), Some("JWT"));
    }

    #[test]
    fn inverted_time_window_is_malformed() {
        let payload = r#"{"sub":"admin","roles":"ADMIN","iat":2000,"exp":1000}"#;
        let token = forge(Algorithm::HS256, payload, SECRET);
        assert_eq!(codec().decode_at(&token, at(500)).unwrap_err(), ValidationError::Malformed);
    }

    #[test]
    fn missing_roles_claim_maps_to_base_capability() {
        let payload = r#"{"sub":"svc","iat":1000,"exp":2000}"#;
        let token = forge(Algorithm::HS256, payload, SECRET);
        let principal = codec().decode_at(&token, at(1500)).unwrap();
        assert_eq!(principal.capabilities(), &CapabilitySet::from([Capability::base()]));
    }

    #[test]
    fn tokens_interoperate_with_jsonwebtoken() {
        let codec = codec();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "admin".to_string(),
            roles: "USER,ADMIN".to_string(),
            iat: now,
            exp: now + 600,
        };

        let external = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(codec.decode(&external).unwrap(), admin());

        let ours = codec.issue(&admin(), Duration::from_secs(600)).unwrap();
        let decoded = jsonwebtoken::decode::<Claims>(
            &ours.token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "admin");
        assert_eq!(decoded.claims.roles, "ADMIN,USER");
    }

    #[test]
    fn concurrent_decode_yields_identical_principals() {
        let codec = codec();
        let issued = codec.issue(&admin(), Duration::from_secs(600)).unwrap();
        let now = Utc::now();

        let results: Vec<Principal> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| codec.decode_at(&issued.token, now).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|p| p == &results[0]));
        assert_eq!(results[0], admin());
    }

    #[test]
    fn every_signature_bit_flip_is_rejected() {
        let codec = codec();
        let now = at(1_700_000_000);
        let issued = codec.issue_at(&admin(), Duration::from_secs(60), now).unwrap();

        for byte in 0..32 {
            for bit in 0..8 {
                let tampered = flip_signature_bit(&issued.token, byte, bit);
                assert_eq!(
                    codec.decode_at(&tampered, now).unwrap_err(),
                    ValidationError::SignatureMismatch
                );
            }
        }
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let rendered = format!("{:?}", codec());
        assert!(!rendered.contains(SECRET));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn principal_strategy() -> impl Strategy<Value = Principal> {
            (
                "[a-z][a-z0-9_]{0,15}",
                proptest::collection::vec("[A-Za-z]{1,8}", 0..4),
            )
                .prop_map(|(subject, roles)| {
                    Principal::new(subject, map_authorities(&roles.join(",")))
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: decode(issue(p, ttl)) at the issuance instant returns p.
            #[test]
            fn round_trip_at_issuance(
                principal in principal_strategy(),
                ttl_ms in 1u64..=10 * DAY_MS,
                now_ms in 0i64..4_000_000_000_000,
            ) {
                let codec = codec();
                let now = Utc.timestamp_millis_opt(now_ms).unwrap();
                let issued = codec
                    .issue_at(&principal, Duration::from_millis(ttl_ms), now)
                    .unwrap();
                prop_assert!(issued.expires_at > issued.issued_at);
                let decoded = codec.decode_at(&issued.token, issued.issued_at).unwrap();
                prop_assert_eq!(decoded, principal);
            }

            /// Property: valid up to and including expiry, expired strictly after.
            #[test]
            fn expiry_boundary(
                ttl_secs in 1u64..100_000,
                offset_ms in 0i64..200_000_000,
            ) {
                let codec = codec();
                let issued = codec
                    .issue_at(&admin(), Duration::from_secs(ttl_secs), at(1_700_000_000))
                    .unwrap();
                let check_at = issued.issued_at + ChronoDuration::milliseconds(offset_ms);
                let result = codec.decode_at(&issued.token, check_at);

                if check_at > issued.expires_at {
                    prop_assert_eq!(result.unwrap_err(), ValidationError::Expired);
                } else {
                    prop_assert!(result.is_ok());
                }
            }

            /// Property: any single-bit flip in the signature is a mismatch.
            #[test]
            fn signature_bit_flip(
                principal in principal_strategy(),
                byte in 0usize..32,
                bit in 0u8..8,
            ) {
                let codec = codec();
                let now = at(1_700_000_000);
                let issued = codec.issue_at(&principal, Duration::from_secs(60), now).unwrap();
                let tampered = flip_signature_bit(&issued.token, byte, bit);
                prop_assert_eq!(
                    codec.decode_at(&tampered, now).unwrap_err(),
                    ValidationError::SignatureMismatch
                );
            }

            /// Property: arbitrary input never panics and never authenticates.
            #[test]
            fn garbage_never_authenticates(token in "[A-Za-z0-9_.-]{0,200}") {
                prop_assert!(codec().decode(&token).is_err());
            }
        }
    }
}
