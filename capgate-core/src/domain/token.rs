// capgate-core/src/domain/token.rs
// ============================================================================
// Module: Token Service (component A)
// Description: Capability token issuance, verification, revocation, cleanup.
// Purpose: Implement spec §4.1 over an injected store and replay protector.
// Dependencies: ed25519-dalek, sha2, serde_json, time, crate::domain::{ids,
//               errors, replay, audit}
// ============================================================================

//! ## Overview
//! A [`CapabilityToken`] is a short-lived, Ed25519-signed statement that a
//! subject may perform a set of dotted capabilities within a tenant. The
//! plaintext token is never persisted — only its SHA-256 hash — matching the
//! fail-closed bearer-token discipline already present in this crate's
//! authorization primitives.

use std::fmt;

use ed25519_dalek::Signature;
use ed25519_dalek::Signer as Ed25519Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::Verifier;
use ed25519_dalek::VerifyingKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::core::identifiers::TenantId;
use crate::domain::audit::AuditOperation;
use crate::domain::audit::AuditSink;
use crate::domain::audit::AuditStatus;
use crate::domain::errors::TokenServiceError;
use crate::domain::ids::AuditId;
use crate::domain::ids::Jti;
use crate::domain::ids::TokenId;
use crate::domain::replay::ReplayContext;
use crate::domain::replay::ReplayProtector;

/// Minimum allowed token TTL in seconds (spec §3: `TTL in [1s, 300s]`).
pub const MIN_TTL_SECONDS: i64 = 1;
/// Maximum allowed token TTL in seconds.
pub const MAX_TTL_SECONDS: i64 = 300;

/// Signed payload carried inside a capability token (spec §6 token format).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Subject the token was issued to.
    pub sub: String,
    /// Capabilities granted by this token, in issuance order.
    pub cap: Vec<String>,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    /// JWT id; identical to the issuing `token_id`.
    pub jti: String,
    /// Tenant the token is scoped to.
    pub tenant: String,
}

/// Persisted row for a capability token (spec §3 `CapabilityToken`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    /// Primary identifier; equals the payload's `jti`.
    pub token_id: TokenId,
    /// JWT id, duplicated for index convenience.
    pub jti: Jti,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Subject string, at most 255 bytes.
    pub subject: String,
    /// Ordered, non-empty capability list.
    pub capabilities: Vec<String>,
    /// Issuance time, unix seconds.
    pub issued_at: i64,
    /// Expiry time, unix seconds; always greater than `issued_at`.
    pub expires_at: i64,
    /// Revocation time, if revoked.
    pub revoked_at: Option<i64>,
    /// Whether the token is currently usable.
    pub active: bool,
    /// Count of successful `verify()` calls against this row.
    pub usage_count: u64,
    /// SHA-256 hex digest of the serialized token string. The plaintext
    /// token is never stored.
    pub token_hash: String,
}

impl CapabilityToken {
    /// Returns whether the token is valid to use right now: active, not
    /// revoked, and not expired.
    #[must_use]
    pub fn is_valid(&self, now: i64) -> bool {
        self.active && self.revoked_at.is_none() && now < self.expires_at
    }
}

/// Outcome of [`TokenService::issue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    /// The compact, signed token string handed to the caller.
    pub token: String,
    /// The token's identifier.
    pub token_id: TokenId,
    /// Expiry, unix seconds.
    pub expires_at: i64,
    /// Issuance time, unix seconds.
    pub issued_at: i64,
}

/// Outcome of [`TokenService::verify`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    /// Whether the token was accepted.
    pub valid: bool,
    /// The decoded payload, present iff `valid`.
    pub payload: Option<TokenPayload>,
    /// A human-readable rejection reason, present iff `!valid`.
    pub error: Option<String>,
}

/// Outcome of [`TokenService::refresh`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshedToken {
    /// The newly issued token string.
    pub token: String,
    /// The new token's identifier.
    pub token_id: TokenId,
    /// The identifier of the token that was revoked to produce this one.
    pub old_token_id: TokenId,
    /// Subject carried over from the original token.
    pub subject: String,
    /// Capabilities carried over from the original token.
    pub capabilities: Vec<String>,
    /// Expiry of the new token, unix seconds.
    pub expires_at: i64,
}

/// Statistics returned by [`TokenService::cleanup`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupStats {
    /// Tokens examined.
    pub tokens_processed: u64,
    /// Tokens actually deleted (0 when `dry_run`).
    pub tokens_cleaned: u64,
    /// Batches that raised an error.
    pub errors_encountered: u64,
    /// Wall-clock duration of the cleanup run.
    pub duration_seconds: f64,
    /// Whether this run only counted candidates.
    pub dry_run: bool,
}

/// Storage contract required by [`TokenService`]. Implementations must be
/// transactional per call; see spec §5.
pub trait TokenStore {
    /// Persists a newly issued token row.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn insert(&self, token: &CapabilityToken) -> Result<(), String>;

    /// Loads a token row by id.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn find(&self, token_id: &TokenId) -> Result<Option<CapabilityToken>, String>;

    /// Atomically increments `usage_count` on the given row.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn increment_usage(&self, token_id: &TokenId) -> Result<(), String>;

    /// Marks a token row revoked. Returns `false` if it was already revoked.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn revoke(&self, token_id: &TokenId, revoked_at: i64) -> Result<bool, String>;

    /// Deletes tokens (and cascades) whose `expires_at < cutoff`, in batches
    /// of at most `batch_size`. Returns the number of rows that matched.
    ///
    /// # Errors
    /// Returns an error string on store failure.
    fn delete_expired(&self, cutoff: i64, batch_size: u32, dry_run: bool) -> Result<u64, String>;
}

/// Signs and verifies the Ed25519 JWT-shape payloads used by capability
/// tokens. Header+payload are canonical JSON joined by `.`; the signature is
/// base64url-encoded without padding, matching spec §6's token format.
pub struct TokenSigner {
    signing_key: SigningKey,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

const HEADER_JSON: &str = r#"{"alg":"EdDSA","typ":"CAPTOK"}"#;

impl TokenSigner {
    /// Builds a signer from a 32-byte Ed25519 seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Returns the matching public verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    fn encode_segment(bytes: &[u8]) -> String {
        base64_url_encode(bytes)
    }

    /// Signs a payload, producing the compact `header.payload.signature`
    /// token string.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialized to JSON.
    pub fn sign(&self, payload: &TokenPayload) -> Result<String, TokenServiceError> {
        let payload_json =
            serde_json::to_vec(payload).map_err(|err| TokenServiceError::Internal(err.to_string()))?;
        let header = Self::encode_segment(HEADER_JSON.as_bytes());
        let body = Self::encode_segment(&payload_json);
        let signing_input = format!("{header}.{body}");
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        let sig = Self::encode_segment(&signature.to_bytes());
        Ok(format!("{signing_input}.{sig}"))
    }

    /// Verifies a token string's signature and decodes its payload, without
    /// checking expiry, tenant, or store state (see [`TokenService::verify`]
    /// for the full verification pipeline).
    ///
    /// # Errors
    /// Returns [`TokenServiceError::BadSignature`] on any structural or
    /// cryptographic failure.
    pub fn verify_signature(&self, token: &str) -> Result<TokenPayload, TokenServiceError> {
        let mut parts = token.split('.');
        let (Some(header), Some(body), Some(sig)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TokenServiceError::BadSignature);
        };
        if parts.next().is_some() {
            return Err(TokenServiceError::BadSignature);
        }
        let header_bytes = base64_url_decode(header).map_err(|_| TokenServiceError::BadSignature)?;
        if header_bytes != HEADER_JSON.as_bytes() {
            return Err(TokenServiceError::BadSignature);
        }
        let body_bytes = base64_url_decode(body).map_err(|_| TokenServiceError::BadSignature)?;
        let sig_bytes = base64_url_decode(sig).map_err(|_| TokenServiceError::BadSignature)?;
        let sig_array: [u8; 64] = sig_bytes.try_into().map_err(|_| TokenServiceError::BadSignature)?;
        let signature = Signature::from_bytes(&sig_array);
        let signing_input = format!("{header}.{body}");
        self.signing_key
            .verifying_key()
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenServiceError::BadSignature)?;
        serde_json::from_slice(&body_bytes).map_err(|_| TokenServiceError::BadSignature)
    }
}

/// SHA-256 hex digest of a token string, used as the only persisted form of
/// the token (spec §3 invariant: "the plaintext token is never persisted").
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Composes signing, storage, replay protection, and audit into the full
/// token lifecycle of spec §4.1.
pub struct TokenService<'a> {
    signer: &'a TokenSigner,
    store: &'a dyn TokenStore,
    replay: &'a dyn ReplayProtector,
    audit: &'a dyn AuditSink,
}

impl<'a> TokenService<'a> {
    /// Builds a token service over the given collaborators.
    #[must_use]
    pub fn new(
        signer: &'a TokenSigner,
        store: &'a dyn TokenStore,
        replay: &'a dyn ReplayProtector,
        audit: &'a dyn AuditSink,
    ) -> Self {
        Self {
            signer,
            store,
            replay,
            audit,
        }
    }

    /// Issues a new capability token (spec §4.1 `issue`).
    ///
    /// # Errors
    /// Returns [`TokenServiceError::InvalidRequest`] for empty subjects,
    /// empty capability lists, or out-of-range TTLs. Store failures are
    /// surfaced after a best-effort failure audit entry is written.
    pub fn issue(
        &self,
        subject: &str,
        capabilities: Vec<String>,
        ttl_seconds: i64,
        tenant_id: &TenantId,
        now: i64,
        correlation_id: &str,
    ) -> Result<IssuedToken, TokenServiceError> {
        if subject.is_empty() || subject.len() > 255 {
            return Err(TokenServiceError::InvalidRequest(
                "subject must be 1-255 bytes".to_string(),
            ));
        }
        if capabilities.is_empty() {
            return Err(TokenServiceError::InvalidRequest(
                "at least one capability is required".to_string(),
            ));
        }
        if !(MIN_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&ttl_seconds) {
            return Err(TokenServiceError::InvalidRequest(format!(
                "ttl_seconds must be in [{MIN_TTL_SECONDS}, {MAX_TTL_SECONDS}]"
            )));
        }

        let token_id = TokenId::new(uuid::Uuid::new_v4().to_string());
        let expires_at = now + ttl_seconds;
        let payload = TokenPayload {
            sub: subject.to_string(),
            cap: capabilities.clone(),
            iat: now,
            exp: expires_at,
            jti: token_id.as_str().to_string(),
            tenant: tenant_id.as_str().to_string(),
        };

        let result = self.signer.sign(&payload).and_then(|token| {
            let row = CapabilityToken {
                token_id: token_id.clone(),
                jti: token_id.clone().into(),
                tenant_id: tenant_id.clone(),
                subject: subject.to_string(),
                capabilities,
                issued_at: now,
                expires_at,
                revoked_at: None,
                active: true,
                usage_count: 0,
                token_hash: hash_token(&token),
            };
            self.store
                .insert(&row)
                .map_err(TokenServiceError::Store)?;
            Ok((token, row))
        });

        match result {
            Ok((token, row)) => {
                self.audit.write(
                    AuditId::new(uuid::Uuid::new_v4().to_string()),
                    tenant_id.clone(),
                    Some(row.token_id.clone()),
                    AuditOperation::Issue,
                    AuditStatus::Success,
                    None,
                    correlation_id,
                    now,
                );
                Ok(IssuedToken {
                    token,
                    token_id: row.token_id,
                    expires_at: row.expires_at,
                    issued_at: row.issued_at,
                })
            }
            Err(err) => {
                self.audit.write(
                    AuditId::new(uuid::Uuid::new_v4().to_string()),
                    tenant_id.clone(),
                    Some(token_id),
                    AuditOperation::Issue,
                    AuditStatus::Failure,
                    Some(err.to_string()),
                    correlation_id,
                    now,
                );
                Err(err)
            }
        }
    }

    /// Verifies a presented token (spec §4.1 `verify`).
    ///
    /// Order of checks: signature, expiry, tenant match, store state,
    /// replay. A replay is recorded and audited at `WARNING` but does not
    /// flip `valid` to `false` — see spec §4.2.
    pub fn verify(&self, token: &str, tenant_id: &TenantId, now: i64, correlation_id: &str) -> VerifyOutcome {
        let payload = match self.signer.verify_signature(token) {
            Ok(payload) => payload,
            Err(err) => return self.reject(tenant_id, None, now, correlation_id, err.to_string()),
        };
        if payload.exp <= now {
            return self.reject(tenant_id, None, now, correlation_id, "token expired".to_string());
        }
        if payload.tenant != tenant_id.as_str() {
            return self.reject(
                tenant_id,
                None,
                now,
                correlation_id,
                "tenant mismatch".to_string(),
            );
        }
        let token_id = TokenId::new(payload.jti.clone());
        let row = match self.store.find(&token_id) {
            Ok(Some(row)) => row,
            Ok(None) => {
                return self.reject(tenant_id, Some(token_id), now, correlation_id, "token not found".to_string());
            }
            Err(err) => {
                return self.reject(tenant_id, Some(token_id), now, correlation_id, err);
            }
        };
        if !row.is_valid(now) {
            return self.reject(tenant_id, Some(token_id), now, correlation_id, "token not active".to_string());
        }

        let _ = self.store.increment_usage(&token_id);
        let replay_outcome = self.replay.check_and_record(
            &hash_token(token),
            &Jti::from(token_id.clone()),
            row.expires_at,
            now,
            &ReplayContext::default(),
        );
        if replay_outcome.is_replay {
            self.audit.write(
                AuditId::new(uuid::Uuid::new_v4().to_string()),
                tenant_id.clone(),
                Some(token_id),
                AuditOperation::Verify,
                AuditStatus::Warning,
                Some("replay detected".to_string()),
                correlation_id,
                now,
            );
        } else {
            self.audit.write(
                AuditId::new(uuid::Uuid::new_v4().to_string()),
                tenant_id.clone(),
                Some(token_id),
                AuditOperation::Verify,
                AuditStatus::Success,
                None,
                correlation_id,
                now,
            );
        }
        VerifyOutcome {
            valid: true,
            payload: Some(payload),
            error: None,
        }
    }

    fn reject(
        &self,
        tenant_id: &TenantId,
        token_id: Option<TokenId>,
        now: i64,
        correlation_id: &str,
        error: String,
    ) -> VerifyOutcome {
        self.audit.write(
            AuditId::new(uuid::Uuid::new_v4().to_string()),
            tenant_id.clone(),
            token_id,
            AuditOperation::Verify,
            AuditStatus::Failure,
            Some(error.clone()),
            correlation_id,
            now,
        );
        VerifyOutcome {
            valid: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Revokes a token (spec §4.1 `revoke`). Idempotent: a second call
    /// returns `false`.
    ///
    /// # Errors
    /// Returns the underlying store error, wrapped, on store failure.
    pub fn revoke(
        &self,
        token_id: &TokenId,
        tenant_id: &TenantId,
        revoked_by: &str,
        now: i64,
        correlation_id: &str,
    ) -> Result<bool, TokenServiceError> {
        let revoked = self.store.revoke(token_id, now).map_err(TokenServiceError::Store)?;
        self.audit.write(
            AuditId::new(uuid::Uuid::new_v4().to_string()),
            tenant_id.clone(),
            Some(token_id.clone()),
            AuditOperation::Revoke,
            if revoked { AuditStatus::Success } else { AuditStatus::Warning },
            if revoked { None } else { Some(format!("already revoked by {revoked_by}")) },
            correlation_id,
            now,
        );
        Ok(revoked)
    }

    /// Verifies the presented token, revokes it, and issues a replacement
    /// carrying the same subject/capabilities (spec §4.1 `refresh`).
    ///
    /// # Errors
    /// Returns [`TokenServiceError::NotActive`] if the presented token does
    /// not verify, or any error [`TokenService::issue`] can return.
    pub fn refresh(
        &self,
        token: &str,
        extend_ttl: i64,
        tenant_id: &TenantId,
        now: i64,
        correlation_id: &str,
    ) -> Result<RefreshedToken, TokenServiceError> {
        let outcome = self.verify(token, tenant_id, now, correlation_id);
        let payload = outcome.payload.ok_or(TokenServiceError::NotActive)?;
        let old_token_id = TokenId::new(payload.jti.clone());
        let _ = self.revoke(&old_token_id, tenant_id, "refresh", now, correlation_id)?;
        let issued = self.issue(&payload.sub, payload.cap.clone(), extend_ttl, tenant_id, now, correlation_id)?;
        Ok(RefreshedToken {
            token: issued.token,
            token_id: issued.token_id,
            old_token_id,
            subject: payload.sub,
            capabilities: payload.cap,
            expires_at: issued.expires_at,
        })
    }

    /// Deletes expired tokens in batches, cascading to referencing rows
    /// (spec §4.1 `cleanup`). Continues past per-batch failures up to a
    /// threshold of 5 before aborting, per spec §7 recovery policy.
    ///
    /// # Errors
    /// Returns [`TokenServiceError::Internal`] once the failure threshold is
    /// exceeded.
    pub fn cleanup(
        &self,
        batch_size: u32,
        max_age_days: i64,
        dry_run: bool,
        now: i64,
    ) -> Result<CleanupStats, TokenServiceError> {
        const MAX_BATCH_FAILURES: u32 = 5;
        let cutoff = now - max_age_days * 86_400;
        let mut stats = CleanupStats {
            dry_run,
            ..CleanupStats::default()
        };
        let mut failures = 0u32;
        loop {
            match self.store.delete_expired(cutoff, batch_size, dry_run) {
                Ok(0) => break,
                Ok(deleted) => {
                    stats.tokens_processed += deleted;
                    if !dry_run {
                        stats.tokens_cleaned += deleted;
                    }
                    if deleted < u64::from(batch_size) {
                        break;
                    }
                }
                Err(_) => {
                    stats.errors_encountered += 1;
                    failures += 1;
                    if failures >= MAX_BATCH_FAILURES {
                        return Err(TokenServiceError::Internal(
                            "cleanup aborted after repeated batch failures".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(stats)
    }
}

fn base64_url_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut out = String::with_capacity((bytes.len() * 4).div_ceil(3));
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | b1.unwrap_or(0) >> 4) as usize] as char);
        if let Some(b1) = b1 {
            out.push(ALPHABET[(((b1 & 0x0f) << 2) | b2.unwrap_or(0) >> 6) as usize] as char);
        }
        if let Some(b2) = b2 {
            out.push(ALPHABET[(b2 & 0x3f) as usize] as char);
        }
    }
    out
}

fn base64_url_decode(text: &str) -> Result<Vec<u8>, ()> {
    fn value(byte: u8) -> Result<u8, ()> {
        match byte {
            b'A'..=b'Z' => Ok(byte - b'A'),
            b'a'..=b'z' => Ok(byte - b'a' + 26),
            b'0'..=b'9' => Ok(byte - b'0' + 52),
            b'-' => Ok(62),
            b'_' => Ok(63),
            _ => Err(()),
        }
    }
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 3 / 4);
    let mut chunks = bytes.chunks(4);
    while let Some(chunk) = chunks.next() {
        let v0 = value(chunk[0])?;
        let v1 = value(*chunk.get(1).ok_or(())?)?;
        out.push((v0 << 2) | (v1 >> 4));
        if let Some(&c2) = chunk.get(2) {
            let v2 = value(c2)?;
            out.push((v1 << 4) | (v2 >> 2));
            if let Some(&c3) = chunk.get(3) {
                let v3 = value(c3)?;
                out.push((v2 << 6) | v3);
            }
        }
    }
    Ok(out)
}

mod hex {
    pub(super) fn encode(bytes: impl AsRef<[u8]>) -> String {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            out.push(DIGITS[(byte >> 4) as usize] as char);
            out.push(DIGITS[(byte & 0x0f) as usize] as char);
        }
        out
    }
}
