// capgate-core/src/domain/replay.rs
// ============================================================================
// Module: Replay Protection (component B)
// Description: At-most-once enforcement for presented capability tokens.
// Purpose: Detect and flag reuse of a token hash within its validity window.
// Dependencies: std::collections, crate::domain::ids
// ============================================================================

//! ## Overview
//! Every successful [`crate::domain::token::TokenService::verify`] call also
//! records the token's hash here. A second presentation of the same token
//! within its validity window is a replay: it is still honored (spec §4.2:
//! replay is observability, not an authorization gate) but flagged so the
//! caller can audit and alert on it.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::domain::ids::Jti;

/// Caller-supplied context a replay check may want to correlate against
/// (source IP, request path). Currently unused by the in-memory
/// implementation but kept as an extension point matching the teacher's
/// habit of threading a context struct through interface boundaries even
/// before every field has a consumer.
#[derive(Debug, Clone, Default)]
pub struct ReplayContext {
    /// Opaque caller-supplied correlation tag, if any.
    pub tag: Option<String>,
}

/// Result of a [`ReplayProtector::check_and_record`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Whether this token hash had already been recorded, unexpired, before
    /// this call.
    pub is_replay: bool,
}

/// Records presented-token hashes and reports reuse within the token's own
/// validity window (spec §4.2).
pub trait ReplayProtector {
    /// Records a presentation of `token_hash` for `jti`, expiring at
    /// `expires_at`, and reports whether it had already been seen.
    ///
    /// `now` is used to evict entries whose `expires_at` has passed before
    /// considering the new presentation, so a hash can never falsely flag a
    /// replay against a record that has already expired.
    fn check_and_record(
        &self,
        token_hash: &str,
        jti: &Jti,
        expires_at: i64,
        now: i64,
        context: &ReplayContext,
    ) -> ReplayOutcome;
}

struct ReplayEntry {
    expires_at: i64,
}

/// A process-local [`ReplayProtector`] backed by a hash map. Suitable as the
/// "fast store" tier described in spec §4.2; a durable tier would wrap a
/// shared cache (e.g. Redis) behind the same trait.
#[derive(Default)]
pub struct InMemoryReplayProtector {
    seen: RefCell<HashMap<String, ReplayEntry>>,
}

impl ReplayProtector for InMemoryReplayProtector {
    fn check_and_record(
        &self,
        token_hash: &str,
        _jti: &Jti,
        expires_at: i64,
        now: i64,
        _context: &ReplayContext,
    ) -> ReplayOutcome {
        let mut seen = self.seen.borrow_mut();
        seen.retain(|_, entry| entry.expires_at > now);
        let is_replay = seen.contains_key(token_hash);
        seen.insert(token_hash.to_string(), ReplayEntry { expires_at });
        ReplayOutcome { is_replay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_presentation_is_not_a_replay() {
        let protector = InMemoryReplayProtector::default();
        let jti = Jti::new("jti-1");
        let outcome = protector.check_and_record("hash-1", &jti, 1_100, 1_000, &ReplayContext::default());
        assert!(!outcome.is_replay);
    }

    #[test]
    fn second_presentation_within_window_is_a_replay() {
        let protector = InMemoryReplayProtector::default();
        let jti = Jti::new("jti-1");
        let _ = protector.check_and_record("hash-1", &jti, 1_100, 1_000, &ReplayContext::default());
        let outcome = protector.check_and_record("hash-1", &jti, 1_100, 1_010, &ReplayContext::default());
        assert!(outcome.is_replay);
    }

    #[test]
    fn presentation_after_expiry_is_not_a_replay() {
        let protector = InMemoryReplayProtector::default();
        let jti = Jti::new("jti-1");
        let _ = protector.check_and_record("hash-1", &jti, 1_100, 1_000, &ReplayContext::default());
        let outcome = protector.check_and_record("hash-1", &jti, 1_300, 1_200, &ReplayContext::default());
        assert!(!outcome.is_replay);
    }
}
