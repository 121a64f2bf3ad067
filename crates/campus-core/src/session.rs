//! # Session Module
//!
//! Process-local session registry.
//!
//! - A session is an opaque bearer token plus a descriptor (user, role,
//!   issue and expiry time)
//! - One slot per account: a new login replaces the previous session
//! - Never persisted; a restart logs everybody out
//!
//! The calling layer carries the `Session` between requests and presents it
//! back. Tokens are compared in constant time.

use crate::Role;
use crate::primitives::SESSION_TOKEN_BYTES;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

/// Who a session belongs to and how long it lasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub user_id: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A bearer token and its descriptor.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub descriptor: SessionDescriptor,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl Session {
    /// The session's user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.descriptor.user_id
    }
}

#[derive(Debug)]
struct Slot {
    token: String,
    descriptor: SessionDescriptor,
}

/// Single-slot-per-account session table.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: Mutex<BTreeMap<String, Slot>>,
}

fn generate_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a session for `user_id`, replacing any previous one.
    pub fn issue(
        &self,
        user_id: &str,
        role: Role,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Session {
        let descriptor = SessionDescriptor {
            user_id: user_id.to_string(),
            role,
            issued_at: now,
            expires_at: now + ttl,
        };
        let token = generate_token();
        let replaced = self
            .slots
            .lock()
            .insert(
                user_id.to_string(),
                Slot {
                    token: token.clone(),
                    descriptor: descriptor.clone(),
                },
            )
            .is_some();
        if replaced {
            tracing::debug!(event = "session_replaced", user_id = %user_id);
        }
        Session { token, descriptor }
    }

    /// The registered descriptor, if `session` is the account's current,
    /// unexpired session.
    pub fn validate(&self, session: &Session, now: DateTime<Utc>) -> Option<SessionDescriptor> {
        let slots = self.slots.lock();
        let slot = slots.get(session.user_id())?;
        let matches: bool = slot
            .token
            .as_bytes()
            .ct_eq(session.token.as_bytes())
            .into();
        (matches && now < slot.descriptor.expires_at).then(|| slot.descriptor.clone())
    }

    /// Drop the account's session; returns whether one existed.
    pub fn revoke(&self, user_id: &str) -> bool {
        self.slots.lock().remove(user_id).is_some()
    }

    /// Drop every expired session; returns how many were dropped.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| now < slot.descriptor.expires_at);
        before - slots.len()
    }

    /// Number of live slots (expired ones included until purged).
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(user: &str, now: DateTime<Utc>) -> (SessionRegistry, Session) {
        let registry = SessionRegistry::new();
        let session = registry.issue(user, Role::Student, now, Duration::hours(24));
        (registry, session)
    }

    #[test]
    fn issued_session_validates_until_expiry() {
        let now = Utc::now();
        let (registry, session) = registry_with("u1", now);

        assert_eq!(session.descriptor.expires_at, now + Duration::hours(24));
        assert!(registry.validate(&session, now).is_some());
        assert!(
            registry
                .validate(&session, now + Duration::hours(23))
                .is_some()
        );
        assert!(
            registry
                .validate(&session, now + Duration::hours(24))
                .is_none()
        );
    }

    #[test]
    fn last_login_wins() {
        let now = Utc::now();
        let (registry, first) = registry_with("u1", now);
        let second = registry.issue("u1", Role::Student, now, Duration::hours(24));

        assert_ne!(first.token, second.token);
        assert!(registry.validate(&first, now).is_none());
        assert!(registry.validate(&second, now).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn forged_descriptor_does_not_extend_expiry() {
        let now = Utc::now();
        let (registry, mut session) = registry_with("u1", now);
        session.descriptor.expires_at = now + Duration::days(365);
        assert!(
            registry
                .validate(&session, now + Duration::days(2))
                .is_none()
        );
    }

    #[test]
    fn revoke_and_purge() {
        let now = Utc::now();
        let (registry, session) = registry_with("u1", now);
        registry.issue("u2", Role::Admin, now - Duration::hours(48), Duration::hours(24));

        assert_eq!(registry.purge_expired(now), 1);
        assert!(registry.revoke("u1"));
        assert!(!registry.revoke("u1"));
        assert!(registry.validate(&session, now).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn debug_redacts_token() {
        let (_, session) = registry_with("u1", Utc::now());
        let rendered = format!("{:?}", session);
        assert!(!rendered.contains(&session.token));
        assert!(rendered.contains("<redacted>"));
    }
}
