//! # Campus
//!
//! The facade that owns the store, the clock, the credential hasher and the
//! session registry. Each workflow is a short-lived borrowing view obtained
//! from it (`campus.identity()`, `campus.mess()`, ...).
//!
//! `Campus` is `Send + Sync`; share it behind an `Arc` across threads.

use crate::clock::{Clock, SystemClock};
use crate::config::CampusConfig;
use crate::credentials::CredentialHasher;
use crate::session::SessionRegistry;
use crate::storage::Store;
use crate::CampusResult;
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use std::sync::Arc;

/// Entry point to every workflow.
#[derive(Debug)]
pub struct Campus {
    pub(crate) store: Arc<Store>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: CampusConfig,
    pub(crate) hasher: CredentialHasher,
    pub(crate) sessions: SessionRegistry,
}

impl Campus {
    /// Open (or create) a persistent store at `path`.
    pub fn open(path: impl AsRef<Path>, config: CampusConfig) -> CampusResult<Self> {
        let store = Store::open(path)?;
        Self::with_store(Arc::new(store), config, Arc::new(SystemClock))
    }

    /// A campus backed by an in-memory store.
    pub fn in_memory(config: CampusConfig) -> CampusResult<Self> {
        Self::with_store(Arc::new(Store::in_memory()?), config, Arc::new(SystemClock))
    }

    /// Assemble from parts (shared store, injected clock).
    pub fn with_store(
        store: Arc<Store>,
        config: CampusConfig,
        clock: Arc<dyn Clock>,
    ) -> CampusResult<Self> {
        config.validate()?;
        let hasher = CredentialHasher::new(config.password_cost)?;
        Ok(Self {
            store,
            clock,
            config,
            hasher,
            sessions: SessionRegistry::new(),
        })
    }

    /// The underlying collection store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &CampusConfig {
        &self.config
    }

    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub(crate) fn today(&self) -> NaiveDate {
        self.clock.today()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for workflow unit tests.
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::NewUser;
    use crate::session::Session;
    use crate::{Actor, Role};
    use chrono::TimeZone;

    /// Cheap hashing so tests stay fast.
    pub fn test_config() -> CampusConfig {
        CampusConfig {
            password_cost: 4,
            ..CampusConfig::default()
        }
    }

    pub fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().unwrap()
    }

    /// In-memory campus on a manual clock fixed at `start_time()`.
    pub fn campus() -> (Campus, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_time()));
        let campus = Campus::with_store(
            Arc::new(Store::in_memory().unwrap()),
            test_config(),
            clock.clone(),
        )
        .unwrap();
        (campus, clock)
    }

    pub fn new_user(id: &str, role: Role) -> NewUser {
        NewUser {
            id: Some(id.to_string()),
            username: id.to_string(),
            password: "password1".to_string(),
            email: format!("{}@campus.edu", id),
            role: Some(role),
            department: Some("cse".to_string()),
            ..NewUser::default()
        }
    }

    /// Register `id` with `role`, log in, and authorize.
    pub fn actor(campus: &Campus, id: &str, role: Role) -> (Actor, Session) {
        let identity = campus.identity();
        identity.register(new_user(id, role)).unwrap();
        let outcome = identity.login(id, "password1").unwrap();
        let actor = identity.authorize(&outcome.session).unwrap();
        (actor, outcome.session)
    }
}
