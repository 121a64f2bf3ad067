//! # Identity & Sessions
//!
//! Registration, authentication, session issuance and validation, profile
//! mutation and account administration over the `users` collection.
//!
//! Callers never see a stored credential: every read returns a
//! `UserProfile`, a static projection without the credential field.

use crate::campus::Campus;
use crate::primitives::{KEY_FIELD, MIN_PASSWORD_LENGTH};
use crate::query::{Record, from_document, to_document};
use crate::session::Session;
use crate::storage::schema::USERS;
use crate::storage::{Document, Filter};
use crate::{Actor, CampusError, CampusResult, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the credential field in stored user documents.
pub const CREDENTIAL_FIELD: &str = "credential";

/// Fields `update_profile` never touches.
const PROTECTED_FIELDS: &[&str] = &[
    KEY_FIELD,
    "username",
    "role",
    "created_at",
    CREDENTIAL_FIELD,
    "is_active",
    "last_login",
];

fn default_true() -> bool {
    true
}

/// Per-user notification switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub alerts: bool,
    pub mess: bool,
    pub career: bool,
    pub results: bool,
    pub attendance: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            alerts: true,
            mess: true,
            career: true,
            results: true,
            attendance: true,
        }
    }
}

/// A stored account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) credential: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub semester: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notification_preferences: NotificationPreferences,
}

impl Record for User {
    const COLLECTION: &'static str = USERS;
    const ENTITY: &'static str = "User";
}

/// Public view of a user: everything but the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub semester: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub notification_preferences: NotificationPreferences,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            department: user.department.clone(),
            name: user.name.clone(),
            phone: user.phone.clone(),
            semester: user.semester,
            is_active: user.is_active,
            created_at: user.created_at,
            last_login: user.last_login,
            notification_preferences: user.notification_preferences,
        }
    }
}

/// Registration input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    /// Account id; a random UUID when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub semester: Option<u32>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub user: UserProfile,
}

fn validate_email(email: &str) -> CampusResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CampusError::Validation(format!("malformed email '{}'", email)))
    }
}

fn validate_identifier(field: &str, value: &str) -> CampusResult<()> {
    if value.chars().any(char::is_control) {
        return Err(CampusError::Validation(format!(
            "{} must not contain control characters",
            field
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> CampusResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CampusError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Map a store-level unique rejection on `users` to a workflow conflict.
fn conflict_from(err: CampusError, username: &str, email: &str) -> CampusError {
    if err.is_unique_violation_on("username") {
        CampusError::Conflict(format!("username '{}' is taken", username))
    } else if err.is_unique_violation_on("email") {
        CampusError::Conflict(format!("email '{}' is already registered", email))
    } else if err.is_unique_violation_on(KEY_FIELD) {
        CampusError::Conflict("user id is taken".to_string())
    } else {
        err
    }
}

/// Identity and session workflow.
#[derive(Debug, Clone, Copy)]
pub struct IdentityService<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn identity(&self) -> IdentityService<'_> {
        IdentityService { campus: self }
    }
}

impl IdentityService<'_> {
    fn users(&self) -> crate::query::Collection<'_, User> {
        self.campus.store.collection::<User>()
    }

    fn require_user(&self, id: &str) -> CampusResult<User> {
        self.users().require(id)
    }

    // =========================================================================
    // REGISTRATION & LOGIN
    // =========================================================================

    /// Create an account.
    pub fn register(&self, candidate: NewUser) -> CampusResult<UserProfile> {
        let username = candidate.username.trim().to_string();
        let email = candidate.email.trim().to_lowercase();
        if username.is_empty() {
            return Err(CampusError::Validation("username is required".to_string()));
        }
        if email.is_empty() {
            return Err(CampusError::Validation("email is required".to_string()));
        }
        if candidate.password.is_empty() {
            return Err(CampusError::Validation("password is required".to_string()));
        }
        let role = candidate
            .role
            .ok_or_else(|| CampusError::Validation("role is required".to_string()))?;
        validate_identifier("username", &username)?;
        validate_email(&email)?;
        validate_password(&candidate.password)?;

        let users = self.users();
        if users.count_where(Filter::eq("username", username.as_str()))? > 0 {
            return Err(CampusError::Conflict(format!(
                "username '{}' is taken",
                username
            )));
        }
        if users.count_where(Filter::eq("email", email.as_str()))? > 0 {
            return Err(CampusError::Conflict(format!(
                "email '{}' is already registered",
                email
            )));
        }

        let id = candidate
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        validate_identifier("id", &id)?;
        if users.get(id.as_str())?.is_some() {
            return Err(CampusError::Conflict(format!("user id '{}' is taken", id)));
        }

        let user = User {
            id,
            username,
            email,
            credential: Some(self.campus.hasher.hash(&candidate.password)?),
            role,
            department: candidate.department,
            name: candidate.name,
            phone: candidate.phone,
            semester: candidate.semester,
            is_active: true,
            created_at: self.campus.now(),
            last_login: None,
            notification_preferences: NotificationPreferences::default(),
        };
        users
            .insert(&user)
            .map_err(|e| conflict_from(e, &user.username, &user.email))?;

        tracing::info!(event = "user_registered", user_id = %user.id, role = %user.role);
        self.campus
            .activity()
            .record(&user.id, "register", Some(format!("role={}", user.role)));
        Ok(UserProfile::from(&user))
    }

    /// Verify credentials and issue a session.
    pub fn login(&self, username: &str, password: &str) -> CampusResult<LoginOutcome> {
        let username = username.trim();
        let mut user = self
            .users()
            .find_one(Filter::eq("username", username))?
            .ok_or_else(|| CampusError::not_found("User", username))?;

        if !user.is_active {
            return Err(CampusError::Deactivated);
        }
        let verified = user
            .credential
            .as_deref()
            .is_some_and(|stored| self.campus.hasher.verify(password, stored));
        if !verified {
            tracing::info!(event = "login_rejected", user_id = %user.id);
            return Err(CampusError::Auth("invalid credentials".to_string()));
        }

        let now = self.campus.now();
        user.last_login = Some(now);
        self.users().put(&user)?;

        let session =
            self.campus
                .sessions
                .issue(&user.id, user.role, now, self.campus.config.session_ttl());
        tracing::info!(event = "login", user_id = %user.id);
        self.campus.activity().record(&user.id, "login", None);
        Ok(LoginOutcome {
            session,
            user: UserProfile::from(&user),
        })
    }

    /// End the session; returns whether it was live.
    pub fn logout(&self, session: &Session) -> bool {
        let now = self.campus.now();
        if self.campus.sessions.validate(session, now).is_none() {
            return false;
        }
        self.campus.sessions.revoke(session.user_id());
        self.campus.activity().record(session.user_id(), "logout", None);
        true
    }

    // =========================================================================
    // SESSION RESOLUTION
    // =========================================================================

    /// The session's user, if the session is current and the user active.
    ///
    /// "No session" is `Ok(None)`; only storage faults are errors.
    pub fn get_current_user(&self, session: &Session) -> CampusResult<Option<UserProfile>> {
        let Some(descriptor) = self.campus.sessions.validate(session, self.campus.now()) else {
            return Ok(None);
        };
        Ok(self
            .users()
            .get(descriptor.user_id.as_str())?
            .filter(|user| user.is_active)
            .map(|user| UserProfile::from(&user)))
    }

    /// Resolve a session to an `Actor` for the mutating workflows.
    pub fn authorize(&self, session: &Session) -> CampusResult<Actor> {
        let descriptor = self
            .campus
            .sessions
            .validate(session, self.campus.now())
            .ok_or_else(|| CampusError::Auth("invalid or expired session".to_string()))?;
        let user = self
            .users()
            .get(descriptor.user_id.as_str())?
            .ok_or_else(|| CampusError::Auth("session user no longer exists".to_string()))?;
        if !user.is_active {
            return Err(CampusError::Deactivated);
        }
        Ok(Actor::new(user.id, user.role))
    }

    // =========================================================================
    // PROFILE
    // =========================================================================

    /// A user's profile (self, admin or faculty).
    pub fn get_user(&self, actor: &Actor, user_id: &str) -> CampusResult<UserProfile> {
        actor.require_self_or(user_id, &[Role::Admin, Role::Faculty], "get_user")?;
        Ok(UserProfile::from(&self.require_user(user_id)?))
    }

    /// Merge `updates` into the profile. Identity fields are dropped silently.
    pub fn update_profile(
        &self,
        actor: &Actor,
        user_id: &str,
        updates: Document,
    ) -> CampusResult<UserProfile> {
        actor.require_self_or(user_id, &[Role::Admin], "update_profile")?;
        let current = self.require_user(user_id)?;

        let mut doc = to_document(&current)?;
        let mut changed = Vec::new();
        for (field, value) in updates {
            if PROTECTED_FIELDS.contains(&field.as_str()) {
                tracing::debug!(event = "profile_field_dropped", field = %field);
                continue;
            }
            changed.push(field.clone());
            doc.insert(field, value);
        }
        let mut updated: User = serde_json::from_value(serde_json::Value::Object(doc))
            .map_err(|e| CampusError::Validation(format!("invalid profile update: {}", e)))?;
        updated.email = updated.email.trim().to_lowercase();
        if updated.email != current.email {
            validate_email(&updated.email)?;
        }

        self.users()
            .put(&updated)
            .map_err(|e| conflict_from(e, &updated.username, &updated.email))?;
        self.campus.activity().record(
            actor.user_id(),
            "profile_updated",
            Some(format!("user={} fields={}", user_id, changed.join(","))),
        );
        Ok(UserProfile::from(&updated))
    }

    /// Replace the actor's password after verifying the current one.
    pub fn change_password(&self, actor: &Actor, current: &str, new: &str) -> CampusResult<()> {
        let mut user = self.require_user(actor.user_id())?;
        let verified = user
            .credential
            .as_deref()
            .is_some_and(|stored| self.campus.hasher.verify(current, stored));
        if !verified {
            return Err(CampusError::Auth("current password is incorrect".to_string()));
        }
        validate_password(new)?;
        user.credential = Some(self.campus.hasher.hash(new)?);
        self.users().put(&user)?;
        self.campus
            .activity()
            .record(actor.user_id(), "password_changed", None);
        Ok(())
    }

    /// Replace notification switches.
    pub fn update_notification_preferences(
        &self,
        actor: &Actor,
        user_id: &str,
        preferences: NotificationPreferences,
    ) -> CampusResult<UserProfile> {
        actor.require_self_or(user_id, &[Role::Admin], "update_notification_preferences")?;
        let mut user = self.require_user(user_id)?;
        user.notification_preferences = preferences;
        self.users().put(&user)?;
        self.campus
            .activity()
            .record(actor.user_id(), "preferences_updated", None);
        Ok(UserProfile::from(&user))
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Activate or deactivate an account. Deactivation ends its session.
    pub fn set_active(&self, actor: &Actor, user_id: &str, active: bool) -> CampusResult<UserProfile> {
        actor.require_admin("set_active")?;
        let mut user = self.require_user(user_id)?;
        user.is_active = active;
        self.users().put(&user)?;
        if !active {
            self.campus.sessions.revoke(user_id);
        }
        tracing::info!(event = "user_active_changed", user_id = %user_id, active);
        self.campus.activity().record(
            actor.user_id(),
            if active { "user_activated" } else { "user_deactivated" },
            Some(format!("user={}", user_id)),
        );
        Ok(UserProfile::from(&user))
    }

    /// Set a new password without the current one.
    pub fn reset_password(&self, actor: &Actor, user_id: &str, new: &str) -> CampusResult<()> {
        actor.require_admin("reset_password")?;
        validate_password(new)?;
        let mut user = self.require_user(user_id)?;
        user.credential = Some(self.campus.hasher.hash(new)?);
        self.users().put(&user)?;
        self.campus.sessions.revoke(user_id);
        self.campus.activity().record(
            actor.user_id(),
            "password_reset",
            Some(format!("user={}", user_id)),
        );
        Ok(())
    }

    /// Accounts, optionally narrowed by role and department.
    pub fn list_users(
        &self,
        actor: &Actor,
        role: Option<Role>,
        department: Option<&str>,
    ) -> CampusResult<Vec<UserProfile>> {
        actor.require_any(&[Role::Admin, Role::Faculty], "list_users")?;
        let users = match (role, department) {
            (Some(role), _) => self.users().find(Filter::eq("role", role.as_str()))?,
            (None, Some(dept)) => self.users().find(Filter::eq("department", dept))?,
            (None, None) => self.users().all()?,
        };
        Ok(users
            .iter()
            .filter(|u| department.is_none_or(|d| u.department.as_deref() == Some(d)))
            .map(UserProfile::from)
            .collect())
    }

    /// Stored credential of `user_id`, if any. Used by import.
    pub(crate) fn stored_credential(&self, user_id: &str) -> CampusResult<Option<String>> {
        Ok(self
            .users()
            .get(user_id)?
            .and_then(|user| user.credential))
    }
}

/// Decode a user document, e.g. from a snapshot.
pub(crate) fn user_from_document(doc: Document) -> CampusResult<User> {
    from_document(doc)
}

// =============================================================================
// TESTS
// =============================================================================
