//! # campus-core
//!
//! The persistent data layer for the campus services app.
//!
//! Two halves:
//! - a Collection Store on `redb`: named collections of JSON documents with
//!   secondary indexes, unique constraints enforced inside the write
//!   transaction, and ordered index scans;
//! - the workflows layered on it (identity, attendance, mess, career,
//!   results, alerts) that keep related records consistent without
//!   cross-collection transactions.
//!
//! ## Architectural Constraints
//!
//! - No async and no network dependencies
//! - Every mutating workflow takes an authorized [`Actor`]; there is no
//!   ambient "current user"
//! - Time comes from the injected [`Clock`]
//! - Every mutating call writes one activity entry; audit failures never
//!   fail the caller
//!
//! ```no_run
//! use campus_core::{Campus, CampusConfig, Role};
//! use campus_core::identity::NewUser;
//!
//! # fn main() -> campus_core::CampusResult<()> {
//! let campus = Campus::open("campus.redb", CampusConfig::default())?;
//! campus.identity().register(NewUser {
//!     username: "ana".into(),
//!     password: "correct horse".into(),
//!     email: "ana@campus.edu".into(),
//!     role: Some(Role::Student),
//!     ..NewUser::default()
//! })?;
//! let login = campus.identity().login("ana", "correct horse")?;
//! let actor = campus.identity().authorize(&login.session)?;
//! let stats = campus.attendance().stats(&actor, actor.user_id())?;
//! # let _ = stats;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod activity;
pub mod alerts;
pub mod attendance;
pub mod campus;
pub mod career;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod export;
pub mod identity;
pub mod maintenance;
pub mod mess;
pub mod primitives;
pub mod query;
pub mod results;
pub mod session;
pub mod stats;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use types::{Actor, CampusError, CampusResult, Role};

pub use campus::Campus;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CampusConfig;
pub use export::{ImportReport, Snapshot};
pub use maintenance::MaintenanceReport;
pub use query::{Collection, Record};
pub use session::{Session, SessionDescriptor};
pub use storage::{Document, Filter, IndexValue, Key, Order, Query, Store};
