//! # Snapshot Export, Import and Backup Registry
//!
//! A `Snapshot` is every collection's documents plus metadata. Export strips
//! stored credentials; import upserts record by record in dependency order
//! (users before everything that references them) and is safe to re-run.
//!
//! Registry backups stay inside the store, so they keep credentials. Each is
//! a binary envelope:
//!
//! ```text
//! [header_len: u32 LE] [BackupHeader (postcard)] [Snapshot (JSON)]
//! ```
//!
//! The header carries magic, format version, export time, record count and
//! an FNV-1a checksum of the payload, verified before restore.

use crate::activity::ActivityEntry;
use crate::attendance::AttendanceRecord;
use crate::campus::Campus;
use crate::career::StudentApplication;
use crate::identity::{CREDENTIAL_FIELD, UserProfile, user_from_document};
use crate::mess::{MessBooking, MessFeedback};
use crate::primitives::{BACKUP_FORMAT_VERSION, BACKUP_MAGIC, MAX_BACKUP_SIZE, SNAPSHOT_VERSION};
use crate::query::to_document;
use crate::results::StudentResults;
use crate::storage::schema::{SCHEMAS, USERS};
use crate::storage::{Document, Filter};
use crate::types::serialization_error;
use crate::{Actor, CampusError, CampusResult, Role};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SNAPSHOT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    /// Documents per collection.
    pub counts: BTreeMap<String, usize>,
    #[serde(default)]
    pub credentials_included: bool,
}

/// Point-in-time copy of every collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub collections: BTreeMap<String, Vec<Document>>,
}

impl Snapshot {
    /// Total documents across collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    pub fn to_json_pretty(&self) -> CampusResult<String> {
        serde_json::to_string_pretty(self).map_err(serialization_error)
    }

    pub fn from_json(text: &str) -> CampusResult<Self> {
        serde_json::from_str(text).map_err(serialization_error)
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Documents written per collection.
    pub imported: BTreeMap<String, usize>,
    /// Live records removed per collection because an imported record holds
    /// the same unique index value (e.g. a booking re-made after the backup).
    pub displaced: BTreeMap<String, usize>,
    /// Collections in the snapshot that this store does not know.
    pub skipped_collections: Vec<String>,
    /// Activity entries the import itself appended, on top of the imported
    /// `activity_log` records.
    pub audit_entries: usize,
}

impl ImportReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.imported.values().sum()
    }
}

// =============================================================================
// BACKUP ENVELOPE
// =============================================================================

/// Header of a registry backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub exported_at_millis: i64,
    pub record_count: u64,
    /// FNV-1a over the payload bytes.
    pub checksum: u64,
}

impl BackupHeader {
    fn validate(&self) -> CampusResult<()> {
        if self.magic != BACKUP_MAGIC {
            return Err(CampusError::Serialization("Invalid backup format".to_string()));
        }
        if self.version != BACKUP_FORMAT_VERSION {
            return Err(CampusError::Serialization(
                "Unsupported backup version".to_string(),
            ));
        }
        Ok(())
    }
}

/// Listing entry for a stored backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub id: String,
    pub exported_at: DateTime<Utc>,
    pub record_count: u64,
    pub size_bytes: usize,
}

/// 64-bit FNV-1a. Detects accidental corruption, not tampering.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// BLAKE3 digest of an envelope, as hex.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn encode_envelope(header: &BackupHeader, payload: &[u8]) -> CampusResult<Vec<u8>> {
    let header_bytes = postcard::to_allocvec(header)
        .map_err(|e| CampusError::Serialization(format!("Header: {}", e)))?;
    let header_len = u32::try_from(header_bytes.len()).map_err(serialization_error)?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split an envelope into its validated header and payload.
fn decode_envelope(bytes: &[u8]) -> CampusResult<(BackupHeader, &[u8])> {
    if bytes.len() > MAX_BACKUP_SIZE {
        return Err(CampusError::Serialization(format!(
            "Backup of {} bytes exceeds maximum {}",
            bytes.len(),
            MAX_BACKUP_SIZE
        )));
    }
    let too_short = || CampusError::Serialization("Backup too short".to_string());
    let len_bytes: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(too_short)?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_end = 4usize.checked_add(header_len).ok_or_else(too_short)?;
    let header_bytes = bytes.get(4..header_end).ok_or_else(too_short)?;
    let payload = bytes.get(header_end..).ok_or_else(too_short)?;

    let header: BackupHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| CampusError::Serialization(format!("Header: {}", e)))?;
    header.validate()?;
    Ok((header, payload))
}

fn millis_to_time(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

// =============================================================================
// PER-USER EXPORT
// =============================================================================

/// Everything the store holds about one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserDataExport {
    pub profile: UserProfile,
    pub attendance: Vec<AttendanceRecord>,
    pub bookings: Vec<MessBooking>,
    pub feedback: Vec<MessFeedback>,
    pub applications: Vec<StudentApplication>,
    pub results: StudentResults,
    /// Newest first.
    pub activity: Vec<ActivityEntry>,
    pub exported_at: DateTime<Utc>,
}

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct BackupService<'c> {
    campus: &'c Campus,
}

impl Campus {
    pub fn backups(&self) -> BackupService<'_> {
        BackupService { campus: self }
    }
}

impl BackupService<'_> {
    fn snapshot(&self, credentials_included: bool) -> CampusResult<Snapshot> {
        let mut collections = self.campus.store.dump()?;
        if !credentials_included && let Some(users) = collections.get_mut(USERS) {
            for doc in users {
                doc.remove(CREDENTIAL_FIELD);
            }
        }
        Ok(Snapshot {
            metadata: SnapshotMetadata {
                version: SNAPSHOT_VERSION,
                exported_at: self.campus.now(),
                counts: collections
                    .iter()
                    .map(|(name, docs)| (name.clone(), docs.len()))
                    .collect(),
                credentials_included,
            },
            collections,
        })
    }

    /// Snapshot of every collection, credentials stripped (admin only).
    pub fn export(&self, actor: &Actor) -> CampusResult<Snapshot> {
        actor.require_admin("export")?;
        let snapshot = self.snapshot(false)?;
        tracing::info!(
            event = "snapshot_exported",
            records = snapshot.record_count(),
            actor = %actor.user_id()
        );
        Ok(snapshot)
    }

    /// Upsert every record of `snapshot` (admin only).
    ///
    /// An imported record takes over any unique index value it shares with
    /// a live record; the live record is removed and counted in
    /// `displaced`. Not atomic: a failure leaves earlier collections
    /// written. Running the same import again converges to the same state.
    pub fn import(&self, actor: &Actor, snapshot: &Snapshot) -> CampusResult<ImportReport> {
        actor.require_admin("import")?;
        if snapshot.metadata.version > SNAPSHOT_VERSION {
            return Err(CampusError::Validation(format!(
                "snapshot version {} is newer than supported {}",
                snapshot.metadata.version, SNAPSHOT_VERSION
            )));
        }

        let mut report = ImportReport::default();
        for schema in SCHEMAS {
            let Some(docs) = snapshot.collections.get(schema.name) else {
                continue;
            };
            let mut displaced = 0;
            for doc in docs {
                displaced += if schema.name == USERS {
                    self.import_user(doc.clone())?
                } else {
                    self.campus.store.restore(schema.name, doc.clone())?
                };
            }
            report.imported.insert(schema.name.to_string(), docs.len());
            if displaced > 0 {
                tracing::warn!(
                    event = "import_displaced",
                    collection = schema.name,
                    displaced
                );
                report.displaced.insert(schema.name.to_string(), displaced);
            }
        }
        for name in snapshot.collections.keys() {
            if !SCHEMAS.iter().any(|s| s.name == name.as_str()) {
                tracing::warn!(event = "import_unknown_collection", collection = %name);
                report.skipped_collections.push(name.clone());
            }
        }

        tracing::info!(event = "snapshot_imported", records = report.total());
        let audited = self.campus.activity().record(
            actor.user_id(),
            "import",
            Some(format!("records={}", report.total())),
        );
        report.audit_entries = usize::from(audited);
        Ok(report)
    }

    /// An incoming user without a credential keeps the stored one.
    fn import_user(&self, doc: Document) -> CampusResult<usize> {
        let mut user = user_from_document(doc)?;
        if user.credential.is_none() {
            user.credential = self.campus.identity().stored_credential(&user.id)?;
        }
        self.campus.store.restore(USERS, to_document(&user)?)
    }

    // =========================================================================
    // REGISTRY
    // =========================================================================

    /// Store a full backup (credentials included) in the registry.
    pub fn create_backup(&self, actor: &Actor) -> CampusResult<BackupInfo> {
        actor.require_admin("create_backup")?;
        let snapshot = self.snapshot(true)?;
        let payload = serde_json::to_vec(&snapshot).map_err(serialization_error)?;
        let exported_at = snapshot.metadata.exported_at;
        let header = BackupHeader {
            magic: BACKUP_MAGIC,
            version: BACKUP_FORMAT_VERSION,
            exported_at_millis: exported_at.timestamp_millis(),
            record_count: snapshot.record_count() as u64,
            checksum: checksum(&payload),
        };
        let envelope = encode_envelope(&header, &payload)?;

        let base = format!("backup_{}", header.exported_at_millis);
        let mut id = base.clone();
        let mut suffix = 1;
        while self.campus.store.get_backup(&id)?.is_some() {
            id = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.campus.store.put_backup(&id, &envelope)?;

        tracing::info!(
            event = "backup_created",
            backup_id = %id,
            records = header.record_count,
            bytes = envelope.len()
        );
        self.campus
            .activity()
            .record(actor.user_id(), "backup_created", Some(id.clone()));
        Ok(BackupInfo {
            id,
            exported_at,
            record_count: header.record_count,
            size_bytes: envelope.len(),
        })
    }

    /// Registry entries, newest export first. Unreadable entries are skipped.
    pub fn list_backups(&self, actor: &Actor) -> CampusResult<Vec<BackupInfo>> {
        actor.require_admin("list_backups")?;
        let mut infos: Vec<BackupInfo> = self
            .campus
            .store
            .backups()?
            .into_iter()
            .filter_map(|(id, bytes)| match decode_envelope(&bytes) {
                Ok((header, _)) => Some(BackupInfo {
                    id,
                    exported_at: millis_to_time(header.exported_at_millis),
                    record_count: header.record_count,
                    size_bytes: bytes.len(),
                }),
                Err(e) => {
                    tracing::warn!(event = "backup_unreadable", backup_id = %id, error = %e);
                    None
                }
            })
            .collect();
        infos.sort_by(|a, b| {
            b.exported_at
                .cmp(&a.exported_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(infos)
    }

    /// Verify and import a stored backup.
    pub fn restore_backup(&self, actor: &Actor, id: &str) -> CampusResult<ImportReport> {
        actor.require_admin("restore_backup")?;
        let bytes = self
            .campus
            .store
            .get_backup(id)?
            .ok_or_else(|| CampusError::not_found("Backup", id))?;
        let (header, payload) = decode_envelope(&bytes)?;
        let computed = checksum(payload);
        if computed != header.checksum {
            return Err(CampusError::Serialization(format!(
                "Checksum mismatch: expected {}, got {}",
                header.checksum, computed
            )));
        }
        let snapshot: Snapshot = serde_json::from_slice(payload).map_err(serialization_error)?;
        if snapshot.record_count() as u64 != header.record_count {
            return Err(CampusError::Serialization(
                "Record count mismatch".to_string(),
            ));
        }
        tracing::info!(event = "backup_restore", backup_id = %id);
        self.import(actor, &snapshot)
    }

    pub fn delete_backup(&self, actor: &Actor, id: &str) -> CampusResult<()> {
        actor.require_admin("delete_backup")?;
        if !self.campus.store.delete_backup(id)? {
            return Err(CampusError::not_found("Backup", id));
        }
        self.campus
            .activity()
            .record(actor.user_id(), "backup_deleted", Some(id.to_string()));
        Ok(())
    }

    /// Raw envelope of a stored backup, e.g. to copy it off the machine.
    pub fn backup_bytes(&self, actor: &Actor, id: &str) -> CampusResult<Vec<u8>> {
        actor.require_admin("backup_bytes")?;
        self.campus
            .store
            .get_backup(id)?
            .ok_or_else(|| CampusError::not_found("Backup", id))
    }

    // =========================================================================
    // PER-USER
    // =========================================================================

    /// Everything held about `user_id` (self or admin).
    pub fn export_user_data(&self, actor: &Actor, user_id: &str) -> CampusResult<UserDataExport> {
        actor.require_self_or(user_id, &[Role::Admin], "export_user_data")?;
        let store = &self.campus.store;
        let profile = self.campus.identity().get_user(actor, user_id)?;
        let by_student = || Filter::eq("student_id", user_id);
        Ok(UserDataExport {
            profile,
            attendance: store.collection::<AttendanceRecord>().find(by_student())?,
            bookings: store.collection::<MessBooking>().find(by_student())?,
            feedback: store.collection::<MessFeedback>().find(by_student())?,
            applications: store.collection::<StudentApplication>().find(by_student())?,
            results: self.campus.results().results_for(user_id)?,
            activity: self.campus.activity().entries_for(user_id, None)?,
            exported_at: self.campus.now(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::campus::test_support::{actor, campus, start_time};
    use crate::mess::{MealType, MenuInput};
    use crate::storage::schema::{ACTIVITY_LOG, MESS_BOOKINGS};

    #[test]
    fn checksum_is_fnv1a() {
        assert_eq!(checksum(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(checksum(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_ne!(checksum(b"ab"), checksum(b"ba"));
    }

    #[test]
    fn export_strips_credentials() {
        let (campus, _) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        actor(&campus, "ana", Role::Student);

        let snapshot = campus.backups().export(&admin).unwrap();
        assert!(!snapshot.metadata.credentials_included);
        let users = &snapshot.collections[USERS];
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| !u.contains_key(CREDENTIAL_FIELD)));
        assert_eq!(snapshot.metadata.counts[USERS], 2);
        assert_eq!(snapshot.collections.len(), SCHEMAS.len());
    }

    #[test]
    fn export_requires_admin() {
        let (campus, _) = campus();
        let (ana, _) = actor(&campus, "ana", Role::Student);
        assert!(matches!(
            campus.backups().export(&ana),
            Err(CampusError::PermissionDenied(_))
        ));
    }

    #[test]
    fn import_keeps_existing_credential() {
        let (campus, _) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        actor(&campus, "ana", Role::Student);
        let snapshot = campus.backups().export(&admin).unwrap();

        campus.backups().import(&admin, &snapshot).unwrap();
        // Login still works: the stored credential survived the upsert.
        campus.identity().login("ana", "password1").unwrap();
    }

    #[test]
    fn import_is_rerunnable_and_skips_unknown() {
        let (campus, _) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        let mut snapshot = campus.backups().export(&admin).unwrap();
        snapshot
            .collections
            .insert("legacy_things".to_string(), vec![Document::new()]);

        let first = campus.backups().import(&admin, &snapshot).unwrap();
        let second = campus.backups().import(&admin, &snapshot).unwrap();
        assert_eq!(first.imported, second.imported);
        assert_eq!(second.skipped_collections, vec!["legacy_things"]);
        assert_eq!(campus.store().count(USERS, &Filter::All).unwrap(), 1);
    }

    #[test]
    fn newer_snapshot_version_refused() {
        let (campus, _) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        let mut snapshot = campus.backups().export(&admin).unwrap();
        snapshot.metadata.version = SNAPSHOT_VERSION + 1;
        assert!(matches!(
            campus.backups().import(&admin, &snapshot),
            Err(CampusError::Validation(_))
        ));
    }

    #[test]
    fn backup_registry_lifecycle() {
        let (campus, clock) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        let backups = campus.backups();

        let first = backups.create_backup(&admin).unwrap();
        let same_instant = backups.create_backup(&admin).unwrap();
        assert_ne!(first.id, same_instant.id);
        assert!(same_instant.id.starts_with(&first.id));

        clock.advance(chrono::Duration::hours(1));
        let later = backups.create_backup(&admin).unwrap();

        let listed = backups.list_backups(&admin).unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, later.id);

        backups.delete_backup(&admin, &first.id).unwrap();
        assert!(matches!(
            backups.delete_backup(&admin, &first.id),
            Err(CampusError::NotFound { .. })
        ));
        assert_eq!(backups.list_backups(&admin).unwrap().len(), 2);
    }

    #[test]
    fn restore_keeps_credentials() {
        let (campus, _) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        actor(&campus, "ana", Role::Student);
        let info = campus.backups().create_backup(&admin).unwrap();

        // Restore into a fresh store that only knows the admin.
        let (target, _) = crate::campus::test_support::campus();
        let (target_admin, _) = actor(&target, "root", Role::Admin);
        let bytes = campus.backups().backup_bytes(&admin, &info.id).unwrap();
        target.store().put_backup(&info.id, &bytes).unwrap();

        let report = target.backups().restore_backup(&target_admin, &info.id).unwrap();
        assert_eq!(report.imported[USERS], 2);
        target.identity().login("ana", "password1").unwrap();
    }

    #[test]
    fn restore_after_cancel_and_rebook() {
        let (campus, _) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        let (cook, _) = actor(&campus, "cook", Role::MessStaff);
        let (ana, _) = actor(&campus, "ana", Role::Student);
        let day = start_time().date_naive();
        let mess = campus.mess();
        mess.save_menu(&cook, MenuInput::new(day, MealType::Lunch, vec!["rice".into()]))
            .unwrap();
        let original = mess.book_meal(&ana, day, MealType::Lunch, "ana").unwrap();
        let info = campus.backups().create_backup(&admin).unwrap();

        mess.cancel_booking(&ana, day, MealType::Lunch, "ana").unwrap();
        let rebooked = mess.book_meal(&ana, day, MealType::Lunch, "ana").unwrap();
        assert_ne!(original.id, rebooked.id);

        let report = campus.backups().restore_backup(&admin, &info.id).unwrap();
        assert_eq!(report.displaced[MESS_BOOKINGS], 1);
        let again = campus.backups().restore_backup(&admin, &info.id).unwrap();
        assert!(again.displaced.is_empty());

        let bookings = mess.bookings_for_student(&ana, "ana").unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].id, original.id);
        let view = mess.get_menu(day, MealType::Lunch).unwrap().unwrap();
        assert_eq!(view.menu.booked_count, 1);
    }

    #[test]
    fn restore_missing_or_corrupt() {
        let (campus, _) = campus();
        let (admin, _) = actor(&campus, "root", Role::Admin);
        let backups = campus.backups();
        assert!(matches!(
            backups.restore_backup(&admin, "backup_0"),
            Err(CampusError::NotFound { .. })
        ));

        let info = backups.create_backup(&admin).unwrap();
        let mut bytes = backups.backup_bytes(&admin, &info.id).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0xff;
        campus.store().put_backup(&info.id, &bytes).unwrap();
        assert!(matches!(
            backups.restore_backup(&admin, &info.id),
            Err(CampusError::Serialization(_))
        ));

        campus.store().put_backup("junk", b"xx").unwrap();
        assert_eq!(backups.list_backups(&admin).unwrap().len(), 1);
    }

    #[test]
    fn user_data_export_is_scoped() {
        let (campus, _) = campus();
        let (ana, _) = actor(&campus, "ana", Role::Student);
        let (ben, _) = actor(&campus, "ben", Role::Student);

        let data = campus.backups().export_user_data(&ana, "ana").unwrap();
        assert_eq!(data.profile.id, "ana");
        assert!(data.activity.iter().all(|e| e.user_id == "ana"));
        assert!(!data.activity.is_empty());
        assert!(campus.backups().export_user_data(&ben, "ana").is_err());
        assert!(campus.store().count(ACTIVITY_LOG, &Filter::All).unwrap() >= 4);
    }
}
