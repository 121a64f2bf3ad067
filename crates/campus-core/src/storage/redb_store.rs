//! # redb-backed Collection Store
//!
//! Named collections of JSON documents with secondary indexes, persisted in
//! one redb database.
//!
//! ## Layout
//!
//! - one table per collection: encoded primary key -> JSON document bytes
//! - `indexes`: (collection, index, encoded value, primary key) -> ()
//! - `metadata`: schema version and per-collection sequences
//! - `backups`: backup id -> envelope bytes
//!
//! A record write and all of its index maintenance share one write
//! transaction. A unique collision is detected inside that transaction and
//! aborts it, so the unique index is the authoritative duplicate guard.

use super::index::{self, Document, Key};
use super::schema::{self, CollectionSchema, KeyKind, SCHEMAS};
use super::{Filter, Order, Query};
use crate::primitives::{KEY_FIELD, KEY_MAX, SCHEMA_VERSION};
use crate::types::{serialization_error, storage_error};
use crate::{CampusError, CampusResult};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    backends::InMemoryBackend,
};
use std::collections::BTreeMap;
use std::path::Path;

type IndexKey = (&'static str, &'static str, &'static str, &'static str);

/// Shared index table.
const INDEXES: TableDefinition<IndexKey, ()> = TableDefinition::new("indexes");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Backup registry: backup id -> envelope bytes
const BACKUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("backups");

const SCHEMA_VERSION_KEY: &str = "schema_version";

fn records(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

fn sequence_key(collection: &str) -> String {
    format!("seq:{}", collection)
}

fn lookup(collection: &str) -> CampusResult<&'static CollectionSchema> {
    schema::schema(collection)
        .ok_or_else(|| CampusError::Validation(format!("unknown collection '{}'", collection)))
}

fn decode(bytes: &[u8]) -> CampusResult<Document> {
    serde_json::from_slice(bytes).map_err(serialization_error)
}

/// Primary keys in `collection.index` whose encoded value lies in
/// `from..=to`, in index order.
fn index_range(
    table: &impl ReadableTable<IndexKey, ()>,
    collection: &str,
    index: &str,
    from: &str,
    to: &str,
) -> CampusResult<Vec<String>> {
    let mut keys = Vec::new();
    let range = table
        .range((collection, index, from, "")..=(collection, index, to, KEY_MAX))
        .map_err(storage_error)?;
    for entry in range {
        let (key, _) = entry.map_err(storage_error)?;
        keys.push(key.value().3.to_string());
    }
    Ok(keys)
}

/// How a write treats an existing primary key and unique index holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Replace the record with the same key; reject unique collisions.
    Upsert,
    /// Reject an existing key and unique collisions.
    Insert,
    /// Replace the record with the same key and evict unique collisions.
    Restore,
}

/// Outcome of a write.
#[derive(Debug)]
pub(crate) struct Written {
    pub(crate) key: Key,
    pub(crate) doc: Document,
    pub(crate) displaced: usize,
}

/// The collection store.
pub struct Store {
    db: Database,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("collections", &SCHEMAS.len())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> CampusResult<Self> {
        let db = Database::create(path.as_ref()).map_err(storage_error)?;
        Self::initialize(db)
    }

    /// A store that lives only in memory.
    pub fn in_memory() -> CampusResult<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage_error)?;
        Self::initialize(db)
    }

    /// Create missing tables and stamp the schema version.
    ///
    /// Refuses a store written by a newer schema.
    fn initialize(db: Database) -> CampusResult<Self> {
        let write_txn = db.begin_write().map_err(storage_error)?;
        {
            let mut meta = write_txn.open_table(METADATA).map_err(storage_error)?;
            let stored = meta
                .get(SCHEMA_VERSION_KEY)
                .map_err(storage_error)?
                .map(|v| v.value());
            if let Some(version) = stored
                && version > SCHEMA_VERSION
            {
                return Err(CampusError::Storage(format!(
                    "store schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                )));
            }
            if stored != Some(SCHEMA_VERSION) {
                meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION)
                    .map_err(storage_error)?;
            }
            for schema in SCHEMAS {
                let _ = write_txn
                    .open_table(records(schema.name))
                    .map_err(storage_error)?;
            }
            let _ = write_txn.open_table(INDEXES).map_err(storage_error)?;
            let _ = write_txn.open_table(BACKUPS).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;

        tracing::debug!(
            event = "store_opened",
            schema_version = SCHEMA_VERSION,
            collections = SCHEMAS.len()
        );
        Ok(Self { db })
    }

    /// Persisted schema version.
    pub fn schema_version(&self) -> CampusResult<u64> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let meta = read_txn.open_table(METADATA).map_err(storage_error)?;
        Ok(meta
            .get(SCHEMA_VERSION_KEY)
            .map_err(storage_error)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    // =========================================================================
    // RECORDS
    // =========================================================================

    /// Point lookup by primary key.
    pub fn get(&self, collection: &str, key: &Key) -> CampusResult<Option<Document>> {
        let schema = lookup(collection)?;
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn
            .open_table(records(schema.name))
            .map_err(storage_error)?;
        match table.get(key.encode().as_str()).map_err(storage_error)? {
            Some(raw) => decode(raw.value()).map(Some),
            None => Ok(None),
        }
    }

    /// Insert or replace a record; returns its key.
    pub fn put(&self, collection: &str, doc: Document) -> CampusResult<Key> {
        self.write(collection, doc, WriteMode::Upsert)
            .map(|written| written.key)
    }

    /// Insert a new record; fails with `UniqueConstraintViolation` on the
    /// `id` index when the primary key is already taken.
    pub fn insert(&self, collection: &str, doc: Document) -> CampusResult<Key> {
        self.write(collection, doc, WriteMode::Insert)
            .map(|written| written.key)
    }

    /// Upsert a restored record, first removing any other record that holds
    /// one of its unique index values. Returns how many were displaced.
    pub(crate) fn restore(&self, collection: &str, doc: Document) -> CampusResult<usize> {
        self.write(collection, doc, WriteMode::Restore)
            .map(|written| written.displaced)
    }

    /// Write a record; the primary key, the index maintenance and any
    /// displaced records all share one write transaction.
    pub(crate) fn write(
        &self,
        collection: &str,
        mut doc: Document,
        mode: WriteMode,
    ) -> CampusResult<Written> {
        let schema = lookup(collection)?;
        index::check_composite_parts(schema, &doc)?;
        let write_txn = self.db.begin_write().map_err(storage_error)?;

        let key = {
            let mut meta = write_txn.open_table(METADATA).map_err(storage_error)?;
            match (schema.key_kind, Key::from_document(&doc)) {
                (KeyKind::Supplied, Some(key @ Key::Str(_))) => key,
                (KeyKind::Supplied, _) => {
                    return Err(CampusError::Validation(format!(
                        "{} records need a string '{}'",
                        schema.name, KEY_FIELD
                    )));
                }
                (KeyKind::Generated, Some(Key::Str(s))) => {
                    return Err(CampusError::Validation(format!(
                        "{} keys are generated integers, got '{}'",
                        schema.name, s
                    )));
                }
                (KeyKind::Generated, explicit) => {
                    let seq_key = sequence_key(schema.name);
                    let last = meta
                        .get(seq_key.as_str())
                        .map_err(storage_error)?
                        .map(|v| v.value())
                        .unwrap_or(0);
                    let n = match explicit {
                        Some(Key::Int(n)) => n,
                        _ => last + 1,
                    };
                    if n > last {
                        meta.insert(seq_key.as_str(), n).map_err(storage_error)?;
                    }
                    Key::Int(n)
                }
            }
        };
        doc.insert(KEY_FIELD.to_string(), key.to_value());

        let pk = key.encode();
        let bytes = serde_json::to_vec(&doc).map_err(serialization_error)?;
        let new_entries = index::entries(schema, &doc);
        let mut displaced = 0;
        {
            let mut table = write_txn
                .open_table(records(schema.name))
                .map_err(storage_error)?;
            let mut indexes = write_txn.open_table(INDEXES).map_err(storage_error)?;

            let previous = match table.get(pk.as_str()).map_err(storage_error)? {
                Some(raw) => Some(decode(raw.value())?),
                None => None,
            };
            if mode == WriteMode::Insert && previous.is_some() {
                tracing::debug!(event = "insert_rejected", collection = schema.name, key = %pk);
                return Err(CampusError::UniqueConstraintViolation {
                    collection: schema.name.to_string(),
                    index: KEY_FIELD.to_string(),
                });
            }

            for (def, value) in &new_entries {
                if !def.unique {
                    continue;
                }
                let holders = index_range(&indexes, schema.name, def.name, value, value)?;
                for holder in holders.iter().filter(|holder| **holder != pk) {
                    if mode != WriteMode::Restore {
                        tracing::debug!(
                            event = "unique_rejected",
                            collection = schema.name,
                            index = def.name
                        );
                        return Err(CampusError::UniqueConstraintViolation {
                            collection: schema.name.to_string(),
                            index: def.name.to_string(),
                        });
                    }
                    let old = match table.remove(holder.as_str()).map_err(storage_error)? {
                        Some(raw) => decode(raw.value())?,
                        None => continue,
                    };
                    for (old_def, old_value) in index::entries(schema, &old) {
                        indexes
                            .remove((schema.name, old_def.name, old_value.as_str(), holder.as_str()))
                            .map_err(storage_error)?;
                    }
                    tracing::debug!(
                        event = "restore_displaced",
                        collection = schema.name,
                        index = def.name,
                        key = %holder
                    );
                    displaced += 1;
                }
            }

            if let Some(old) = previous {
                for (def, value) in index::entries(schema, &old) {
                    indexes
                        .remove((schema.name, def.name, value.as_str(), pk.as_str()))
                        .map_err(storage_error)?;
                }
            }
            for (def, value) in &new_entries {
                indexes
                    .insert((schema.name, def.name, value.as_str(), pk.as_str()), ())
                    .map_err(storage_error)?;
            }
            table
                .insert(pk.as_str(), bytes.as_slice())
                .map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;

        Ok(Written {
            key,
            doc,
            displaced,
        })
    }

    /// Delete a record; returns whether it existed.
    pub fn delete(&self, collection: &str, key: &Key) -> CampusResult<bool> {
        Ok(self.delete_many(collection, std::slice::from_ref(key))? == 1)
    }

    /// Delete several records in one transaction; returns how many existed.
    pub fn delete_many(&self, collection: &str, keys: &[Key]) -> CampusResult<usize> {
        let schema = lookup(collection)?;
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        let mut removed = 0;
        {
            let mut table = write_txn
                .open_table(records(schema.name))
                .map_err(storage_error)?;
            let mut indexes = write_txn.open_table(INDEXES).map_err(storage_error)?;
            for key in keys {
                let pk = key.encode();
                let old = match table.remove(pk.as_str()).map_err(storage_error)? {
                    Some(raw) => decode(raw.value())?,
                    None => continue,
                };
                for (def, value) in index::entries(schema, &old) {
                    indexes
                        .remove((schema.name, def.name, value.as_str(), pk.as_str()))
                        .map_err(storage_error)?;
                }
                removed += 1;
            }
        }
        write_txn.commit().map_err(storage_error)?;
        Ok(removed)
    }

    // =========================================================================
    // SCANS
    // =========================================================================

    /// Every record matching `filter`, in key order.
    pub fn get_all(&self, collection: &str, filter: &Filter) -> CampusResult<Vec<Document>> {
        self.query(collection, &Query::new(filter.clone()))
    }

    /// Run a query.
    pub fn query(&self, collection: &str, query: &Query) -> CampusResult<Vec<Document>> {
        let schema = lookup(collection)?;
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn
            .open_table(records(schema.name))
            .map_err(storage_error)?;

        let mut docs = Vec::new();
        let Some(scan) = query.filter.scan(schema)? else {
            let iter = table.iter().map_err(storage_error)?;
            let limit = query.limit.unwrap_or(usize::MAX);
            if query.order == Order::KeyDesc {
                for entry in iter.rev().take(limit) {
                    let (_, raw) = entry.map_err(storage_error)?;
                    docs.push(decode(raw.value())?);
                }
            } else {
                for entry in iter.take(limit) {
                    let (_, raw) = entry.map_err(storage_error)?;
                    docs.push(decode(raw.value())?);
                }
            }
            return Ok(docs);
        };

        let indexes = read_txn.open_table(INDEXES).map_err(storage_error)?;
        let mut keys = index_range(&indexes, schema.name, scan.index, &scan.from, &scan.to)?;
        match query.order {
            Order::Index => {}
            Order::KeyAsc => keys.sort(),
            Order::KeyDesc => {
                keys.sort();
                keys.reverse();
            }
        }
        if let Some(limit) = query.limit {
            keys.truncate(limit);
        }
        for pk in keys {
            if let Some(raw) = table.get(pk.as_str()).map_err(storage_error)? {
                docs.push(decode(raw.value())?);
            } else {
                tracing::warn!(
                    event = "dangling_index_entry",
                    collection = schema.name,
                    index = scan.index,
                    key = %pk
                );
            }
        }
        Ok(docs)
    }

    /// Number of records matching `filter`.
    pub fn count(&self, collection: &str, filter: &Filter) -> CampusResult<usize> {
        let schema = lookup(collection)?;
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        match filter.scan(schema)? {
            None => {
                let table = read_txn
                    .open_table(records(schema.name))
                    .map_err(storage_error)?;
                Ok(table.len().map_err(storage_error)? as usize)
            }
            Some(scan) => {
                let indexes = read_txn.open_table(INDEXES).map_err(storage_error)?;
                Ok(index_range(&indexes, schema.name, scan.index, &scan.from, &scan.to)?.len())
            }
        }
    }

    /// Every record of every collection, read in one transaction so the
    /// result is a single point in time.
    pub fn dump(&self) -> CampusResult<BTreeMap<String, Vec<Document>>> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let mut collections = BTreeMap::new();
        for schema in SCHEMAS {
            let table = read_txn
                .open_table(records(schema.name))
                .map_err(storage_error)?;
            let mut docs = Vec::new();
            for entry in table.iter().map_err(storage_error)? {
                let (_, raw) = entry.map_err(storage_error)?;
                docs.push(decode(raw.value())?);
            }
            collections.insert(schema.name.to_string(), docs);
        }
        Ok(collections)
    }

    // =========================================================================
    // BACKUP REGISTRY
    // =========================================================================

    /// Store a backup envelope under `id` (replacing any previous one).
    pub fn put_backup(&self, id: &str, bytes: &[u8]) -> CampusResult<()> {
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut table = write_txn.open_table(BACKUPS).map_err(storage_error)?;
            table.insert(id, bytes).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)
    }

    /// Fetch a backup envelope.
    pub fn get_backup(&self, id: &str) -> CampusResult<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(BACKUPS).map_err(storage_error)?;
        Ok(table
            .get(id)
            .map_err(storage_error)?
            .map(|raw| raw.value().to_vec()))
    }

    /// Every backup envelope, in id order.
    pub fn backups(&self) -> CampusResult<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(BACKUPS).map_err(storage_error)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(storage_error)? {
            let (id, raw) = entry.map_err(storage_error)?;
            out.push((id.value().to_string(), raw.value().to_vec()));
        }
        Ok(out)
    }

    /// Remove a backup; returns whether it existed.
    pub fn delete_backup(&self, id: &str) -> CampusResult<bool> {
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        let existed = {
            let mut table = write_txn.open_table(BACKUPS).map_err(storage_error)?;
            table.remove(id).map_err(storage_error)?.is_some()
        };
        write_txn.commit().map_err(storage_error)?;
        Ok(existed)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::storage::IndexValue;
    use crate::storage::schema::{ATTENDANCE, MESS_BOOKINGS, USERS};
    use serde_json::{Value, json};
    use tempfile::tempdir;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn user(id: &str, username: &str, email: &str) -> Document {
        doc(json!({"id": id, "username": username, "email": email, "role": "student"}))
    }

    #[test]
    fn test_open_and_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("campus.redb");

        {
            let store = Store::open(&db_path).expect("open db");
            store.put(USERS, user("u1", "ana", "ana@x.edu")).unwrap();
        }

        let store = Store::open(&db_path).expect("reopen db");
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        let found = store.get(USERS, &Key::from("u1")).unwrap().unwrap();
        assert_eq!(found["username"], "ana");
    }

    #[test]
    fn test_put_is_idempotent_on_key() {
        let store = Store::in_memory().unwrap();
        store.put(USERS, user("u1", "ana", "ana@x.edu")).unwrap();
        store.put(USERS, user("u1", "ana", "ana@x.edu")).unwrap();
        assert_eq!(store.count(USERS, &Filter::All).unwrap(), 1);
    }

    #[test]
    fn test_generated_keys_are_monotonic() {
        let store = Store::in_memory().unwrap();
        let a = store.put(ATTENDANCE, doc(json!({"student_id": "s1"}))).unwrap();
        let b = store.put(ATTENDANCE, doc(json!({"student_id": "s1"}))).unwrap();
        assert_eq!(a, Key::Int(1));
        assert_eq!(b, Key::Int(2));

        // An explicit key advances the sequence past it.
        store
            .put(ATTENDANCE, doc(json!({"id": 10, "student_id": "s2"})))
            .unwrap();
        let c = store.put(ATTENDANCE, doc(json!({"student_id": "s3"}))).unwrap();
        assert_eq!(c, Key::Int(11));
    }

    #[test]
    fn test_deleted_keys_not_reused() {
        let store = Store::in_memory().unwrap();
        let a = store.put(ATTENDANCE, doc(json!({"student_id": "s1"}))).unwrap();
        assert!(store.delete(ATTENDANCE, &a).unwrap());
        let b = store.put(ATTENDANCE, doc(json!({"student_id": "s1"}))).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_supplied_key_required() {
        let store = Store::in_memory().unwrap();
        let result = store.put(USERS, doc(json!({"username": "ana"})));
        assert!(matches!(result, Err(CampusError::Validation(_))));
    }

    #[test]
    fn test_unique_index_rejects_collision() {
        let store = Store::in_memory().unwrap();
        store.put(USERS, user("u1", "ana", "ana@x.edu")).unwrap();

        let err = store
            .put(USERS, user("u2", "ana", "other@x.edu"))
            .unwrap_err();
        assert!(err.is_unique_violation_on("username"));

        // Rejected write left nothing behind.
        assert!(store.get(USERS, &Key::from("u2")).unwrap().is_none());
        assert_eq!(
            store
                .count(USERS, &Filter::eq("email", "other@x.edu"))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_insert_rejects_existing_key() {
        let store = Store::in_memory().unwrap();
        store.insert(USERS, user("u1", "ana", "ana@x.edu")).unwrap();

        let err = store
            .insert(USERS, user("u1", "bo", "bo@x.edu"))
            .unwrap_err();
        assert!(err.is_unique_violation_on(KEY_FIELD));
        let kept = store.get(USERS, &Key::from("u1")).unwrap().unwrap();
        assert_eq!(kept["username"], "ana");
        assert_eq!(store.count(USERS, &Filter::eq("username", "bo")).unwrap(), 0);
    }

    #[test]
    fn test_restore_evicts_unique_holder() {
        let store = Store::in_memory().unwrap();
        let old = doc(json!({"id": 1, "menu_id": "m1", "student_id": "s1"}));
        store.put(MESS_BOOKINGS, old.clone()).unwrap();
        store.delete(MESS_BOOKINGS, &Key::Int(1)).unwrap();
        let rebooked = store
            .put(MESS_BOOKINGS, doc(json!({"menu_id": "m1", "student_id": "s1"})))
            .unwrap();
        assert_eq!(rebooked, Key::Int(2));

        assert!(store.put(MESS_BOOKINGS, old.clone()).is_err());
        assert_eq!(store.restore(MESS_BOOKINGS, old.clone()).unwrap(), 1);
        assert_eq!(store.restore(MESS_BOOKINGS, old).unwrap(), 0);

        assert!(store.get(MESS_BOOKINGS, &rebooked).unwrap().is_none());
        let pair = Filter::eq("menu_student", IndexValue::tuple(["m1", "s1"]));
        let holders = store.get_all(MESS_BOOKINGS, &pair).unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0]["id"], 1);
        assert_eq!(
            store.count(MESS_BOOKINGS, &Filter::eq("student_id", "s1")).unwrap(),
            1
        );
    }

    #[test]
    fn test_dump_reads_every_collection() {
        let store = Store::in_memory().unwrap();
        store.put(USERS, user("u1", "ana", "ana@x.edu")).unwrap();
        store.put(ATTENDANCE, doc(json!({"student_id": "u1"}))).unwrap();

        let dump = store.dump().unwrap();
        assert_eq!(dump.len(), SCHEMAS.len());
        assert_eq!(dump[USERS].len(), 1);
        assert_eq!(dump[ATTENDANCE].len(), 1);
        assert!(dump[MESS_BOOKINGS].is_empty());
    }

    #[test]
    fn test_replace_moves_index_entries() {
        let store = Store::in_memory().unwrap();
        store.put(USERS, user("u1", "ana", "ana@x.edu")).unwrap();
        store.put(USERS, user("u1", "ana", "new@x.edu")).unwrap();

        assert_eq!(store.count(USERS, &Filter::eq("email", "ana@x.edu")).unwrap(), 0);
        assert_eq!(store.count(USERS, &Filter::eq("email", "new@x.edu")).unwrap(), 1);

        // The freed value can be claimed by another record.
        store.put(USERS, user("u2", "bo", "ana@x.edu")).unwrap();
    }

    #[test]
    fn test_composite_index_exact_tuple() {
        let store = Store::in_memory().unwrap();
        store
            .put(MESS_BOOKINGS, doc(json!({"menu_id": "m1", "student_id": "s1"})))
            .unwrap();
        store
            .put(MESS_BOOKINGS, doc(json!({"menu_id": "m1", "student_id": "s2"})))
            .unwrap();

        let err = store
            .put(MESS_BOOKINGS, doc(json!({"menu_id": "m1", "student_id": "s1"})))
            .unwrap_err();
        assert!(err.is_unique_violation_on("menu_student"));

        let exact = Filter::eq("menu_student", IndexValue::tuple(["m1", "s2"]));
        assert_eq!(store.count(MESS_BOOKINGS, &exact).unwrap(), 1);
        assert_eq!(
            store.count(MESS_BOOKINGS, &Filter::eq("menu_id", "m1")).unwrap(),
            2
        );
    }

    #[test]
    fn test_range_and_order() {
        let store = Store::in_memory().unwrap();
        for (student, date) in [
            ("s1", "2024-03-01"),
            ("s1", "2024-03-05"),
            ("s1", "2024-03-09"),
            ("s2", "2024-03-05"),
        ] {
            store
                .put(ATTENDANCE, doc(json!({"student_id": student, "date": date})))
                .unwrap();
        }

        let range = Filter::range(
            "student_date",
            Some(IndexValue::tuple(["s1", "2024-03-02"])),
            Some(IndexValue::tuple(["s1", "2024-03-09"])),
        );
        let hits = store.get_all(ATTENDANCE, &range).unwrap();
        let dates: Vec<_> = hits.iter().map(|d| d["date"].clone()).collect();
        assert_eq!(dates, vec![json!("2024-03-05"), json!("2024-03-09")]);

        let newest = store
            .query(ATTENDANCE, &Query::all().order(Order::KeyDesc).limit(2))
            .unwrap();
        assert_eq!(newest[0]["id"], 4);
        assert_eq!(newest[1]["id"], 3);
    }

    #[test]
    fn test_unknown_index_rejected() {
        let store = Store::in_memory().unwrap();
        let result = store.count(USERS, &Filter::eq("nickname", "x"));
        assert!(matches!(result, Err(CampusError::Validation(_))));
        assert!(store.count("nope", &Filter::All).is_err());
    }

    #[test]
    fn test_delete_many_cleans_indexes() {
        let store = Store::in_memory().unwrap();
        let keys: Vec<_> = (0..5)
            .map(|_| store.put(ATTENDANCE, doc(json!({"student_id": "s1"}))).unwrap())
            .collect();
        assert_eq!(store.delete_many(ATTENDANCE, &keys[..3]).unwrap(), 3);
        assert_eq!(
            store.count(ATTENDANCE, &Filter::eq("student_id", "s1")).unwrap(),
            2
        );
        assert!(!store.delete(ATTENDANCE, &keys[0]).unwrap());
    }

    #[test]
    fn test_backup_registry() {
        let store = Store::in_memory().unwrap();
        store.put_backup("backup_2", b"two").unwrap();
        store.put_backup("backup_1", b"one").unwrap();

        let ids: Vec<_> = store.backups().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["backup_1", "backup_2"]);
        assert_eq!(store.get_backup("backup_2").unwrap().unwrap(), b"two");
        assert!(store.delete_backup("backup_2").unwrap());
        assert!(!store.delete_backup("backup_2").unwrap());
        assert!(store.get_backup("backup_2").unwrap().is_none());
    }
}
